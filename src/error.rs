//! Error types shared across the pipeline.
//!
//! Loader and CRUD functions fail fast with one of these variants; the
//! cleaning and analysis engines raise only when the caller explicitly asks
//! for strict behaviour (e.g. [`OnError::Raise`](crate::pipeline::OnError)).
//! The core never prints; errors surface to whatever front end embeds it.

use std::fmt;

/// Main error type for vitals operations.
#[derive(Debug)]
pub enum VitalsError {
    /// I/O failure (file operations, log writes).
    Io(std::io::Error),

    /// A file, store or table that was expected to exist does not.
    NotFound(String),

    /// Malformed input: CSV/JSON that cannot be read into a frame.
    Parse(String),

    /// A value could not be coerced to the requested type under
    /// `raise` semantics.
    Conversion(String),

    /// Missing required field, blank table name, empty dataset,
    /// missing WHERE clause.
    Validation(String),

    /// Unknown or out-of-range argument (zero window, mixed value list).
    InvalidArgument(String),

    /// HTTP transport failure while loading from an API.
    Network(String),

    /// An operation was called in the wrong order
    /// (e.g. `aggregate` before `group_by`).
    InvalidState(String),

    /// A payload had no usable tabular shape.
    Format(String),

    /// Error surfaced by the underlying frame library.
    Frame(String),

    /// Error surfaced by the underlying SQLite store.
    Store(String),
}

impl fmt::Display for VitalsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Parse(msg) => write!(f, "Parse error: {msg}"),
            Self::Conversion(msg) => write!(f, "Conversion error: {msg}"),
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::Format(msg) => write!(f, "Data format error: {msg}"),
            Self::Frame(msg) => write!(f, "Dataframe error: {msg}"),
            Self::Store(msg) => write!(f, "Store error: {msg}"),
        }
    }
}

impl std::error::Error for VitalsError {}

impl From<std::io::Error> for VitalsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<polars::error::PolarsError> for VitalsError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Frame(err.to_string())
    }
}

impl From<rusqlite::Error> for VitalsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for VitalsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("JSON error: {err}"))
    }
}

impl From<ureq::Error> for VitalsError {
    fn from(err: ureq::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type alias for vitals operations.
pub type Result<T> = std::result::Result<T, VitalsError>;
