//! vitals: a cleaning, analysis and persistence pipeline for tabular
//! public-health data.
//!
//! Datasets flow through four stages: load (CSV, JSON, HTTP API), clean
//! ([`pipeline::cleaning`]), analyse ([`pipeline::analysis`]) and persist
//! to a SQLite store ([`pipeline::loader::persist`], [`crud`]). The
//! engines are stateless functions over polars frames; the [`DataCleaner`]
//! and [`DataAnalyzer`] wrappers layer a chainable API on top for
//! multi-step jobs.
//!
//! The crate is a library with no interactive surface. Diagnostics go
//! through `tracing` (see [`logging`]); user-facing audit trails go
//! through an injected [`audit::ActivityLogger`].

#![warn(clippy::all, rust_2018_idioms)]

pub mod audit;
pub mod crud;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use error::{Result, VitalsError};
pub use pipeline::analysis::DataAnalyzer;
pub use pipeline::cleaning::DataCleaner;
