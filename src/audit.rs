//! Audit trail of pipeline activity.
//!
//! [`ActivityLogger`] is injected wherever an audit trail is wanted; there
//! is no global logger. Records are appended as JSON lines so the file can
//! be tailed while the pipeline runs. This is separate from diagnostic
//! logging, which goes through `tracing`.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, VitalsError};

/// Severity of an audit record.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// One audit record, stored as a single JSON line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
    pub description: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Criteria for [`filter_records`]. Empty filter matches everything.
#[derive(Clone, Default, Debug)]
pub struct RecordFilter {
    pub level: Option<LogLevel>,
    pub action: Option<String>,
    pub user: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Keep records matching every set criterion, preserving order.
pub fn filter_records(records: &[ActivityRecord], filter: &RecordFilter) -> Vec<ActivityRecord> {
    records
        .iter()
        .filter(|r| filter.level.is_none_or(|lvl| r.level == lvl))
        .filter(|r| filter.action.as_deref().is_none_or(|a| r.action == a))
        .filter(|r| filter.user.as_deref().is_none_or(|u| r.user == u))
        .filter(|r| filter.since.is_none_or(|t| r.timestamp >= t))
        .cloned()
        .collect()
}

/// Aggregate view over an audit log.
#[derive(Clone, Debug, Serialize)]
pub struct ActivityStats {
    pub total: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_action: BTreeMap<String, usize>,
    pub by_user: BTreeMap<String, usize>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Append-only JSON-lines audit logger bound to one file and one user.
#[derive(Clone, Debug)]
pub struct ActivityLogger {
    log_file: PathBuf,
    user: String,
}

impl ActivityLogger {
    pub fn new(log_file: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            log_file: log_file.into(),
            user: user.into(),
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Append one record. The timestamp is taken at call time.
    pub fn log(
        &self,
        action: &str,
        description: &str,
        level: LogLevel,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let record = ActivityRecord {
            timestamp: Utc::now(),
            user: self.user.clone(),
            action: action.to_owned(),
            description: description.to_owned(),
            level,
            metadata,
        };

        if let Some(parent) = self.log_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    pub fn info(&self, action: &str, description: &str) -> Result<()> {
        self.log(action, description, LogLevel::Info, None)
    }

    pub fn warning(&self, action: &str, description: &str) -> Result<()> {
        self.log(action, description, LogLevel::Warning, None)
    }

    pub fn error(&self, action: &str, description: &str) -> Result<()> {
        self.log(action, description, LogLevel::Error, None)
    }

    /// Read every record in file order. Malformed lines are skipped with a
    /// diagnostic warning rather than failing the whole read.
    pub fn read_log(&self) -> Result<Vec<ActivityRecord>> {
        if !self.log_file.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&self.log_file)?;
        let mut records = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActivityRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(line = number + 1, error = %e, "skipping malformed audit record");
                }
            }
        }
        Ok(records)
    }

    /// Counts by level, action and user plus the time span covered.
    pub fn activity_stats(&self) -> Result<ActivityStats> {
        let records = self.read_log()?;

        let mut by_level = BTreeMap::new();
        let mut by_action = BTreeMap::new();
        let mut by_user = BTreeMap::new();
        for record in &records {
            *by_level.entry(record.level.to_string()).or_insert(0) += 1;
            *by_action.entry(record.action.clone()).or_insert(0) += 1;
            *by_user.entry(record.user.clone()).or_insert(0) += 1;
        }

        Ok(ActivityStats {
            total: records.len(),
            by_level,
            by_action,
            by_user,
            first_timestamp: records.first().map(|r| r.timestamp),
            last_timestamp: records.last().map(|r| r.timestamp),
        })
    }

    /// Truncate the log file. A missing file is not an error.
    pub fn clear_log(&self) -> Result<()> {
        if self.log_file.exists() {
            std::fs::write(&self.log_file, "")?;
        }
        Ok(())
    }

    /// Export the log as CSV, returning the record count. Metadata is
    /// JSON-encoded into a single column.
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let records = self.read_log()?;

        let timestamps: Vec<String> = records.iter().map(|r| r.timestamp.to_rfc3339()).collect();
        let users: Vec<String> = records.iter().map(|r| r.user.clone()).collect();
        let actions: Vec<String> = records.iter().map(|r| r.action.clone()).collect();
        let descriptions: Vec<String> = records.iter().map(|r| r.description.clone()).collect();
        let levels: Vec<String> = records.iter().map(|r| r.level.to_string()).collect();
        let metadata: Vec<Option<String>> = records
            .iter()
            .map(|r| {
                r.metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
            })
            .collect::<std::result::Result<_, _>>()?;

        let mut df = df!(
            "timestamp" => timestamps,
            "user" => users,
            "action" => actions,
            "description" => descriptions,
            "level" => levels,
            "metadata" => metadata,
        )?;

        let mut file = std::fs::File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| VitalsError::Io(std::io::Error::other(e.to_string())))?;
        Ok(records.len())
    }
}
