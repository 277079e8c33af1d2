//! Issue storage backends
//!
//! Maintenance only needs three things from a backend: whether it was ever
//! initialized, the closed issues it holds, and a way to label one of them.

pub mod dolt;
pub mod sqlite;

use crate::{Backend, Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

pub use dolt::DoltBackend;
pub use sqlite::SqliteBackend;

/// A closed issue as enumerated by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedIssue {
    pub id: String,
    /// Raw `closed_at` column; parsed per record so one bad row can be skipped
    pub closed_at: Option<String>,
    pub labels: Vec<String>,
}

impl ClosedIssue {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Parsed close time, `None` when the column is empty
    pub fn closed_at(&self) -> Option<Result<DateTime<Utc>>> {
        self.closed_at
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                parse_timestamp(raw).map_err(|message| Error::RecordParse {
                    record: self.id.clone(),
                    message,
                })
            })
    }
}

/// Result of labelling an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Tagged,
    AlreadyTagged,
}

/// Capabilities the maintenance passes need from a storage engine
pub trait IssueBackend {
    /// Which backend this is
    fn kind(&self) -> Backend;

    /// True once the backend's database has been created
    fn is_initialized(&self) -> bool;

    /// All issues whose status is closed
    fn closed_issues(&mut self) -> Result<Vec<ClosedIssue>>;

    /// Attach `label` to an issue; no-op if it is already there
    fn tag_issue(&mut self, id: &str, label: &str) -> Result<TagOutcome>;

    /// Called once after a pass that changed data
    fn finish_pass(&mut self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Open the backend implementation for a data directory
///
/// Nothing is touched on disk until the backend is queried.
pub fn open_backend(backend: Backend, data_dir: &Path) -> Box<dyn IssueBackend> {
    match backend {
        Backend::Sqlite => Box::new(SqliteBackend::new(data_dir)),
        Backend::Dolt => Box::new(DoltBackend::new(data_dir)),
    }
}

/// Parse a stored timestamp
///
/// Accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC).
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {:?}: {}", raw, e))
}
