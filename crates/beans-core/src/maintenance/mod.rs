//! Repair passes run by `beans doctor`
//!
//! Both passes take a repository root, resolve its data directory, and
//! treat missing data (no database, no log) as nothing to do. Only a
//! missing data directory is an error.

pub mod lock;
pub mod stale;
pub mod tombstones;

use crate::{Error, Result, data_dir_for};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub use lock::MaintenanceLock;
pub use stale::{StaleReport, run_stale_pass, stale_closed_issues, stale_closed_issues_with};
pub use tombstones::{
    ISSUES_FILE, TombstoneReport, expired_tombstones, expired_tombstones_with,
};

/// Knobs shared by the maintenance passes
///
/// Thresholds left as `None` come from the `[maintenance]` config table.
#[derive(Debug, Clone)]
pub struct MaintenanceOptions {
    /// Reference time for age calculations
    pub now: DateTime<Utc>,
    pub stale_after: Option<Duration>,
    pub tombstone_ttl: Option<Duration>,
    pub stale_label: Option<String>,
    /// Report what would change without writing anything
    pub dry_run: bool,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        Self {
            now: Utc::now(),
            stale_after: None,
            tombstone_ttl: None,
            stale_label: None,
            dry_run: false,
        }
    }
}

/// A record a pass could not handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Issue id, or `line N` for log lines
    pub record: String,
    pub message: String,
}

impl RecordFailure {
    pub fn new(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            message: message.into(),
        }
    }

    fn from_error(record: &str, err: Error) -> Self {
        match err {
            Error::RecordParse { record, message } => Self { record, message },
            other => Self::new(record, other.to_string()),
        }
    }
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.record, self.message)
    }
}

/// Resolve the data directory and insist that it exists
pub(crate) fn require_data_dir(repo_root: &Path) -> Result<PathBuf> {
    let data_dir = data_dir_for(repo_root)?;
    if !data_dir.is_dir() {
        return Err(Error::MissingStore(data_dir));
    }
    Ok(data_dir)
}

/// Run both passes concurrently
///
/// They touch disjoint resources, so each result stands on its own.
pub fn run_all(
    repo_root: &Path,
    opts: &MaintenanceOptions,
) -> (Result<StaleReport>, Result<TombstoneReport>) {
    std::thread::scope(|scope| {
        let stale = scope.spawn(|| stale_closed_issues_with(repo_root, opts));
        let tombstones = expired_tombstones_with(repo_root, opts);
        let stale = stale
            .join()
            .unwrap_or_else(|_| Err(Error::Other("stale closed issue pass panicked".into())));
        (stale, tombstones)
    })
}
