//! Stale closed issue pass
//!
//! Flags closed issues that have sat past the retention threshold by
//! labelling them. Nothing is deleted.

use super::{MaintenanceOptions, RecordFailure, require_data_dir};
use crate::storage::{IssueBackend, TagOutcome, open_backend};
use crate::{Backend, Config, Result, select_backend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a stale closed issue pass
#[derive(Debug, Clone, Serialize)]
pub struct StaleReport {
    pub data_dir: PathBuf,
    pub backend: Backend,
    /// False when the backend has no database yet
    pub initialized: bool,
    pub dry_run: bool,
    /// Closed issues examined
    pub scanned: usize,
    /// Closed issues past the threshold, whether or not newly flagged
    pub stale: Vec<String>,
    /// Issues labelled by this pass
    pub flagged: Vec<String>,
    /// Stale issues that already carried the label
    pub already_flagged: Vec<String>,
    /// Closed issues without a close time
    pub skipped: usize,
    pub failures: Vec<RecordFailure>,
}

impl StaleReport {
    fn new(data_dir: PathBuf, backend: Backend, dry_run: bool) -> Self {
        Self {
            data_dir,
            backend,
            initialized: false,
            dry_run,
            scanned: 0,
            stale: Vec::new(),
            flagged: Vec::new(),
            already_flagged: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
        }
    }
}

/// Flag stale closed issues using thresholds from config
pub fn stale_closed_issues(repo_root: &Path) -> Result<StaleReport> {
    stale_closed_issues_with(repo_root, &MaintenanceOptions::default())
}

/// Flag stale closed issues with explicit options
pub fn stale_closed_issues_with(repo_root: &Path, opts: &MaintenanceOptions) -> Result<StaleReport> {
    let data_dir = require_data_dir(repo_root)?;
    let backend = select_backend(&data_dir);
    let mut store = open_backend(backend, &data_dir);
    run_stale_pass(store.as_mut(), &data_dir, opts)
}

/// Run the pass against an already selected backend
pub fn run_stale_pass(
    store: &mut dyn IssueBackend,
    data_dir: &Path,
    opts: &MaintenanceOptions,
) -> Result<StaleReport> {
    let mut report = StaleReport::new(data_dir.to_path_buf(), store.kind(), opts.dry_run);

    if !store.is_initialized() {
        debug!(dir = %data_dir.display(), backend = %store.kind(), "No database, nothing to check");
        return Ok(report);
    }
    report.initialized = true;

    let config = Config::load_or_default(data_dir).maintenance;
    let threshold = opts.stale_after.unwrap_or_else(|| config.stale_after());
    let label = opts.stale_label.clone().unwrap_or(config.stale_label);

    let closed = store.closed_issues()?;
    report.scanned = closed.len();

    for issue in closed {
        let closed_at = match issue.closed_at() {
            Some(Ok(at)) => at,
            Some(Err(e)) => {
                warn!(id = %issue.id, error = %e, "Skipping closed issue with bad closed_at");
                report.failures.push(RecordFailure::from_error(&issue.id, e));
                continue;
            }
            None => {
                debug!(id = %issue.id, "Closed issue has no closed_at");
                report.skipped += 1;
                continue;
            }
        };

        if opts.now - closed_at <= threshold {
            continue;
        }
        report.stale.push(issue.id.clone());

        if issue.has_label(&label) {
            report.already_flagged.push(issue.id);
            continue;
        }
        if opts.dry_run {
            continue;
        }

        match store.tag_issue(&issue.id, &label) {
            Ok(TagOutcome::Tagged) => report.flagged.push(issue.id),
            Ok(TagOutcome::AlreadyTagged) => report.already_flagged.push(issue.id),
            Err(e) => {
                warn!(id = %issue.id, error = %e, "Failed to flag stale issue");
                report.failures.push(RecordFailure::from_error(&issue.id, e));
            }
        }
    }

    if !report.flagged.is_empty() {
        let message = format!(
            "doctor: flag {} stale closed issue(s) as '{}'",
            report.flagged.len(),
            label
        );
        store.finish_pass(&message)?;
        info!(
            flagged = report.flagged.len(),
            threshold_days = threshold.num_days(),
            "Flagged stale closed issues"
        );
    }

    Ok(report)
}

/// Threshold in whole days, for display
pub fn threshold_days(opts: &MaintenanceOptions, data_dir: &Path) -> i64 {
    opts.stale_after
        .unwrap_or_else(|| Config::load_or_default(data_dir).maintenance.stale_after())
        .num_days()
}
