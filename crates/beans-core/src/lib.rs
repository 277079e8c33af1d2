//! beans-core: maintenance library for the beans issue store
//!
//! Resolves the data directory behind a repository (following redirects),
//! picks the configured storage backend, and runs the repair passes that
//! flag stale closed issues and prune expired tombstones.

pub mod backend;
pub mod config;
pub mod error;
pub mod issue;
pub mod maintenance;
pub mod redirect;
pub mod storage;

pub use backend::{Backend, backend_and_data_dir, select_backend};
pub use config::{Config, MaintenanceConfig};
pub use error::Error;
pub use issue::{Issue, Status};
pub use maintenance::{
    MaintenanceOptions, RecordFailure, StaleReport, TombstoneReport, expired_tombstones,
    expired_tombstones_with, run_all, stale_closed_issues, stale_closed_issues_with,
};
pub use redirect::{data_dir_for, resolve_data_dir};
pub use storage::{ClosedIssue, IssueBackend, open_backend};

/// Result type for beans operations
pub type Result<T> = std::result::Result<T, Error>;
