//! Error types for beans

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Data directory not found: {} (store was never initialized)", .0.display())]
    MissingStore(PathBuf),

    #[error("Redirect cycle at {} after {hops} hop(s)", .path.display())]
    RedirectCycle { path: PathBuf, hops: usize },

    #[error("Malformed record {record}: {message}")]
    RecordParse { record: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors that mean the store was never set up
    pub fn is_missing_store(&self) -> bool {
        matches!(self, Error::MissingStore(_))
    }
}
