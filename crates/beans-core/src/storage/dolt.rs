//! Versioned backend
//!
//! Lives under `.beans/dolt/`. Issues use the same tables as the SQLite
//! backend; every pass that changes data appends an entry to `commit_log`
//! so the history of maintenance edits can be inspected and reverted.

use super::sqlite::{self, DB_FILE, SqliteBackend};
use super::{ClosedIssue, IssueBackend, TagOutcome};
use crate::{Backend, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use std::path::Path;

pub const DOLT_DIR: &str = "dolt";

const COMMIT_LOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS commit_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    message TEXT NOT NULL,
    issue_ids TEXT NOT NULL,
    committed_at TEXT NOT NULL
);
"#;

/// Versioned issue store
pub struct DoltBackend {
    inner: SqliteBackend,
    /// Issues changed since the last commit
    pending: Vec<String>,
}

impl DoltBackend {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            inner: SqliteBackend::at(data_dir.join(DOLT_DIR).join(DB_FILE)),
            pending: Vec::new(),
        }
    }

    /// Create the versioned database under `data_dir/dolt/`
    pub fn create(data_dir: &Path) -> Result<Connection> {
        let conn = SqliteBackend::create(&data_dir.join(DOLT_DIR).join(DB_FILE))?;
        conn.execute_batch(COMMIT_LOG_SCHEMA)?;
        Ok(conn)
    }

    /// Commit messages, oldest first
    pub fn commit_messages(&mut self) -> Result<Vec<String>> {
        let conn = self.inner.conn()?;
        conn.execute_batch(COMMIT_LOG_SCHEMA)?;
        let mut stmt = conn.prepare("SELECT message FROM commit_log ORDER BY seq")?;
        let messages = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(messages)
    }
}

impl IssueBackend for DoltBackend {
    fn kind(&self) -> Backend {
        Backend::Dolt
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn closed_issues(&mut self) -> Result<Vec<ClosedIssue>> {
        self.inner.closed_issues()
    }

    fn tag_issue(&mut self, id: &str, label: &str) -> Result<TagOutcome> {
        let outcome = sqlite::add_label(self.inner.conn()?, id, label)?;
        if outcome == TagOutcome::Tagged {
            self.pending.push(id.to_string());
        }
        Ok(outcome)
    }

    fn finish_pass(&mut self, message: &str) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let ids = self.pending.join(",");
        let conn = self.inner.conn()?;
        conn.execute_batch(COMMIT_LOG_SCHEMA)?;
        conn.execute(
            "INSERT INTO commit_log (message, issue_ids, committed_at) VALUES (?1, ?2, ?3)",
            params![message, ids, Utc::now().to_rfc3339()],
        )?;
        tracing::info!(message, issues = %ids, "Committed maintenance changes");
        self.pending.clear();
        Ok(())
    }
}
