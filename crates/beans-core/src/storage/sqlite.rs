//! SQLite backend (default)
//!
//! The tracker keeps its issues in `.beans/beans.db`. This module never
//! creates that file on its own; an absent database means "not initialized".

use super::{ClosedIssue, IssueBackend, TagOutcome};
use crate::{Backend, Error, Result};
use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE: &str = "beans.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    closed_at TEXT
);
CREATE TABLE IF NOT EXISTS labels (
    issue_id TEXT NOT NULL,
    label TEXT NOT NULL,
    PRIMARY KEY (issue_id, label)
);
CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
"#;

/// Issue store backed by a single SQLite file
pub struct SqliteBackend {
    db_path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteBackend {
    /// Backend for `beans.db` inside a data directory
    pub fn new(data_dir: &Path) -> Self {
        Self::at(data_dir.join(DB_FILE))
    }

    /// Backend for an explicit database file
    pub fn at(db_path: PathBuf) -> Self {
        Self {
            db_path,
            conn: None,
        }
    }

    /// Create the database file with the issue schema
    pub fn create(db_path: &Path) -> Result<Connection> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    /// Lazily opened connection; fails if the database does not exist
    pub(crate) fn conn(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            // No SQLITE_OPEN_CREATE: a missing file must not be conjured up.
            // A write-protected file opens read-only and tag writes fail per record.
            let conn = Connection::open_with_flags(
                &self.db_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| {
                Error::Persistence(format!("open {}: {}", self.db_path.display(), e))
            })?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            tracing::debug!(path = %self.db_path.display(), "Opened issue database");
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Other("database connection unavailable".into()))
    }
}

impl IssueBackend for SqliteBackend {
    fn kind(&self) -> Backend {
        Backend::Sqlite
    }

    fn is_initialized(&self) -> bool {
        self.db_path.is_file()
    }

    fn closed_issues(&mut self) -> Result<Vec<ClosedIssue>> {
        let conn = self.conn()?;
        query_closed_issues(conn).map_err(|e| Error::Persistence(format!("read issues: {}", e)))
    }

    fn tag_issue(&mut self, id: &str, label: &str) -> Result<TagOutcome> {
        let conn = self.conn()?;
        add_label(conn, id, label)
    }
}

/// Closed issues with their labels, ordered by id
pub(crate) fn query_closed_issues(conn: &Connection) -> rusqlite::Result<Vec<ClosedIssue>> {
    let mut labels: HashMap<String, Vec<String>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT l.issue_id, l.label FROM labels l
             JOIN issues i ON i.id = l.issue_id
             WHERE i.status = 'closed'
             ORDER BY l.issue_id, l.label",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (issue_id, label) = row?;
            labels.entry(issue_id).or_default().push(label);
        }
    }

    let mut stmt =
        conn.prepare("SELECT id, closed_at FROM issues WHERE status = 'closed' ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut issues = Vec::new();
    for row in rows {
        let (id, closed_at) = row?;
        let labels = labels.remove(&id).unwrap_or_default();
        issues.push(ClosedIssue {
            id,
            closed_at,
            labels,
        });
    }
    Ok(issues)
}

/// Attach a label in one transaction, bumping `updated_at` only on change
pub(crate) fn add_label(conn: &mut Connection, id: &str, label: &str) -> Result<TagOutcome> {
    let tx = conn.transaction()?;

    let exists = tx
        .query_row("SELECT 1 FROM issues WHERE id = ?1", [id], |_| Ok(()))
        .optional()?
        .is_some();
    if !exists {
        return Err(Error::Persistence(format!("issue not found: {}", id)));
    }

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
        params![id, label],
    )?;
    if inserted == 0 {
        return Ok(TagOutcome::AlreadyTagged);
    }

    tx.execute(
        "UPDATE issues SET updated_at = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), id],
    )?;
    tx.commit()?;
    Ok(TagOutcome::Tagged)
}
