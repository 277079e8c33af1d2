//! Issue records as they appear in `issues.jsonl`
//!
//! Maintenance only decides whether a line is an expired tombstone, so only
//! the fields that decision needs are typed. Everything else on a line is
//! ignored when parsing and survives because lines are rewritten from their
//! original bytes.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Issue status
///
/// Statuses this crate does not know about are kept as `Other` rather than
/// rejected, so a newer tracker can write records an older doctor still reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
    /// Soft-deleted, retained until the tombstone TTL runs out
    Tombstone,
    Other(String),
}

impl Status {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Status::Tombstone)
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "open" => Status::Open,
            "in_progress" | "in-progress" | "inprogress" => Status::InProgress,
            "blocked" => Status::Blocked,
            "closed" => Status::Closed,
            "tombstone" => Status::Tombstone,
            _ => Status::Other(s.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status::from(s.as_str())
    }
}

/// The parts of an issue line that tombstone expiry reads
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Issue {
    /// Unique identifier
    pub id: String,

    #[serde(default)]
    pub status: Status,

    /// When the issue was deleted (tombstone)
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// A tombstone older than `ttl` as of `now`
    ///
    /// Tombstones without a deletion time never expire.
    pub fn is_expired_tombstone(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.status.is_tombstone() && self.deleted_at.is_some_and(|at| now - at > ttl)
    }
}
