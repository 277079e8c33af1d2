//! Configuration for beans
//!
//! Stored in .beans/config.toml

use crate::Backend;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "config.toml";

/// beans configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend ("sqlite" or "dolt")
    pub backend: Backend,

    /// Maintenance settings
    pub maintenance: MaintenanceConfig,
}

/// Retention policy used by `beans doctor`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Closed issues older than this are flagged as stale
    pub stale_closed_days: u32,

    /// Tombstones older than this are pruned from issues.jsonl
    pub tombstone_ttl_days: u32,

    /// Label attached to stale closed issues
    pub stale_label: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            stale_closed_days: 30,
            tombstone_ttl_days: 30,
            stale_label: "stale".to_string(),
        }
    }
}

impl MaintenanceConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::days(i64::from(self.stale_closed_days))
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::days(i64::from(self.tombstone_ttl_days))
    }
}

impl Config {
    /// Load config from `config.toml` inside a data directory
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(data_dir: &Path) -> crate::Result<Option<Self>> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Other(format!("Invalid config: {}", e)))?;
        Ok(Some(config))
    }

    /// Load config, falling back to defaults when absent or unreadable
    pub fn load_or_default(data_dir: &Path) -> Self {
        match Self::load(data_dir) {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::debug!(dir = %data_dir.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Overwrite `config.toml` inside a data directory with the commented defaults
    pub fn write_default(data_dir: &Path) -> crate::Result<()> {
        std::fs::write(data_dir.join(CONFIG_FILE), Self::default_with_comments())?;
        Ok(())
    }

    /// The configured storage backend
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Generate a default config file with comments
    pub fn default_with_comments() -> String {
        r#"# beans configuration

# Storage backend: "sqlite" (beans.db) or "dolt" (dolt/)
backend = "sqlite"

[maintenance]
# Closed issues older than this many days are labelled stale by `beans doctor --fix`
stale_closed_days = 30

# Tombstones older than this many days are pruned from issues.jsonl
tombstone_ttl_days = 30

# Label attached to stale closed issues
stale_label = "stale"
"#
        .to_string()
    }
}
