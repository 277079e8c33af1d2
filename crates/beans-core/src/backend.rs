//! Storage backend selection

use crate::{Config, Result, data_dir_for};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Backend {
    /// Single-file SQLite database (beans.db)
    #[default]
    Sqlite,
    /// Versioned database kept under dolt/
    Dolt,
}

impl std::str::FromStr for Backend {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "dolt" => Ok(Backend::Dolt),
            _ => Err(crate::Error::InvalidBackend(s.to_string())),
        }
    }
}

impl TryFrom<String> for Backend {
    type Error = crate::Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Backend> for String {
    fn from(backend: Backend) -> Self {
        backend.to_string()
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::Dolt => write!(f, "dolt"),
        }
    }
}

/// Backend configured for a resolved data directory
///
/// A missing, malformed, or unreadable config is not an error here; it
/// selects the default backend.
pub fn select_backend(data_dir: &Path) -> Backend {
    match Config::load(data_dir) {
        Ok(Some(config)) => config.backend(),
        Ok(None) => Backend::default(),
        Err(e) => {
            tracing::debug!(
                dir = %data_dir.display(),
                error = %e,
                "Config unreadable, using default backend"
            );
            Backend::default()
        }
    }
}

/// Resolve the data directory for a repository root and its backend
pub fn backend_and_data_dir(repo_root: &Path) -> Result<(Backend, PathBuf)> {
    let data_dir = data_dir_for(repo_root)?;
    let backend = select_backend(&data_dir);
    Ok((backend, data_dir))
}
