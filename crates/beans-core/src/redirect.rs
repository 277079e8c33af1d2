//! Data directory resolution
//!
//! A `.beans/redirect` file points a project at a data directory that lives
//! somewhere else (a shared checkout, a team drive). Redirects may chain, but
//! resolution is a bounded loop and fails on cycles.

use crate::{Error, Result};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

pub const DATA_DIR: &str = ".beans";
pub const REDIRECT_FILE: &str = "redirect";

/// Maximum number of redirects followed before giving up
pub const MAX_REDIRECT_HOPS: usize = 8;

/// Effective data directory for a repository root
pub fn data_dir_for(repo_root: &Path) -> Result<PathBuf> {
    resolve_data_dir(&repo_root.join(DATA_DIR))
}

/// Follow redirect markers starting at `candidate`
///
/// The final directory does not have to exist; callers check that.
pub fn resolve_data_dir(candidate: &Path) -> Result<PathBuf> {
    let mut current = candidate.to_path_buf();
    let mut visited = HashSet::new();
    visited.insert(identity(&current));

    let mut hops = 0;
    loop {
        let Some(target) = read_redirect(&current) else {
            return Ok(current);
        };
        hops += 1;

        if hops > MAX_REDIRECT_HOPS || !visited.insert(identity(&target)) {
            return Err(Error::RedirectCycle { path: target, hops });
        }

        tracing::debug!(
            from = %current.display(),
            to = %target.display(),
            hops,
            "Following data directory redirect"
        );
        current = target;
    }
}

/// Read the redirect target named inside `dir`, if any
///
/// Blank lines and `#` comments are skipped. Relative targets are taken
/// relative to the project root that owns `dir` (its parent).
fn read_redirect(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(REDIRECT_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable redirect");
            return None;
        }
    };

    let target = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))?;

    let target = expand_home(target);
    if target.is_absolute() {
        return Some(target);
    }

    let base = dir.parent().unwrap_or(dir);
    Some(base.join(target))
}

fn expand_home(target: &str) -> PathBuf {
    if target == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = target.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(target)
}

/// Key used for cycle detection
///
/// Existing directories are canonicalized so symlinked aliases collapse;
/// anything else is normalized lexically.
fn identity(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
