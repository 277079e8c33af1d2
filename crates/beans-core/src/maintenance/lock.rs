//! Advisory file lock serialising maintenance rewrites across processes

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock held on `<resource>.lock` next to the resource
pub struct MaintenanceLock {
    lock_file: File,
    lock_path: PathBuf,
}

impl MaintenanceLock {
    fn lock_path_for(resource: &Path) -> PathBuf {
        let mut name = resource
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        resource.with_file_name(name)
    }

    fn open(lock_path: &Path) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| Error::Lock(format!("open {}: {}", lock_path.display(), e)))
    }

    /// Acquire the lock for `resource` (blocking)
    pub fn acquire(resource: &Path) -> Result<Self> {
        let lock_path = Self::lock_path_for(resource);
        let lock_file = Self::open(&lock_path)?;
        lock_file
            .lock_exclusive()
            .map_err(|e| Error::Lock(format!("acquire {}: {}", lock_path.display(), e)))?;

        debug!("Acquired maintenance lock at {:?}", lock_path);
        Ok(Self {
            lock_file,
            lock_path,
        })
    }

    /// Try to acquire the lock without blocking
    pub fn try_acquire(resource: &Path) -> Result<Option<Self>> {
        let lock_path = Self::lock_path_for(resource);
        let lock_file = Self::open(&lock_path)?;
        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                debug!("Maintenance lock held by another process");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Lock(format!(
                    "try acquire {}: {}",
                    lock_path.display(),
                    e
                )));
            }
        }

        Ok(Some(Self {
            lock_file,
            lock_path,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for MaintenanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.lock_file.unlock() {
            debug!("Failed to release maintenance lock: {}", e);
        }
        debug!("Released maintenance lock at {:?}", self.lock_path);
    }
}
