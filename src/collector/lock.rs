//! Advisory per-collector run lock.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::CollectError;

/// Exclusive lock on `<dir>/<id>.lock`, released on drop.
///
/// Lock files are left in place; only the `flock` state matters.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock for `id` without blocking.
    ///
    /// # Errors
    /// `CollectError::AlreadyRunning` if another run holds the lock,
    /// `CollectError::Lock` if the lock file cannot be opened.
    pub fn acquire(dir: &Path, id: &str) -> Result<Self, CollectError> {
        let lock_error = |source| CollectError::Lock {
            id: id.to_string(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(lock_error)?;
        let path = dir.join(format!("{}.lock", id));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_error)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(id = %id, path = %path.display(), "Acquired run lock");
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                tracing::warn!(id = %id, "Collector is already running");
                Err(CollectError::AlreadyRunning { id: id.to_string() })
            }
            Err(e) => Err(lock_error(e)),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}
