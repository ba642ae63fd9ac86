//! Run-State Cache
//!
//! Persists the time of each collector's most recent successful collection
//! as a plain integer Unix timestamp in `<cache_dir>/<id>.last-run`.
//! Records are replaced atomically and never deleted; a missing record means
//! the collector has never run.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::config::PathsConfig;

/// File suffix of last-run records.
pub const LAST_RUN_SUFFIX: &str = "last-run";

/// Errors that can occur in the run-state cache.
#[derive(Debug, Error)]
pub enum StateError {
    /// The record could not be written.
    #[error("cannot write last-run record '{}': {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No record exists for the collector.
    #[error("no last-run record for '{0}'")]
    NotFound(String),

    /// The record exists but cannot be read or parsed.
    #[error("corrupt last-run record '{}': {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// File-backed store of last-run timestamps, one file per collector id.
#[derive(Debug, Clone)]
pub struct RunStateCache {
    dir: PathBuf,
}

impl RunStateCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create a cache from the configured cache directory.
    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.cache_dir)
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the record for `id`.
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, LAST_RUN_SUFFIX))
    }

    /// Overwrite the stored timestamp for `id`.
    ///
    /// The value is written to a temporary sibling and renamed into place, so
    /// readers never observe a partial record.
    ///
    /// # Errors
    /// Returns `StateError::WriteFailed` on any I/O error.
    pub fn record_run(&self, id: &str, when: DateTime<Utc>) -> Result<(), StateError> {
        let path = self.record_path(id);
        let write_failed = |source| StateError::WriteFailed {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_failed)?;

        let tmp = self.dir.join(format!(
            ".{}.{}.{}",
            id,
            LAST_RUN_SUFFIX,
            uuid::Uuid::new_v4().simple()
        ));
        let result = std::fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(when.timestamp().to_string().as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| std::fs::rename(&tmp, &path));

        if let Err(source) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(write_failed(source));
        }

        tracing::debug!(id = %id, timestamp = when.timestamp(), "Recorded last run");
        Ok(())
    }

    /// Read the stored timestamp for `id`.
    ///
    /// # Errors
    /// `StateError::NotFound` if no record exists, `StateError::Corrupt` if it
    /// cannot be read or is not an integer timestamp.
    pub fn last_run(&self, id: &str) -> Result<DateTime<Utc>, StateError> {
        let path = self.record_path(id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StateError::NotFound(id.to_string()));
            }
            Err(e) => {
                return Err(StateError::Corrupt {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        let seconds: i64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
            tracing::warn!(path = %path.display(), error = %e, "Cannot parse timestamp");
            StateError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| StateError::Corrupt {
                path,
                reason: format!("timestamp {} out of range", seconds),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_then_read() {
        let dir = TempDir::new().unwrap();
        let cache = RunStateCache::new(dir.path());
        let when = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        cache.record_run("mock", when).unwrap();
        assert_eq!(cache.last_run("mock").unwrap(), when);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("mock.last-run")).unwrap(),
            "1700000000"
        );
    }

    #[test]
    fn test_record_overwrites() {
        let dir = TempDir::new().unwrap();
        let cache = RunStateCache::new(dir.path());
        let first = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let second = Utc.timestamp_opt(1_700_000_600, 0).unwrap();

        cache.record_run("mock", first).unwrap();
        cache.record_run("mock", second).unwrap();
        assert_eq!(cache.last_run("mock").unwrap(), second);

        // No temporary files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_record_creates_cache_dir() {
        let dir = TempDir::new().unwrap();
        let cache = RunStateCache::new(dir.path().join("nested").join("cache"));
        cache.record_run("mock", Utc::now()).unwrap();
        assert!(cache.record_path("mock").exists());
    }

    #[test]
    fn test_last_run_not_found() {
        let dir = TempDir::new().unwrap();
        let cache = RunStateCache::new(dir.path());
        assert!(matches!(cache.last_run("never"), Err(StateError::NotFound(id)) if id == "never"));
    }

    #[test]
    fn test_last_run_corrupt() {
        let dir = TempDir::new().unwrap();
        let cache = RunStateCache::new(dir.path());
        std::fs::write(cache.record_path("mock"), "yesterday").unwrap();
        assert!(matches!(cache.last_run("mock"), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn test_last_run_tolerates_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let cache = RunStateCache::new(dir.path());
        std::fs::write(cache.record_path("mock"), "1700000000\n").unwrap();
        assert_eq!(cache.last_run("mock").unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_record_run_write_failed() {
        let dir = TempDir::new().unwrap();
        // A regular file where the cache directory should be
        let blocker = dir.path().join("cache");
        std::fs::write(&blocker, "").unwrap();

        let cache = RunStateCache::new(&blocker);
        assert!(matches!(
            cache.record_run("mock", Utc::now()),
            Err(StateError::WriteFailed { .. })
        ));
    }
}
