//! Collection errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while collecting.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The per-run output directory could not be created.
    #[error("cannot create output directory '{}': {source}", path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The command could not be launched or exited unsuccessfully.
    #[error("could not run collector '{id}': {reason}")]
    ExecutionFailed {
        id: String,
        reason: String,
        /// Captured standard error (tail).
        stderr: String,
    },

    /// The command exceeded its deadline and was killed.
    #[error("collector '{id}' timed out after {}", humantime::format_duration(*timeout))]
    Timeout { id: String, timeout: Duration },

    /// The run was cancelled and the command was killed.
    #[error("collector '{id}' was cancelled")]
    Cancelled { id: String },

    /// Another run of the same collector holds the run lock.
    #[error("collector '{id}' is already running")]
    AlreadyRunning { id: String },

    /// The run lock could not be opened or acquired.
    #[error("cannot lock collector '{id}': {source}")]
    Lock {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

impl CollectError {
    /// Captured standard error, when the command produced any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ExecutionFailed { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}
