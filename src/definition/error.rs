//! Definition loading errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving collector definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The configured definitions directory does not exist.
    #[error("definitions directory '{}' not found", .0.display())]
    DirectoryMissing(PathBuf),

    /// No definition file exists for the requested collector.
    #[error("no such collector '{id}' (looked for '{}')", path.display())]
    NotFound { id: String, path: PathBuf },

    /// The definition file exists but cannot be read.
    #[error("cannot read collector definition '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The definition file does not describe a valid collector.
    #[error("malformed collector definition '{}': {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    /// The collector id cannot name a definition file.
    #[error("invalid collector id '{0}'")]
    InvalidId(String),
}
