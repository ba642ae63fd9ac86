//! Packaging of output directories into uploadable artifacts.

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;

/// Errors raised while packaging an output directory.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// The directory could not be turned into an artifact.
    #[error("cannot package '{}': {reason}", directory.display())]
    PackagingFailed { directory: PathBuf, reason: String },
}

/// Turns an output directory into a single artifact file.
#[async_trait::async_trait]
pub trait Packager: Send + Sync {
    /// Package `directory` and return the artifact path.
    ///
    /// The caller owns the returned artifact and removes it after the run.
    async fn pack(&self, directory: &Path) -> Result<PathBuf, PackagingError>;
}

/// Gzip-compressed tarball written next to the directory as `<dir>.tar.gz`.
///
/// Entries are stored under a top-level folder named after the directory.
#[derive(Debug, Clone)]
pub struct TarGzPackager {
    level: Compression,
}

impl TarGzPackager {
    /// Create a packager with the default compression level.
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Set compression level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Artifact location for `directory`.
    pub fn artifact_path(directory: &Path) -> PathBuf {
        let mut name = OsString::from(directory.as_os_str());
        name.push(".tar.gz");
        PathBuf::from(name)
    }
}

impl Default for TarGzPackager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Packager for TarGzPackager {
    async fn pack(&self, directory: &Path) -> Result<PathBuf, PackagingError> {
        let directory = directory.to_path_buf();
        let artifact = Self::artifact_path(&directory);
        let level = self.level;

        let task = {
            let directory = directory.clone();
            let artifact = artifact.clone();
            tokio::task::spawn_blocking(move || write_archive(&directory, &artifact, level))
        };

        let result = match task.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("packaging task failed: {}", e)),
        };

        if let Err(reason) = result {
            let _ = std::fs::remove_file(&artifact);
            tracing::error!(directory = %directory.display(), reason = %reason, "Packaging failed");
            return Err(PackagingError::PackagingFailed { directory, reason });
        }

        tracing::debug!(artifact = %artifact.display(), "Packaged collection");
        Ok(artifact)
    }
}

fn write_archive(directory: &Path, artifact: &Path, level: Compression) -> std::io::Result<()> {
    if !directory.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "output directory does not exist",
        ));
    }
    let prefix = directory.file_name().map(PathBuf::from).unwrap_or_default();

    let file = File::create(artifact)?;
    let mut tar = tar::Builder::new(GzEncoder::new(file, level));
    tar.follow_symlinks(false);
    tar.append_dir_all(&prefix, directory)?;

    let encoder = tar.into_inner()?;
    encoder.finish()?.sync_all()
}
