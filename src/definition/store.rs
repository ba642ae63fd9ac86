//! Directory-backed definition lookup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::PathsConfig;

use super::error::DefinitionError;
use super::model::CollectorDefinition;

/// File extension of definition files.
pub const DEFINITION_EXTENSION: &str = "toml";

/// Read-only store resolving collector ids to definitions.
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    dir: PathBuf,
}

impl DefinitionStore {
    /// Create a store over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create a store from the configured definitions directory.
    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.definitions_dir)
    }

    /// Directory this store reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_directory(&self) -> Result<(), DefinitionError> {
        if !self.dir.is_dir() {
            tracing::error!(path = %self.dir.display(), "Definitions directory not found");
            return Err(DefinitionError::DirectoryMissing(self.dir.clone()));
        }
        Ok(())
    }

    /// Load the definition of collector `id` from `<dir>/<id>.toml`.
    ///
    /// # Errors
    /// `DirectoryMissing`, `InvalidId`, `NotFound`, `Unreadable` or `Malformed`.
    pub fn load_one(&self, id: &str) -> Result<CollectorDefinition, DefinitionError> {
        self.ensure_directory()?;
        if !CollectorDefinition::is_valid_id(id) {
            return Err(DefinitionError::InvalidId(id.to_string()));
        }

        let path = self.dir.join(format!("{}.{}", id, DEFINITION_EXTENSION));
        load_path(id, &path)
    }

    /// Load every definition in the directory, sorted by file name.
    ///
    /// Definitions that cannot be loaded are skipped with a warning.
    ///
    /// # Errors
    /// `DirectoryMissing` if the directory does not exist, `Unreadable` if it
    /// cannot be listed.
    pub fn load_all(&self) -> Result<Vec<CollectorDefinition>, DefinitionError> {
        self.ensure_directory()?;

        let unreadable = |source| DefinitionError::Unreadable {
            path: self.dir.clone(),
            source,
        };

        let entries = std::fs::read_dir(&self.dir).map_err(unreadable)?;
        let paths = definition_paths(entries.map(|entry| entry.map(|e| e.path())));

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!(path = %path.display(), "Skipping definition with non UTF-8 name");
                continue;
            };
            if !CollectorDefinition::is_valid_id(id) {
                tracing::warn!(path = %path.display(), "Skipping definition with invalid id");
                continue;
            }

            match load_path(id, &path) {
                Ok(definition) => definitions.push(definition),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Collector is malformed, skipping");
                }
            }
        }

        tracing::debug!(
            dir = %self.dir.display(),
            count = definitions.len(),
            "Loaded collector definitions"
        );
        Ok(definitions)
    }
}

fn load_path(id: &str, path: &Path) -> Result<CollectorDefinition, DefinitionError> {
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(id = %id, path = %path.display(), "No such collector");
            return Err(DefinitionError::NotFound {
                id: id.to_string(),
                path,
            });
        }
        Err(source) => {
            tracing::error!(path = %path.display(), error = %source, "Cannot read collector definition");
            return Err(DefinitionError::Unreadable { path, source });
        }
    };

    let definition = CollectorDefinition::parse(id, &path, &content)
        .map_err(|reason| DefinitionError::Malformed {
            path: path.clone(),
            reason,
        })?;

    tracing::debug!(id = %definition.id, path = %path.display(), "Collector parsed");
    Ok(definition)
}

/// Sorted definition file paths; unreadable entries are skipped with a warning.
fn definition_paths(entries: impl IntoIterator<Item = std::io::Result<PathBuf>>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read directory entry, skipping");
                continue;
            }
        };
        let is_definition = path
            .extension()
            .is_some_and(|ext| ext == DEFINITION_EXTENSION);
        if is_definition && !path.is_dir() {
            paths.push(path);
        }
    }
    paths.sort();
    paths
}
