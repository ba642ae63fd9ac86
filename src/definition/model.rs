//! Collector definition model and TOML document schema.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[meta]` section of a definition file.
#[derive(Debug, Clone, Default, Deserialize)]
struct MetaSection {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    feature: String,
}

/// `[exec]` section of a definition file.
#[derive(Debug, Clone, Deserialize)]
struct ExecSection {
    command: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    uid: Option<u32>,
    #[serde(default)]
    gid: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

/// `[systemd]` section of a definition file.
#[derive(Debug, Clone, Default, Deserialize)]
struct SystemdSection {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    timer: Option<String>,
}

/// On-disk layout of `<id>.toml`.
#[derive(Debug, Clone, Deserialize)]
struct DefinitionDocument {
    #[serde(default)]
    meta: MetaSection,
    exec: ExecSection,
    #[serde(default)]
    systemd: SystemdSection,
}

/// A validated collector definition.
///
/// Created by [`DefinitionStore`](super::DefinitionStore) at load time and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorDefinition {
    /// Stable identity, taken from the definition's file stem.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Feature the collected data belongs to.
    pub feature: String,
    /// Shell-less command line; first token is the executable.
    pub command: String,
    /// Payload format handed to the uploader.
    pub content_type: String,
    /// Advisory user identity for the subprocess.
    pub uid: Option<u32>,
    /// Advisory group identity for the subprocess.
    pub gid: Option<u32>,
    /// Associated systemd service unit.
    pub service: Option<String>,
    /// Associated systemd timer unit.
    pub timer: Option<String>,
    /// Per-collector execution deadline.
    pub timeout: Option<Duration>,
    /// Absolute path the definition was loaded from.
    pub source_path: PathBuf,
}

impl CollectorDefinition {
    /// Create a definition in memory.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            feature: String::new(),
            command: command.into(),
            content_type: String::new(),
            uid: None,
            gid: None,
            service: None,
            timer: None,
            timeout: None,
            source_path: PathBuf::new(),
        }
    }

    /// Parse a TOML definition document.
    ///
    /// `id` is the file stem and takes precedence over `meta.id`.
    pub(crate) fn parse(id: &str, source_path: &Path, content: &str) -> Result<Self, String> {
        let doc: DefinitionDocument = toml::from_str(content).map_err(|e| e.to_string())?;

        if let Some(declared) = doc.meta.id.as_deref().filter(|declared| *declared != id) {
            tracing::warn!(
                id = %id,
                declared = %declared,
                path = %source_path.display(),
                "meta.id differs from file name, using file name"
            );
        }

        let definition = Self {
            id: id.to_string(),
            name: doc.meta.name,
            feature: doc.meta.feature,
            command: doc.exec.command,
            content_type: doc.exec.content_type,
            uid: doc.exec.uid,
            gid: doc.exec.gid,
            service: doc.systemd.service,
            timer: doc.systemd.timer,
            timeout: doc.exec.timeout,
            source_path: source_path.to_path_buf(),
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Check the command-token invariant and the per-collector deadline.
    pub fn validate(&self) -> Result<(), String> {
        if self.argv().is_empty() {
            return Err("exec.command must contain at least one token".to_string());
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err("exec.timeout must be positive".to_string());
        }
        Ok(())
    }

    /// Whether `id` can safely name files and directories.
    ///
    /// Ids are ASCII alphanumerics plus `-`, `_` and `.`, and never start with `.`.
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    /// Split the command into executable and arguments.
    pub fn argv(&self) -> Vec<&str> {
        self.command.split_whitespace().collect()
    }

    /// Set display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set feature.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = feature.into();
        self
    }

    /// Set content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set the execution deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the advisory identity.
    pub fn with_identity(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }
}

/// Serializable projection of a definition for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectorInfo {
    pub id: String,
    pub name: String,
    pub feature: String,
    pub command: String,
    pub content_type: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub path: PathBuf,
    pub systemd_service: Option<String>,
    pub systemd_timer: Option<String>,
}

impl From<&CollectorDefinition> for CollectorInfo {
    fn from(definition: &CollectorDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            feature: definition.feature.clone(),
            command: definition.command.clone(),
            content_type: definition.content_type.clone(),
            uid: definition.uid,
            gid: definition.gid,
            path: definition.source_path.clone(),
            systemd_service: definition.service.clone(),
            systemd_timer: definition.timer.clone(),
        }
    }
}
