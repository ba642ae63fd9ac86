//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{
    ConfigError, expand_env_vars, require_path, require_positive, validate_directory_mode,
    validate_env_var_name, validate_url,
};

// =============================================================================
// Constants
// =============================================================================

/// Default directory holding collector definition files.
pub const DEFAULT_DEFINITIONS_DIR: &str = "/etc/gather/collectors.d";

/// Default parent directory for per-run output directories.
pub const DEFAULT_COLLECTIONS_DIR: &str = "/tmp";

/// Default directory for last-run records and run locks.
pub const DEFAULT_CACHE_DIR: &str = "/var/cache/gather";

/// Environment variable naming the output directory for the subprocess.
pub const DEFAULT_ENV_VAR: &str = "COLLECTION_DIRECTORY";

/// Permissions applied to freshly created output directories.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o750;

/// Default deadline for one collector execution (30 minutes).
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default ingress endpoint.
pub const DEFAULT_INGRESS_URL: &str = "https://cert.console.redhat.com/api/ingress/v1/upload";

/// Ingress endpoint selected when `RHC_ENVIRONMENT=stage`.
pub const STAGE_INGRESS_URL: &str =
    "https://cert.console.stage.redhat.com/api/ingress/v1/upload";

/// Environment variable selecting the ingress environment.
pub const ENVIRONMENT_VAR: &str = "RHC_ENVIRONMENT";

/// Default client certificate issued at host registration.
pub const DEFAULT_CERT_PATH: &str = "/etc/pki/consumer/cert.pem";

/// Default client private key issued at host registration.
pub const DEFAULT_KEY_PATH: &str = "/etc/pki/consumer/key.pem";

/// Default upload request timeout (5 minutes).
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

fn default_definitions_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DEFINITIONS_DIR)
}

fn default_collections_dir() -> PathBuf {
    PathBuf::from(DEFAULT_COLLECTIONS_DIR)
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_env_var() -> String {
    DEFAULT_ENV_VAR.to_string()
}

fn default_directory_mode() -> u32 {
    DEFAULT_DIRECTORY_MODE
}

fn default_execution_timeout() -> Duration {
    DEFAULT_EXECUTION_TIMEOUT
}

fn default_ingress_url() -> String {
    DEFAULT_INGRESS_URL.to_string()
}

fn default_cert() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_CERT_PATH))
}

fn default_key() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_KEY_PATH))
}

fn default_upload_timeout() -> Duration {
    DEFAULT_UPLOAD_TIMEOUT
}

// =============================================================================
// Paths Configuration
// =============================================================================

/// Filesystem locations used by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory with `<id>.toml` collector definitions.
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,

    /// Parent directory for per-run output directories.
    #[serde(default = "default_collections_dir")]
    pub collections_dir: PathBuf,

    /// Directory for `<id>.last-run` records and `<id>.lock` files.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            collections_dir: default_collections_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

// =============================================================================
// Execution Configuration
// =============================================================================

/// Subprocess execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Variable carrying the output directory path to the subprocess.
    #[serde(default = "default_env_var")]
    pub env_var: String,

    /// Unix permissions of created output directories (default: 0o750).
    #[serde(default = "default_directory_mode")]
    pub directory_mode: u32,

    /// Deadline applied when a definition has no `exec.timeout` (default: 30m).
    #[serde(default = "default_execution_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Run the subprocess as the definition's `uid`/`gid` (default: false).
    #[serde(default)]
    pub enforce_identity: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            env_var: default_env_var(),
            directory_mode: default_directory_mode(),
            timeout: default_execution_timeout(),
            enforce_identity: false,
        }
    }
}

// =============================================================================
// Ingress Configuration
// =============================================================================

/// Upload endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Upload URL.
    #[serde(default = "default_ingress_url")]
    pub url: String,

    /// Client certificate (PEM). `null` disables client authentication.
    #[serde(default = "default_cert")]
    pub cert: Option<PathBuf>,

    /// Client private key (PEM).
    #[serde(default = "default_key")]
    pub key: Option<PathBuf>,

    /// Proxy URL applied to all upload requests.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Request timeout (default: 5m).
    #[serde(default = "default_upload_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            url: default_ingress_url(),
            cert: default_cert(),
            key: default_key(),
            proxy: None,
            timeout: default_upload_timeout(),
        }
    }
}

impl IngressConfig {
    /// Point the default URL at the stage host when `environment` is `stage`.
    ///
    /// An explicitly configured URL is never changed.
    pub fn select_environment(&mut self, environment: Option<&str>) {
        let is_stage = environment.is_some_and(|env| env.trim().eq_ignore_ascii_case("stage"));
        if is_stage && self.url == DEFAULT_INGRESS_URL {
            tracing::debug!(url = STAGE_INGRESS_URL, "Using stage ingress");
            self.url = STAGE_INGRESS_URL.to_string();
        }
    }

    /// Whether the identity paths are the registration defaults.
    pub fn uses_default_identity(&self) -> bool {
        self.cert.as_deref() == Some(Path::new(DEFAULT_CERT_PATH))
            && self.key.as_deref() == Some(Path::new(DEFAULT_KEY_PATH))
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Subprocess execution settings.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Upload endpoint settings.
    #[serde(default)]
    pub ingress: IngressConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` references in path and ingress values are expanded.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        config.expand_env();
        config.apply_environment();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.apply_environment();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    fn apply_environment(&mut self) {
        let environment = std::env::var(ENVIRONMENT_VAR).ok();
        self.ingress.select_environment(environment.as_deref());
    }

    fn expand_env(&mut self) {
        let expand_path = |p: &PathBuf| PathBuf::from(expand_env_vars(&p.to_string_lossy()));

        self.paths.definitions_dir = expand_path(&self.paths.definitions_dir);
        self.paths.collections_dir = expand_path(&self.paths.collections_dir);
        self.paths.cache_dir = expand_path(&self.paths.cache_dir);

        self.ingress.url = expand_env_vars(&self.ingress.url);
        self.ingress.cert = self.ingress.cert.as_ref().map(expand_path);
        self.ingress.key = self.ingress.key.as_ref().map(expand_path);
        // An unset `${HTTP_PROXY:-}` means no proxy
        self.ingress.proxy = self
            .ingress
            .proxy
            .as_deref()
            .map(expand_env_vars)
            .filter(|proxy| !proxy.trim().is_empty());
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_path("paths.definitions_dir", &self.paths.definitions_dir)?;
        require_path("paths.collections_dir", &self.paths.collections_dir)?;
        require_path("paths.cache_dir", &self.paths.cache_dir)?;

        validate_env_var_name("execution.env_var", &self.execution.env_var)?;
        validate_directory_mode("execution.directory_mode", self.execution.directory_mode)?;
        require_positive("execution.timeout", self.execution.timeout)?;

        validate_url("ingress.url", &self.ingress.url)?;
        if let Some(proxy) = &self.ingress.proxy {
            validate_url("ingress.proxy", proxy)?;
        }
        if self.ingress.cert.is_some() != self.ingress.key.is_some() {
            return Err(ConfigError::ValidationError(
                "ingress cert and key must be set together".to_string(),
            ));
        }
        require_positive("ingress.timeout", self.ingress.timeout)?;

        Ok(())
    }
}
