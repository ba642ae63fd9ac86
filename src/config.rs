//! Configuration module for the gather agent.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Filesystem locations (definitions, output directories, run-state cache)
//! - Subprocess execution (environment contract, permissions, deadline)
//! - Ingress upload endpoint (URL, client certificate, proxy)

mod app;
mod validation;

pub use app::{AppConfig, ExecutionConfig, IngressConfig, PathsConfig};
pub use validation::{ConfigError, expand_env_vars};

// Re-export constants
pub use app::{
    DEFAULT_CACHE_DIR, DEFAULT_CERT_PATH, DEFAULT_COLLECTIONS_DIR, DEFAULT_DEFINITIONS_DIR,
    DEFAULT_DIRECTORY_MODE, DEFAULT_ENV_VAR, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_INGRESS_URL,
    DEFAULT_KEY_PATH, DEFAULT_UPLOAD_TIMEOUT, ENVIRONMENT_VAR, STAGE_INGRESS_URL,
};
