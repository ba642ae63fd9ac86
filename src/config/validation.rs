//! Configuration errors and field checks.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

static ENV_VAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var reference pattern is valid")
});

/// Expand `${VAR}` and `${VAR:-default}` references.
///
/// Unset variables without a default expand to an empty string.
///
/// ```
/// use gather::config::expand_env_vars;
///
/// assert_eq!(
///     expand_env_vars("${GATHER_DOC_UNSET_VAR:-/var/cache/gather}/locks"),
///     "/var/cache/gather/locks"
/// );
/// ```
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR_REF
        .replace_all(input, |caps: &regex::Captures| {
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| fallback.to_string())
        })
        .into_owned()
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError(message)
}

pub(crate) fn require_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(invalid(format!("{} cannot be empty", field)));
    }
    Ok(())
}

pub(crate) fn require_positive(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(invalid(format!("{} must be positive", field)));
    }
    Ok(())
}

/// Names passed to the subprocess environment: `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn validate_env_var_name(field: &str, name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(invalid(format!(
            "{} is not a valid environment variable name: '{}'",
            field, name
        )));
    }
    Ok(())
}

/// The owner keeps full access so the agent can always remove the directory.
pub(crate) fn validate_directory_mode(field: &str, mode: u32) -> Result<(), ConfigError> {
    if mode > 0o777 || mode & 0o700 != 0o700 {
        return Err(invalid(format!(
            "{} {:#o} must be within 0o777 and owner rwx",
            field, mode
        )));
    }
    Ok(())
}

pub(crate) fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| invalid(format!("invalid {} '{}': {}", field, value, e)))
}
