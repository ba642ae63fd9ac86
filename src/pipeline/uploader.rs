//! Artifact upload to the ingress endpoint.

use std::path::{Path, PathBuf};

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use thiserror::Error;

use crate::config::IngressConfig;

/// Content type used when a definition declares none.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Maximum number of response body characters kept in errors.
const MAX_BODY_CHARS: usize = 200;

/// Errors raised by uploaders.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The uploader could not be configured.
    #[error("invalid uploader configuration: {0}")]
    InvalidConfig(String),

    /// The artifact was not accepted.
    #[error("cannot upload '{}': {reason}", artifact.display())]
    UploadFailed { artifact: PathBuf, reason: String },
}

/// Ships a packaged artifact to the ingestion endpoint.
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    /// Send `artifact` declared as `content_type`.
    async fn upload(&self, artifact: &Path, content_type: &str) -> Result<(), UploadError>;
}

/// Multipart HTTP uploader with optional client certificate and proxy.
#[derive(Debug, Clone)]
pub struct IngressUploader {
    client: Client,
    url: String,
}

impl IngressUploader {
    /// Create an uploader from ingress configuration.
    ///
    /// A missing certificate at the default registration paths only logs a
    /// warning, and the client is built without an identity.
    ///
    /// # Errors
    /// Returns `UploadError::InvalidConfig` if the certificate, key or proxy
    /// cannot be used.
    pub fn from_config(config: &IngressConfig) -> Result<Self, UploadError> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let (Some(cert), Some(key)) = (&config.cert, &config.key) {
            if let Some(identity) = load_identity(cert, key, config.uses_default_identity())? {
                builder = builder.identity(identity);
                tracing::debug!(cert = %cert.display(), "Using certificate authentication");
            }
        }

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| UploadError::InvalidConfig(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::debug!("Using upload proxy");
        }

        let client = builder
            .build()
            .map_err(|e| UploadError::InvalidConfig(e.to_string()))?;
        Ok(Self::new(client, &config.url))
    }

    /// Create an uploader from an existing client.
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Upload URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Read a PEM certificate and key into a client identity.
///
/// With `optional`, a missing file yields `None` instead of an error.
fn load_identity(
    cert: &Path,
    key: &Path,
    optional: bool,
) -> Result<Option<reqwest::Identity>, UploadError> {
    let mut pem = Vec::new();
    for path in [cert, key] {
        match std::fs::read(path) {
            Ok(content) => {
                pem.extend(content);
                pem.push(b'\n');
            }
            Err(e) if optional && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Client certificate not found, uploading without certificate authentication"
                );
                return Ok(None);
            }
            Err(e) => {
                return Err(UploadError::InvalidConfig(format!(
                    "cannot read '{}': {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    reqwest::Identity::from_pem(&pem)
        .map(Some)
        .map_err(|e| UploadError::InvalidConfig(format!("invalid client identity: {}", e)))
}

#[async_trait::async_trait]
impl Uploader for IngressUploader {
    async fn upload(&self, artifact: &Path, content_type: &str) -> Result<(), UploadError> {
        let failed = |reason: String| UploadError::UploadFailed {
            artifact: artifact.to_path_buf(),
            reason,
        };

        let data = tokio::fs::read(artifact)
            .await
            .map_err(|e| failed(format!("cannot read artifact: {}", e)))?;
        let size = data.len();
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "collection.tar.gz".to_string());
        let content_type = if content_type.is_empty() {
            FALLBACK_CONTENT_TYPE
        } else {
            content_type
        };

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(|e| failed(format!("invalid content type '{}': {}", content_type, e)))?;
        let form = Form::new().part("file", part);

        tracing::debug!(url = %self.url, artifact = %artifact.display(), size, content_type = %content_type, "Uploading artifact");
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_BODY_CHARS).collect();
            tracing::error!(status = %status, body = %body, "Upload rejected");
            return Err(failed(format!("HTTP status {}: {}", status, body.trim())));
        }

        tracing::info!(status = %status, artifact = %artifact.display(), "Artifact uploaded");
        Ok(())
    }
}
