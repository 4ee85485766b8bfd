/// Secret stores
///
/// Long-lived secret material is read once per credential at startup.
/// Providers differ only in how a [`SecretRef`] is resolved.
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::config::credentials::{SecretProvider, SecretStoreConfig};

pub mod aws;
pub mod gcp;

use aws::AwsSecretSource;
use gcp::GcpSecretSource;

/// Where a secret lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    /// project / secret id / version triple (GCP Secret Manager)
    Versioned {
        project_id: String,
        secret_id: String,
        version: String,
    },
    /// bare secret id (AWS managed secret cache)
    Named { secret_id: String },
}

impl SecretRef {
    pub fn secret_id(&self) -> &str {
        match self {
            SecretRef::Versioned { secret_id, .. } | SecretRef::Named { secret_id } => secret_id,
        }
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretRef::Versioned { project_id, secret_id, version } => {
                write!(f, "projects/{}/secrets/{}/versions/{}", project_id, secret_id, version)
            }
            SecretRef::Named { secret_id } => write!(f, "{}", secret_id),
        }
    }
}

/// Raw secret bytes, shared read-only between the workers of one credential
#[derive(Clone, PartialEq, Eq)]
pub struct SecretMaterial(Arc<[u8]>);

impl SecretMaterial {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretMaterial(<{} bytes redacted>)", self.0.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretFetchError {
    #[error("secret store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("secret store returned {status} for '{secret}': {body}")]
    Status { secret: String, status: u16, body: String },
    #[error("secret payload for '{secret}' is invalid: {reason}")]
    Payload { secret: String, reason: String },
    #[error("{provider} secret store cannot resolve reference '{secret}'")]
    UnsupportedRef { provider: &'static str, secret: String },
    #[error("missing credentials for the secret store: {0}")]
    Unauthenticated(String),
}

/// Resolves a [`SecretRef`] into secret bytes
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<SecretMaterial, SecretFetchError>;
}

/// Build the configured provider
pub fn build_secret_source(cfg: &SecretStoreConfig, client: Client) -> Arc<dyn SecretSource> {
    info!(provider = cfg.provider.as_str(), "secret store selected");
    match cfg.provider {
        SecretProvider::Gcp => Arc::new(GcpSecretSource::from_config(cfg, client)),
        SecretProvider::Aws => Arc::new(AwsSecretSource::from_config(cfg, client)),
    }
}

/// Error bodies are truncated before they end up in logs
pub(crate) fn truncate_body(body: String) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
