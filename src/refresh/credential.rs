use std::time::Duration;

use crate::cache::token::TokenKind;
use crate::config::credentials::{CredentialConfig, SecretProvider, ServiceConfig};
use crate::secrets::SecretRef;

/// A configured identity whose secret and refresh behaviour the engine owns.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub secret_ref: SecretRef,
    /// `None`: publish the secret itself, never exchange it
    pub token_endpoint: Option<String>,
    pub token_field: String,
    pub token_kind: TokenKind,
    /// one entry per worker, first exchange of worker `k` waits `stagger_offsets[k]`
    pub stagger_offsets: Vec<Duration>,
}

impl Credential {
    pub fn is_refreshed(&self) -> bool {
        self.token_endpoint.is_some()
    }

    /// Cache slot the credential publishes into
    pub fn slot(&self) -> &str {
        &self.id
    }

    pub fn from_config(cfg: &CredentialConfig, service: &ServiceConfig) -> Self {
        let secret_ref = match service.secret_store.provider {
            SecretProvider::Gcp => SecretRef::Versioned {
                project_id: service.secret_store.project_id.clone().unwrap_or_default(),
                secret_id: cfg.secret_id.clone(),
                version: cfg.secret_version.clone(),
            },
            SecretProvider::Aws => SecretRef::Named { secret_id: cfg.secret_id.clone() },
        };

        let stagger_offsets = match &cfg.stagger_offsets_seconds {
            Some(offsets) => offsets.iter().map(|s| Duration::from_secs(*s)).collect(),
            None => service.settings.refresh.default_offsets(cfg.redundancy(&service.settings)),
        };

        Self {
            id: cfg.id.clone(),
            secret_ref,
            token_endpoint: cfg.token_url.clone(),
            token_field: cfg.token_field.clone(),
            token_kind: cfg.token_type,
            stagger_offsets,
        }
    }
}

/// Every credential of a validated configuration, in configuration order
pub fn credentials_from_config(service: &ServiceConfig) -> Vec<Credential> {
    service
        .credentials
        .iter()
        .map(|cfg| Credential::from_config(cfg, service))
        .collect()
}
