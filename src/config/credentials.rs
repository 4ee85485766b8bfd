use serde::Deserialize;

use crate::cache::token::TokenKind;
use crate::config::settings::SettingsConfig;
use crate::utils::constants::{DEFAULT_SECRET_VERSION, DEFAULT_TOKEN_FIELD, PROVIDER_AWS, PROVIDER_GCP};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub secret_store: SecretStoreConfig,
    pub credentials: Vec<CredentialConfig>,
}

/// ================================
/// Secret store
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SecretStoreConfig {
    pub provider: SecretProvider,
    /// required for gcp
    pub project_id: Option<String>,
    /// override of the provider API base (emulators, tests)
    pub endpoint: Option<String>,
    /// gcp only: where the access token for secret manager comes from
    pub metadata_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecretProvider {
    Gcp,
    Aws,
}

impl SecretProvider {
    /// Parse the `SECRET_STORE` tag of the env layout
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            PROVIDER_GCP => Some(SecretProvider::Gcp),
            PROVIDER_AWS => Some(SecretProvider::Aws),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretProvider::Gcp => PROVIDER_GCP,
            SecretProvider::Aws => PROVIDER_AWS,
        }
    }
}

/// ================================
/// Credentials
/// ================================
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CredentialConfig {
    /// unique, also the cache slot name
    pub id: String,
    pub secret_id: String,
    #[serde(default = "default_secret_version")]
    pub secret_version: String,
    /// absent: the secret is published verbatim and never exchanged
    pub token_url: Option<String>,
    #[serde(default = "default_token_field")]
    pub token_field: String,
    #[serde(default)]
    pub token_type: TokenKind,
    /// overrides `settings.refresh.redundancy`
    pub redundancy: Option<usize>,
    /// overrides the derived offsets; one entry per worker
    pub stagger_offsets_seconds: Option<Vec<u64>>,
}

impl CredentialConfig {
    pub fn redundancy(&self, settings: &SettingsConfig) -> usize {
        self.stagger_offsets_seconds
            .as_ref()
            .map(|offsets| offsets.len())
            .or(self.redundancy)
            .unwrap_or(settings.refresh.redundancy)
    }
}

pub fn default_secret_version() -> String {
    DEFAULT_SECRET_VERSION.to_owned()
}

pub fn default_token_field() -> String {
    DEFAULT_TOKEN_FIELD.to_owned()
}
