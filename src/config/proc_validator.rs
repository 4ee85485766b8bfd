//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Checks settings invariants (retry, refresh scheduling, logging, metrics)
//! - Checks the secret store against the configured provider
//! - Checks every credential (ids, secret refs, endpoints, stagger offsets)

use reqwest::Url;
use std::collections::HashSet;
use tracing::{error, info};

use crate::cache::token_cache::MAIL_CREDS_SLOT;
use crate::config::credentials::{CredentialConfig, SecretProvider, SecretStoreConfig, ServiceConfig};
use crate::config::settings::{RefreshConfig, RetryConfig, SettingsConfig};
use crate::observability::metrics::get_metrics;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let errors = collect_errors(cfg);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

pub fn collect_errors(cfg: &ServiceConfig) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_secret_store(&cfg.secret_store, &mut errors);

    if cfg.credentials.is_empty() {
        errors.push("config: 'credentials' is empty; at least one credential required".to_string());
    }

    let mut seen_ids = HashSet::new();
    for (index, credential) in cfg.credentials.iter().enumerate() {
        let path = format!("credentials[{}]", index);
        if !credential.id.trim().is_empty() && !seen_ids.insert(credential.id.clone()) {
            errors.push(format!("{}: duplicate credential id '{}'", path, credential.id));
        }
        validate_credential(&path, credential, &cfg.settings, &mut errors);
    }

    errors
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(retry) = &settings.retry {
        validate_retry("settings.retry", retry, errors);
    }
    validate_refresh("settings.refresh", &settings.refresh, errors);

    if settings.http_timeout_ms == Some(0) {
        errors.push("settings.http_timeout_ms must be > 0".to_string());
    }

    if let Some(server) = &settings.server {
        if server.host.is_empty() {
            errors.push("settings.server.host must not be empty".to_string());
        }
        if server.port.parse::<u16>().is_err() {
            errors.push(format!("settings.server.port '{}' must be a valid port", server.port));
        }
    }

    if !settings.metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            settings.metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if let Some(attempts) = retry.attempts {
        if attempts == 0 {
            errors.push(format!("{}.attempts must be > 0", path));
        }
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}

fn validate_refresh(path: &str, refresh: &RefreshConfig, errors: &mut Vec<String>) {
    if refresh.redundancy == 0 {
        errors.push(format!("{}.redundancy must be >= 1", path));
    }
    if refresh.fallback_interval_seconds == 0 {
        errors.push(format!("{}.fallback_interval_seconds must be >= 1", path));
    }
    if refresh.redundancy > 1 && refresh.stagger_seconds == 0 {
        errors.push(format!(
            "{}.stagger_seconds must be > 0 when redundancy is {}",
            path, refresh.redundancy
        ));
    }
}

/// SECRET STORE
fn validate_secret_store(store: &SecretStoreConfig, errors: &mut Vec<String>) {
    match store.provider {
        SecretProvider::Gcp => {
            if store.project_id.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                errors.push("secret_store.project_id is required for provider gcp".to_string());
            }
        }
        SecretProvider::Aws => {
            if store.metadata_url.is_some() {
                errors.push("secret_store.metadata_url is only valid for provider gcp".to_string());
            }
        }
    }
    for (field, value) in [("endpoint", &store.endpoint), ("metadata_url", &store.metadata_url)] {
        if let Some(url) = value {
            if !is_http_url(url) {
                errors.push(format!("secret_store.{} '{}' must be an http(s) URL", field, url));
            }
        }
    }
}

/// CREDENTIAL BASICS
fn validate_credential(
    path: &str,
    credential: &CredentialConfig,
    settings: &SettingsConfig,
    errors: &mut Vec<String>,
) {
    if credential.id.trim().is_empty() {
        errors.push(format!("{}.id cannot be empty", path));
    }
    if credential.id == MAIL_CREDS_SLOT {
        errors.push(format!("{}.id '{}' is reserved", path, MAIL_CREDS_SLOT));
    }
    if credential.secret_id.trim().is_empty() {
        errors.push(format!("{}.secret_id cannot be empty", path));
    }
    if credential.secret_version.trim().is_empty() {
        errors.push(format!("{}.secret_version cannot be empty", path));
    }
    if credential.token_field.trim().is_empty() {
        errors.push(format!("{}.token_field cannot be empty", path));
    }
    if let Some(url) = &credential.token_url {
        if !is_http_url(url) {
            errors.push(format!("{}.token_url '{}' must be an http(s) URL", path, url));
        }
    }

    if credential.redundancy == Some(0) {
        errors.push(format!("{}.redundancy must be >= 1", path));
    }

    if let Some(offsets) = &credential.stagger_offsets_seconds {
        if offsets.is_empty() {
            errors.push(format!("{}.stagger_offsets_seconds cannot be empty", path));
        }
        if let Some(redundancy) = credential.redundancy {
            if redundancy != offsets.len() {
                errors.push(format!(
                    "{}.stagger_offsets_seconds has {} entries but redundancy is {}",
                    path,
                    offsets.len(),
                    redundancy
                ));
            }
        }
        if offsets.first().is_some_and(|first| *first != 0) {
            errors.push(format!("{}.stagger_offsets_seconds must start with 0", path));
        }
        let distinct: HashSet<&u64> = offsets.iter().collect();
        if distinct.len() != offsets.len() {
            errors.push(format!("{}.stagger_offsets_seconds must be distinct", path));
        }
    }

    if credential.token_url.is_some() && credential.redundancy(settings) > 1 && settings.refresh.stagger_seconds == 0
        && credential.stagger_offsets_seconds.is_none()
    {
        errors.push(format!(
            "{}: redundant workers need stagger offsets or settings.refresh.stagger_seconds > 0",
            path
        ));
    }
}

fn is_http_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some())
        .unwrap_or(false)
}
