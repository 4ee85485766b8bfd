//! Environment-variable configuration layout.
//!
//! ```text
//! SECRET_STORE=GCP|AWS        NUM_SECRETS=<n>        PROJECT_ID=<gcp project>
//! TOKEN_URL=<default url>     TOKEN_FIELD=<default field>
//! SECRET_ID_<i>  SECRET_VERSION_<i>  TOKEN_URL_<i>  TOKEN_FIELD_<i>  TOKEN_TYPE_<i>
//! ```
//! `<i>` runs from 0 to `NUM_SECRETS - 1`. When `SECRET_STORE` is not set in
//! the process environment the variables are read from `./conf.env`.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::cache::token::TokenKind;
use crate::config::credentials::{
    default_secret_version, default_token_field, CredentialConfig, SecretProvider, SecretStoreConfig,
    ServiceConfig,
};
use crate::config::proc_loader::finalize;
use crate::config::settings::{LogFormat, LoggingConfig, SettingsConfig};
use crate::utils::constants::CONF_ENV_FILE;

const CONF_ENV_TEMPLATE: &str = "# SECRET STORE\nSECRET_STORE=\nNUM_SECRETS=1\n# SECRET MANAGER\nPROJECT_ID=\nSECRET_ID_0=\nSECRET_VERSION_0=\nSECRET_ID_1=\nSECRET_VERSION_1=\n# AUTH\nTOKEN_URL=\nTOKEN_FIELD=access_token\n";

/// Build the service configuration from the process environment
pub async fn from_env() -> Result<ServiceConfig> {
    from_env_with_file(Path::new(CONF_ENV_FILE)).await
}

pub async fn from_env_with_file(conf_env: &Path) -> Result<ServiceConfig> {
    if std::env::var("SECRET_STORE").map(|v| v.is_empty()).unwrap_or(true) {
        if !conf_env.exists() {
            std::fs::write(conf_env, CONF_ENV_TEMPLATE)
                .with_context(|| format!("cannot create template '{}'", conf_env.display()))?;
            warn!(path = %conf_env.display(), "env template written, fill it in and restart");
            return Err(anyhow!(
                "missing '{}' and SECRET_STORE not defined; a template was generated",
                conf_env.display()
            ));
        }
        dotenvy::from_path(conf_env)
            .with_context(|| format!("error loading '{}'", conf_env.display()))?;
        info!(path = %conf_env.display(), "loaded environment file");
    }

    let cfg = build_from_vars(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))?;
    finalize(cfg).await
}

/// Pure mapping from variable lookups to a config, no validation yet
pub fn build_from_vars<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let tag = lookup("SECRET_STORE").ok_or_else(|| anyhow!("missing env var: SECRET_STORE"))?;
    let provider = SecretProvider::from_tag(&tag)
        .ok_or_else(|| anyhow!("invalid SECRET_STORE '{}', expected GCP or AWS", tag))?;

    let count: usize = lookup("NUM_SECRETS")
        .and_then(|n| n.trim().parse().ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| anyhow!("missing or invalid env var: NUM_SECRETS"))?;

    let default_url = lookup("TOKEN_URL");
    let default_field = lookup("TOKEN_FIELD").unwrap_or_else(default_token_field);

    let mut credentials = Vec::with_capacity(count);
    for i in 0..count {
        let secret_id = lookup(&format!("SECRET_ID_{}", i))
            .ok_or_else(|| anyhow!("missing env var: SECRET_ID_{}", i))?;
        let token_type = match lookup(&format!("TOKEN_TYPE_{}", i)) {
            None => TokenKind::Bearer,
            Some(raw) => parse_token_type(&raw)
                .ok_or_else(|| anyhow!("invalid TOKEN_TYPE_{} '{}', expected BEARER or APIKEY", i, raw))?,
        };
        let token_url = match token_type {
            TokenKind::Bearer => Some(
                lookup(&format!("TOKEN_URL_{}", i))
                    .or_else(|| default_url.clone())
                    .ok_or_else(|| anyhow!("missing env var: TOKEN_URL or TOKEN_URL_{}", i))?,
            ),
            // api keys are used as-is
            TokenKind::ApiKey => None,
        };

        credentials.push(CredentialConfig {
            id: credential_id(i),
            secret_id,
            secret_version: lookup(&format!("SECRET_VERSION_{}", i)).unwrap_or_else(default_secret_version),
            token_url,
            token_field: lookup(&format!("TOKEN_FIELD_{}", i)).unwrap_or_else(|| default_field.clone()),
            token_type,
            redundancy: None,
            stagger_offsets_seconds: None,
        });
    }

    let settings = SettingsConfig {
        logging: Some(LoggingConfig::new(
            lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_owned()).to_lowercase(),
            lookup("LOG_FORMAT").map(|f| LogFormat::from_tag(&f)).unwrap_or(LogFormat::Compact),
        )),
        ..SettingsConfig::default()
    };

    Ok(ServiceConfig {
        settings,
        secret_store: SecretStoreConfig {
            provider,
            project_id: lookup("PROJECT_ID"),
            endpoint: None,
            metadata_url: None,
        },
        credentials,
    })
}

pub fn credential_id(index: usize) -> String {
    match index {
        0 => "primary".to_owned(),
        i => format!("secret_{}", i),
    }
}

fn parse_token_type(raw: &str) -> Option<TokenKind> {
    match raw.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
        "bearer" => Some(TokenKind::Bearer),
        "apikey" => Some(TokenKind::ApiKey),
        _ => None,
    }
}
