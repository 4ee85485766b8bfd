use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::{debug, error};

use crate::config::credentials::ServiceConfig;
use crate::config::proc_validator;
use crate::config::settings::LoggingConfig;
use crate::observability::metrics::get_metrics;

/// Load and validate config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file '{}'", path.display()))?;

    let expanded = expand_env_vars(&content)?;
    parse_config(expanded).await
}

pub async fn parse_config(content: String) -> Result<ServiceConfig> {
    let metrics = get_metrics().await;
    let service_config: ServiceConfig = serde_yaml::from_str(&content).inspect_err(|e| {
        error!("parse config error: {}", e);
        metrics.config_validation_errors.inc();
    })?;

    finalize(service_config).await
}

/// Apply defaults and run the validator; shared by every config front-end
pub async fn finalize(mut service_config: ServiceConfig) -> Result<ServiceConfig> {
    if service_config.settings.logging.is_none() {
        service_config.settings.logging = Some(LoggingConfig::default());
    }
    debug!("validation config ...");
    proc_validator::validate_service_config(&service_config)
        .await
        .map_err(|errors| {
            anyhow!(
                "config is not valid, total errors: {}\n{}",
                errors.len(),
                errors.join("\n")
            )
        })?;

    Ok(service_config)
}

/// Expand `${VAR}` and `${VAR:default}`; a variable with neither a value
/// nor a default is an error.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]*))?\}")?;
    let mut missing = Vec::new();
    let expanded = re
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            match (std::env::var(var), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_owned(),
                (Err(_), None) => {
                    missing.push(var.to_owned());
                    String::new()
                }
            }
        })
        .to_string();

    if !missing.is_empty() {
        return Err(anyhow!("undefined environment variables in config: {}", missing.join(", ")));
    }
    Ok(expanded)
}
