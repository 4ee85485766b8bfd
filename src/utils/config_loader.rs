use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::credentials::ServiceConfig;
use crate::config::{env_loader, proc_loader::file_to_config};

/// YAML file when a path is given, the environment-variable layout otherwise
pub async fn run(config_path: Option<&Path>) -> Result<ServiceConfig> {
    match config_path {
        Some(path) => {
            info!(path = %path.display(), "loading config file");
            file_to_config(path)
                .await
                .with_context(|| format!("invalid config '{}'", path.display()))
        }
        None => env_loader::from_env().await.context("invalid environment configuration"),
    }
}
