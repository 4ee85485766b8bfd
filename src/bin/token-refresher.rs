use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use token_refresher::cache::token_cache::TokenCache;
use token_refresher::exchange::HttpExchanger;
use token_refresher::helpers::time::system_clock;
use token_refresher::observability::metrics::get_metrics;
use token_refresher::refresh::{credentials_from_config, RefreshEngine, WorkerOptions};
use token_refresher::resilience::retry::RetrySettings;
use token_refresher::secrets::build_secret_source;
use token_refresher::server;
use token_refresher::server::server::AppState;
use token_refresher::utils::config_loader;
use token_refresher::utils::logging::{self, LogLevel};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config; without it the SECRET_STORE / conf.env layout is used
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // -------------------------------
    // 1. Load and validate config
    // -------------------------------

    let service_config = config_loader::run(args.config.as_deref()).await?;
    logging::run(&service_config, args.log_level);
    let settings = &service_config.settings;

    // -------------------------------
    // 2. Clients for the secret store and the token endpoints
    // -------------------------------

    let client = Client::builder()
        .timeout(settings.http_timeout())
        .build()
        .context("cannot build http client")?;
    let secrets = build_secret_source(&service_config.secret_store, client.clone());
    let exchanger = HttpExchanger::new(client, RetrySettings::from(&settings.retry));

    // -------------------------------
    // 3. Fetch secrets and start refresh workers
    // -------------------------------

    let clock = system_clock();
    let cache = TokenCache::new();
    let cancel = CancellationToken::new();
    let engine = RefreshEngine::new(
        credentials_from_config(&service_config),
        secrets,
        Arc::new(exchanger),
        cache.clone(),
        WorkerOptions {
            fallback_interval: settings.refresh.fallback_interval(),
            safety_margin: settings.refresh.safety_margin(),
            clock: clock.clone(),
        },
    );
    let handle = engine.start(cancel.clone()).await?;

    // -------------------------------
    // 4. Status server
    // -------------------------------

    let state = AppState::new(get_metrics().await, cache, handle.expected_slots().to_vec(), clock);
    let server_settings = settings.clone();
    let server_cancel = cancel.clone();
    let http_server = tokio::spawn(async move {
        if let Err(e) = server::server::start(&server_settings, state, server_cancel).await {
            error!("status server stopped: {:#}", e);
        }
    });

    info!(workers = handle.worker_count(), "Service started");

    // -------------------------------
    // 5. Run until interrupted
    // -------------------------------

    tokio::signal::ctrl_c().await.context("cannot listen for shutdown signal")?;
    info!("shutdown requested");
    cancel.cancel();
    handle.shutdown().await;
    let _ = http_server.await;

    Ok(())
}
