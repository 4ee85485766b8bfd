use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

pub const RESULT_OK: &str = "ok";
pub const RESULT_ERROR: &str = "error";

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Secret store metrics
    pub secret_fetch_total: IntCounterVec,

    // Exchange metrics
    pub exchange_requests: IntCounterVec,
    pub exchange_failures: IntCounterVec,
    pub exchange_duration: HistogramVec,

    // Cache metrics
    pub tokens_published: IntCounterVec,
    pub token_expires_in: IntGaugeVec,

    // Runtime
    pub active_workers: IntGauge,
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenrefresher".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Secret store
            secret_fetch_total: IntCounterVec::new(Opts::new("secret_fetch_total", "Startup secret fetches by result"),&["credential", "result"],).unwrap(),

            // Exchange
            exchange_requests: IntCounterVec::new(Opts::new("exchange_requests_total","Token exchanges started by credential",),&["credential"],).unwrap(),
            exchange_failures: IntCounterVec::new(Opts::new("exchange_failures_total", "Token exchanges without a usable token by reason"),&["credential", "reason"],).unwrap(),
            exchange_duration: HistogramVec::new(HistogramOpts::new("exchange_duration_seconds", "Exchange duration seconds, retries included").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),&["credential"],).unwrap(),

            // Cache
            tokens_published: IntCounterVec::new(Opts::new("tokens_published_total", "Records stored into the token cache"),&["slot"],).unwrap(),
            token_expires_in: IntGaugeVec::new(Opts::new("token_expires_in_seconds", "Lifetime reported for the latest token"),&["slot"],).unwrap(),

            // Runtime
            active_workers: IntGauge::new("active_workers", "Running refresh workers").unwrap(),
            config_validation_errors: IntCounter::new("config_validation_errors_total","Validation errors during startup",).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.secret_fetch_total.clone())).unwrap();
        reg.register(Box::new(metrics.exchange_requests.clone())).unwrap();
        reg.register(Box::new(metrics.exchange_failures.clone())).unwrap();
        reg.register(Box::new(metrics.exchange_duration.clone())).unwrap();
        reg.register(Box::new(metrics.tokens_published.clone())).unwrap();
        reg.register(Box::new(metrics.token_expires_in.clone())).unwrap();
        reg.register(Box::new(metrics.active_workers.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
