use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::token_cache::TokenCache;
use crate::config::settings::SettingsConfig;
use crate::helpers::time::Clock;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::{health_router, MetricsState, Readiness, SlotStatus};

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub cache: TokenCache,
    pub expected_slots: Arc<Vec<String>>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(metrics: &Metrics, cache: TokenCache, expected_slots: Vec<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            cache,
            expected_slots: Arc::new(expected_slots),
            clock,
        }
    }

    pub fn readiness(&self) -> Readiness {
        let now = self.clock.now();
        let slots: Vec<SlotStatus> = self
            .expected_slots
            .iter()
            .map(|slot| match self.cache.load(slot) {
                Some(record) => SlotStatus {
                    slot: slot.clone(),
                    populated: true,
                    observed_at: Some(record.observed_at),
                    stale: record.is_stale(now),
                },
                None => SlotStatus { slot: slot.clone(), populated: false, observed_at: None, stale: false },
            })
            .collect();

        Readiness {
            ready: slots.iter().all(|s| s.populated),
            slots,
        }
    }
}

pub fn router(settings_config: &SettingsConfig, state: AppState) -> Router {
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(health_router())
        .with_state(state)
}

/// Serve the status endpoints until `cancel` fires; no-op without `settings.server`
pub async fn start(settings_config: &SettingsConfig, state: AppState, cancel: CancellationToken) -> Result<()> {
    let Some(server) = settings_config.server.as_ref() else {
        info!("status server disabled");
        return Ok(());
    };

    let metrics = get_metrics().await;
    let app = router(settings_config, state);
    let address = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind status server to {}", address))?;
    info!(address = %address, "status server listening");

    metrics.up.set(1);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("status server failed")?;
    metrics.up.set(0);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::token::{TokenKind, TokenRecord};
    use crate::config::settings::MetricsConfig;
    use crate::tests::common::{spawn_axum, FixedClock};

    async fn state(cache: TokenCache) -> AppState {
        AppState::new(
            get_metrics().await,
            cache,
            vec!["mail_creds".into(), "primary".into()],
            Arc::new(FixedClock::default()),
        )
    }

    fn settings() -> SettingsConfig {
        SettingsConfig {
            metrics: MetricsConfig { path: "/metrics".into(), is_enabled: true },
            ..SettingsConfig::default()
        }
    }

    #[tokio::test]
    async fn readiness_follows_cache_population() {
        let cache = TokenCache::new();
        let state = state(cache.clone()).await;
        let now = FixedClock::default().0;

        assert!(!state.readiness().ready);

        cache.store("primary", TokenRecord::new("Bearer abc".into(), TokenKind::Bearer, 3600, now));
        let readiness = state.readiness();
        assert!(!readiness.ready);
        assert_eq!(readiness.slots[0].slot, "mail_creds");
        assert!(!readiness.slots[0].populated);
        assert!(readiness.slots[1].populated);
        assert!(!readiness.slots[1].stale);

        cache.store("mail_creds", TokenRecord::verbatim("user:pass".into(), TokenKind::Bearer, now));
        assert!(state.readiness().ready);
    }

    #[tokio::test]
    async fn readiness_survives_an_unrepresentable_lifetime() {
        let cache = TokenCache::new();
        let state = state(cache.clone()).await;
        let now = FixedClock::default().0;
        let parsed = crate::parser::parser::parse_response(
            br#"{"access_token":"abc","expires_in":100000000000000}"#,
            "access_token",
        );
        assert_eq!(parsed.expires_in, 100_000_000_000_000);

        let record = TokenRecord::new(TokenKind::Bearer.render(&parsed.value), TokenKind::Bearer, parsed.expires_in, now);
        cache.store("primary", record);
        cache.store("mail_creds", TokenRecord::verbatim("user:pass".into(), TokenKind::Bearer, now));

        let readiness = state.readiness();
        assert!(readiness.ready);
        assert!(!readiness.slots[1].stale);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ready_endpoint_reports_status_without_values() {
        let cache = TokenCache::new();
        let app = router(&settings(), state(cache.clone()).await);
        let (handle, addr) = spawn_axum(app).await;
        let client = reqwest::Client::new();

        let response = client.get(format!("http://{}/ready", addr)).send().await.unwrap();
        assert_eq!(response.status(), 503);

        let now = FixedClock::default().0;
        cache.store("primary", TokenRecord::new("Bearer abc".into(), TokenKind::Bearer, 3600, now));
        cache.store("mail_creds", TokenRecord::verbatim("user:pass".into(), TokenKind::Bearer, now));

        let response = client.get(format!("http://{}/ready", addr)).send().await.unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("\"ready\":true"));
        assert!(!body.contains("abc"));
        assert!(!body.contains("user:pass"));

        let health = client.get(format!("http://{}/healthz", addr)).send().await.unwrap();
        assert_eq!(health.status(), 200);
        let metrics = client.get(format!("http://{}/metrics", addr)).send().await.unwrap();
        assert_eq!(metrics.status(), 200);
        handle.abort();
    }
}
