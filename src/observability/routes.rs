use std::sync::Arc;

use crate::config::settings::MetricsConfig;
use crate::server::server::AppState;
use axum::routing::get;
use axum::{extract::State, response::IntoResponse, Json, Router};
use chrono::{DateTime, Utc};
use http::{header::CONTENT_TYPE, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use tracing::error;

#[derive(Clone)]
pub struct MetricsState {
    pub registry: Arc<Registry>,
}

impl MetricsState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn router(&self, metrics_config: &MetricsConfig) -> Router<AppState> {
        let mut router = Router::new();
        if metrics_config.is_enabled {
            router = router.route(metrics_config.path.as_str(), get(get_metrics));
        }
        router
    }
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics_state.registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, [(CONTENT_TYPE, "text/plain")], String::new());
    }

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}

/// Readiness of one cache slot, never its value
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SlotStatus {
    pub slot: String,
    pub populated: bool,
    pub observed_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub slots: Vec<SlotStatus>,
}

/// Health routes: `/healthz` always answers, `/ready` once every expected slot holds a token
pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ready", get(ready))
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.readiness();
    let status = match readiness.ready {
        true => StatusCode::OK,
        false => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(readiness))
}
