use serde::Deserialize;
use std::time::Duration;

use crate::utils::constants::{
    DEFAULT_FALLBACK_INTERVAL_SECONDS, DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_REDUNDANCY,
    DEFAULT_SAFETY_MARGIN_SECONDS, DEFAULT_STAGGER_SECONDS,
};

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SettingsConfig {
    pub retry: Option<RetryConfig>,
    pub refresh: RefreshConfig,
    pub http_timeout_ms: Option<u64>,
    pub metrics: MetricsConfig,
    pub server: Option<ServerConfig>,
    pub logging: Option<LoggingConfig>,
}

impl SettingsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// total attempts per exchange, first call included
    pub attempts: Option<u32>,
    /// will be mutiply by 2 on every attempt until max_delay_ms
    pub base_delay_ms: Option<u64>,
    /// invariant: >= base_delay_ms
    pub max_delay_ms: Option<u64>,
}

/// ================================
/// Refresh scheduling
/// ================================
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshConfig {
    /// independent workers per refreshed credential
    pub redundancy: usize,
    /// worker `k` waits `k * stagger_seconds` before its first exchange
    pub stagger_seconds: u64,
    /// retry delay after a failed exchange or an unusable response
    pub fallback_interval_seconds: u64,
    /// refresh this many seconds before the reported expiry
    pub safety_margin_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            redundancy: DEFAULT_REDUNDANCY,
            stagger_seconds: DEFAULT_STAGGER_SECONDS,
            fallback_interval_seconds: DEFAULT_FALLBACK_INTERVAL_SECONDS,
            safety_margin_seconds: DEFAULT_SAFETY_MARGIN_SECONDS,
        }
    }
}

impl RefreshConfig {
    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_interval_seconds)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_seconds)
    }

    /// Offsets used when a credential does not list its own
    pub fn default_offsets(&self, redundancy: usize) -> Vec<Duration> {
        (0..redundancy as u64)
            .map(|k| Duration::from_secs(k.saturating_mul(self.stagger_seconds)))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { path: default_metrics_path(), is_enabled: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info".to_owned(), LogFormat::Compact)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    /// `json` selects json, anything else compact
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
