use clap::ValueEnum;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::credentials::ServiceConfig;
use crate::config::settings::{LogFormat, LoggingConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogLevel::TRACE => "trace",
            LogLevel::DEBUG => "debug",
            LogLevel::INFO => "info",
            LogLevel::WARN => "warn",
            LogLevel::ERROR => "error",
        }
    }
}

/// Effective logging config: CLI level wins over the configured one
pub fn resolve(service_config: &ServiceConfig, arg_log_level: Option<LogLevel>) -> LoggingConfig {
    let configured = service_config.settings.logging.clone().unwrap_or_default();
    match arg_log_level {
        Some(level) => LoggingConfig::new(level.as_str().to_owned(), configured.format),
        None => configured,
    }
}

pub fn run(service_config: &ServiceConfig, arg_log_level: Option<LogLevel>) {
    init_logging(&resolve(service_config, arg_log_level));
}

/// Initialize tracing with the desired config.
pub fn init_logging(cfg: &LoggingConfig) {
    let env_filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match cfg.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .flatten_event(true) // one flat object per line for CRI log parsers
                .with_ansi(false);

            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(true);

            let _ = registry.with(layer).try_init();
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::credentials::{SecretProvider, SecretStoreConfig};
    use crate::config::settings::SettingsConfig;

    fn service(logging: Option<LoggingConfig>) -> ServiceConfig {
        ServiceConfig {
            settings: SettingsConfig { logging, ..SettingsConfig::default() },
            secret_store: SecretStoreConfig {
                provider: SecretProvider::Aws,
                project_id: None,
                endpoint: None,
                metadata_url: None,
            },
            credentials: Vec::new(),
        }
    }

    #[test]
    fn cli_level_overrides_config_but_keeps_format() {
        let cfg = service(Some(LoggingConfig::new("warn".into(), LogFormat::Json)));

        let resolved = resolve(&cfg, Some(LogLevel::DEBUG));
        assert_eq!(resolved.level, "debug");
        assert_eq!(resolved.format, LogFormat::Json);

        assert_eq!(resolve(&cfg, None).level, "warn");
        assert_eq!(resolve(&service(None), None).level, "info");
    }
}
