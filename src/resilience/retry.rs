use std::fmt::Display;
use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::config::settings::RetryConfig;
use crate::utils::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS};

/// Bounded retry with doubling backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// total attempts, first call included
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl From<&Option<RetryConfig>> for RetrySettings {
    fn from(retry: &Option<RetryConfig>) -> Self {
        let defaults = RetrySettings::default();
        RetrySettings {
            attempts: retry.as_ref().and_then(|r| r.attempts).unwrap_or(defaults.attempts),
            base_delay_ms: retry.as_ref().and_then(|r| r.base_delay_ms).unwrap_or(defaults.base_delay_ms),
            max_delay_ms: retry.as_ref().and_then(|r| r.max_delay_ms).unwrap_or(defaults.max_delay_ms),
        }
    }
}

impl RetrySettings {
    /// Run `operation` until it succeeds or the attempt budget is spent.
    /// The error of the last attempt is returned.
    pub async fn run_with_retry<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_with_retry_if(operation, |_| true).await
    }

    /// Like [`run_with_retry`](Self::run_with_retry), but an error for which
    /// `retryable` is false is returned at once.
    pub async fn run_with_retry_if<F, Fut, T, E, R>(&self, mut operation: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && retryable(&e) => {
                    warn!("Attempt {attempt}/{attempts} failed: {e}");
                    sleep(Duration::from_millis(delay)).await;
                    delay = self.next_backoff(delay);
                    attempt += 1;
                }
                Err(e) if !retryable(&e) => {
                    error!("attempt {attempt} failed permanently: {e}");
                    return Err(e);
                }
                Err(e) => {
                    error!("all {attempt} attempts failed: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// Doubled delay, capped at `max_delay_ms`
    pub fn next_backoff(&self, delay_ms: u64) -> u64 {
        delay_ms.saturating_mul(2).min(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn settings(attempts: u32) -> RetrySettings {
        RetrySettings { attempts, base_delay_ms: 10, max_delay_ms: 1000 }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<&str, String> = settings(3)
            .run_with_retry(|| {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err("connection reset".to_owned()),
                        _ => Ok("token"),
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("token"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), String> = settings(3)
            .run_with_retry(|| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(format!("failure {}", n))
                }
            })
            .await;

        assert_eq!(result, Err("failure 2".to_owned()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let _: Result<(), String> = settings(0)
            .run_with_retry(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("nope".to_owned())
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_overrides_defaults_field_by_field() {
        let cfg = Some(RetryConfig { attempts: Some(5), base_delay_ms: None, max_delay_ms: Some(200) });
        let retry = RetrySettings::from(&cfg);
        assert_eq!(retry, RetrySettings { attempts: 5, base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS, max_delay_ms: 200 });
        assert_eq!(RetrySettings::from(&None), RetrySettings::default());
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), String> = settings(3)
            .run_with_retry_if(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("invalid_client".to_owned())
                    }
                },
                |e| !e.starts_with("invalid"),
            )
            .await;

        assert_eq!(result, Err("invalid_client".to_owned()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_up_to_cap_without_overflow() {
        let retry = settings(3);
        assert_eq!(retry.next_backoff(10), 20);
        assert_eq!(retry.next_backoff(800), 1000);

        let unbounded = RetrySettings { attempts: 3, base_delay_ms: u64::MAX, max_delay_ms: u64::MAX };
        assert_eq!(unbounded.next_backoff(u64::MAX), u64::MAX);
        assert_eq!(unbounded.next_backoff(u64::MAX / 2 + 1), u64::MAX);
    }
}
