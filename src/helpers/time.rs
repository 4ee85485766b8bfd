use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Wall-clock source used to stamp published tokens
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Delay before the next exchange.
///
/// The issuer-reported lifetime minus the safety margin, unless that leaves
/// nothing to wait for, in which case the fallback interval applies so a
/// zero or missing `expires_in` never turns into a tight loop.
pub fn next_refresh_delay(expires_in_seconds: i64, safety_margin: Duration, fallback: Duration) -> Duration {
    let remaining = expires_in_seconds.saturating_sub(safety_margin.as_secs() as i64);
    if remaining <= 0 {
        return fallback;
    }
    Duration::from_secs(remaining as u64)
}

pub fn get_instant() -> Instant {
    Instant::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: Duration = Duration::from_secs(30);

    #[test]
    fn reported_lifetime_drives_the_delay() {
        assert_eq!(next_refresh_delay(3600, Duration::ZERO, FALLBACK), Duration::from_secs(3600));
        assert_eq!(next_refresh_delay(3600, Duration::from_secs(60), FALLBACK), Duration::from_secs(3540));
    }

    #[test]
    fn zero_negative_or_eaten_lifetime_falls_back() {
        assert_eq!(next_refresh_delay(0, Duration::ZERO, FALLBACK), FALLBACK);
        assert_eq!(next_refresh_delay(-5, Duration::ZERO, FALLBACK), FALLBACK);
        assert_eq!(next_refresh_delay(30, Duration::from_secs(60), FALLBACK), FALLBACK);
    }
}
