use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::token::TokenRecord;
use crate::cache::token_cache::TokenCache;
use crate::exchange::{ExchangeError, ExchangeRequest, Exchanger};
use crate::helpers::time::{get_instant, next_refresh_delay, Clock};
use crate::observability::metrics::{get_metrics, RESULT_ERROR, RESULT_OK};
use crate::parser::parser::parse_response;
use crate::refresh::credential::Credential;
use crate::secrets::{SecretFetchError, SecretMaterial, SecretSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// built, first exchange not started yet
    Staggering,
    Exchanging,
    Storing,
    Sleeping,
    Stopped,
}

/// Knobs shared by every worker of an engine
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub fallback_interval: Duration,
    pub safety_margin: Duration,
    pub clock: Arc<dyn Clock>,
}

/// One worker of one credential: its stagger offset and where it posts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPlan {
    pub credential: Arc<Credential>,
    pub endpoint: String,
    pub replica: usize,
    pub stagger: Duration,
}

impl WorkerPlan {
    pub fn name(&self) -> String {
        format!("{}#{}", self.credential.id, self.replica)
    }
}

/// What a single exchange cycle produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { expires_in: i64 },
    /// the endpoint answered but without a token
    Unusable,
    Failed,
}

/// Owns the exchange -> store -> sleep loop for one credential.
///
/// The next exchange is scheduled only from the lifetime the issuer
/// reported for the previous token; unusable answers and failures retry
/// after `fallback_interval`.
pub struct RefreshWorker {
    name: String,
    plan: WorkerPlan,
    request: ExchangeRequest,
    exchanger: Arc<dyn Exchanger>,
    cache: TokenCache,
    options: WorkerOptions,
    state: WorkerState,
}

impl RefreshWorker {
    /// Read the credential's secret. A failure here is fatal for startup.
    pub async fn fetch_secret(
        source: &dyn SecretSource,
        credential: &Credential,
    ) -> Result<SecretMaterial, SecretFetchError> {
        let metrics = get_metrics().await;
        match source.fetch(&credential.secret_ref).await {
            Ok(material) => {
                metrics.secret_fetch_total.with_label_values(&[credential.id.as_str(), RESULT_OK]).inc();
                info!(credential = %credential.id, secret = %credential.secret_ref, bytes = material.len(), "secret fetched");
                Ok(material)
            }
            Err(e) => {
                metrics.secret_fetch_total.with_label_values(&[credential.id.as_str(), RESULT_ERROR]).inc();
                Err(e)
            }
        }
    }

    pub fn new(
        plan: WorkerPlan,
        secret: SecretMaterial,
        exchanger: Arc<dyn Exchanger>,
        cache: TokenCache,
        options: WorkerOptions,
    ) -> Self {
        let request = ExchangeRequest::token_request(plan.endpoint.clone(), secret);
        Self {
            name: plan.name(),
            plan,
            request,
            exchanger,
            cache,
            options,
            state: WorkerState::Staggering,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(worker = %self.name, from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }

    /// POST the secret to the token endpoint, retries handled by the exchanger
    pub async fn exchange(&self) -> Result<Vec<u8>, ExchangeError> {
        self.exchanger.exchange(&self.request).await
    }

    /// Store a fresh record for the credential's slot
    pub fn publish(&self, raw_token: &str, expires_in: i64) {
        let credential = &self.plan.credential;
        let record = TokenRecord::new(
            credential.token_kind.render(raw_token),
            credential.token_kind,
            expires_in,
            self.options.clock.now(),
        );
        self.cache.store(credential.slot(), record);
    }

    /// One exchange, parse and publish
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let metrics = get_metrics().await;
        let credential_id = self.plan.credential.id.clone();
        let slot = self.plan.credential.slot().to_owned();

        self.transition(WorkerState::Exchanging);
        metrics.exchange_requests.with_label_values(&[credential_id.as_str()]).inc();
        let start = get_instant();
        let result = self.exchange().await;
        metrics
            .exchange_duration
            .with_label_values(&[credential_id.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let body = match result {
            Ok(body) => body,
            Err(e) => {
                warn!(worker = %self.name, reason = e.reason(), error = %e, "exchange failed after retries");
                metrics.exchange_failures.with_label_values(&[credential_id.as_str(), e.reason()]).inc();
                return CycleOutcome::Failed;
            }
        };

        let parsed = parse_response(&body, &self.plan.credential.token_field);
        if !parsed.is_usable() {
            warn!(worker = %self.name, token_field = %self.plan.credential.token_field, "exchange response carried no token");
            metrics.exchange_failures.with_label_values(&[credential_id.as_str(), "malformed"]).inc();
            return CycleOutcome::Unusable;
        }

        self.transition(WorkerState::Storing);
        self.publish(&parsed.value, parsed.expires_in);
        metrics.tokens_published.with_label_values(&[slot.as_str()]).inc();
        metrics.token_expires_in.with_label_values(&[slot.as_str()]).set(parsed.expires_in);
        info!(worker = %self.name, slot = %slot, expires_in = parsed.expires_in, "token refreshed");

        CycleOutcome::Published { expires_in: parsed.expires_in }
    }

    /// Delay before the next exchange for a given cycle outcome
    pub fn next_delay(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Published { expires_in } => {
                next_refresh_delay(*expires_in, self.options.safety_margin, self.options.fallback_interval)
            }
            CycleOutcome::Unusable | CycleOutcome::Failed => self.options.fallback_interval,
        }
    }

    /// Sleep `delay` unless cancelled first; `false` means stop
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(worker = %self.name, stagger_secs = self.plan.stagger.as_secs(), "refresh worker started");

        if !self.plan.stagger.is_zero() {
            let stagger = self.plan.stagger;
            if !self.wait(stagger, &cancel).await {
                self.transition(WorkerState::Stopped);
                return;
            }
        }

        while !cancel.is_cancelled() {
            let outcome = self.run_cycle().await;
            let delay = self.next_delay(&outcome);

            self.transition(WorkerState::Sleeping);
            debug!(worker = %self.name, delay_secs = delay.as_secs(), outcome = ?outcome, "waiting for next cycle");
            if !self.wait(delay, &cancel).await {
                break;
            }
        }

        self.transition(WorkerState::Stopped);
        info!(worker = %self.name, "refresh worker stopped");
    }
}
