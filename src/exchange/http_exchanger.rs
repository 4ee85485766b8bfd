use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::exchange::{ExchangeError, ExchangeRequest, Exchanger};
use crate::resilience::retry::RetrySettings;
use crate::secrets::truncate_body;

/// reqwest-backed exchanger; transient failures are retried, other 4xx answers end the exchange
#[derive(Debug, Clone)]
pub struct HttpExchanger {
    client: Client,
    retry: RetrySettings,
}

impl HttpExchanger {
    pub fn new(client: Client, retry: RetrySettings) -> Self {
        Self { client, retry }
    }

    async fn attempt(&self, request: &ExchangeRequest) -> Result<Vec<u8>, ExchangeError> {
        let response = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .body(request.body.as_bytes().to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body: truncate_body(response.text().await.unwrap_or_default()),
            });
        }
        let bytes = response.bytes().await?;
        debug!(url = %request.url, bytes = bytes.len(), "token endpoint answered");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Exchanger for HttpExchanger {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<Vec<u8>, ExchangeError> {
        self.retry
            .run_with_retry_if(|| self.attempt(request), ExchangeError::retryable)
            .await
    }
}
