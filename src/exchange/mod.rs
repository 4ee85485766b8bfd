/// Token exchange
///
/// One POST of the secret material to the issuer, response bytes back.
use async_trait::async_trait;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};

pub mod http_exchanger;

pub use http_exchanger::HttpExchanger;

use crate::secrets::SecretMaterial;

#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub url: String,
    pub body: SecretMaterial,
    pub headers: HeaderMap,
}

impl ExchangeRequest {
    /// The request every refresh cycle sends: secret as JSON body, no caching
    pub fn token_request(url: impl Into<String>, body: SecretMaterial) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Self { url: url.into(), body, headers }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl ExchangeError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ExchangeError::Transport(e) if e.is_timeout() => "timeout",
            ExchangeError::Transport(_) => "transport",
            ExchangeError::Status { status, .. } if *status >= 500 => "status_5xx",
            ExchangeError::Status { .. } => "status_4xx",
        }
    }

    /// Transport failures, 5xx, 408 and 429 may succeed on a later attempt;
    /// any other 4xx will not.
    pub fn retryable(&self) -> bool {
        match self {
            ExchangeError::Transport(_) => true,
            ExchangeError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        }
    }
}

/// Performs the network exchange, retries included
#[async_trait]
pub trait Exchanger: Send + Sync {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<Vec<u8>, ExchangeError>;
}
