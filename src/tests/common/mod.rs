// tests/common/mod.rs
pub use axum::Router;
pub use tokio::task::JoinHandle;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::token::TokenKind;
use crate::exchange::{ExchangeError, ExchangeRequest, Exchanger};
use crate::helpers::time::Clock;
use crate::refresh::credential::Credential;
use crate::refresh::worker::WorkerOptions;
use crate::secrets::{SecretFetchError, SecretMaterial, SecretRef, SecretSource};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

/// Clock frozen at 2024-01-01T00:00:00Z
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 30s fallback, no safety margin, frozen clock
pub fn fixed_options() -> WorkerOptions {
    WorkerOptions {
        fallback_interval: Duration::from_secs(30),
        safety_margin: Duration::ZERO,
        clock: Arc::new(FixedClock::default()),
    }
}

#[derive(Debug, Default)]
struct Script {
    answers: Vec<Result<String, u16>>,
    next: usize,
    requests: Vec<ExchangeRequest>,
    call_times: Vec<Instant>,
}

/// In-memory exchanger answering from a script.
/// `Err(status)` entries become status errors; the last entry repeats.
#[derive(Debug, Default)]
pub struct ScriptedExchanger {
    script: Mutex<Script>,
}

impl ScriptedExchanger {
    pub fn always_ok(body: &str) -> Arc<Self> {
        Self::scripted(vec![Ok(body.to_owned())])
    }

    pub fn scripted(answers: Vec<Result<String, u16>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script { answers, ..Script::default() }),
        })
    }

    pub fn requests(&self) -> Vec<ExchangeRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    /// tokio instants of every call, in order
    pub fn call_times(&self) -> Vec<Instant> {
        self.script.lock().unwrap().call_times.clone()
    }

    /// calls whose target was `url`
    pub fn calls_to(&self, url: &str) -> usize {
        self.script.lock().unwrap().requests.iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Exchanger for ScriptedExchanger {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<Vec<u8>, ExchangeError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request.clone());
        script.call_times.push(Instant::now());

        let index = script.next.min(script.answers.len().saturating_sub(1));
        script.next += 1;
        match script.answers.get(index).cloned() {
            Some(Ok(body)) => Ok(body.into_bytes()),
            Some(Err(status)) => Err(ExchangeError::Status { status, body: "scripted failure".into() }),
            None => Err(ExchangeError::Status { status: 500, body: "empty script".into() }),
        }
    }
}

/// Secret store backed by a map of secret id -> value; unknown ids fail
#[derive(Debug, Default)]
pub struct StaticSecretSource {
    secrets: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl StaticSecretSource {
    pub fn new(secrets: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            secrets: secrets.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            fetched: Mutex::new(Vec::new()),
        })
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<SecretMaterial, SecretFetchError> {
        self.fetched.lock().unwrap().push(secret_ref.secret_id().to_owned());
        match self.secrets.get(secret_ref.secret_id()) {
            Some(value) => Ok(SecretMaterial::new(value.as_bytes().to_vec())),
            None => Err(SecretFetchError::Status {
                secret: secret_ref.to_string(),
                status: 404,
                body: "not found".into(),
            }),
        }
    }
}

/// Sends each request to the exchanger registered for its URL
#[derive(Debug, Default)]
pub struct RoutedExchanger {
    routes: HashMap<String, Arc<ScriptedExchanger>>,
}

impl RoutedExchanger {
    pub fn new(routes: Vec<(&str, Arc<ScriptedExchanger>)>) -> Arc<Self> {
        Arc::new(Self {
            routes: routes.into_iter().map(|(url, ex)| (url.to_owned(), ex)).collect(),
        })
    }
}

#[async_trait]
impl Exchanger for RoutedExchanger {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<Vec<u8>, ExchangeError> {
        match self.routes.get(&request.url) {
            Some(exchanger) => exchanger.exchange(request).await,
            None => Err(ExchangeError::Status { status: 404, body: request.url.clone() }),
        }
    }
}

/// Refreshed bearer credential reading secret `<id>-key`, posting to `https://<id>.example.com/token`
pub fn bearer_credential(id: &str, offsets: &[u64]) -> Credential {
    Credential {
        id: id.to_owned(),
        secret_ref: SecretRef::Named { secret_id: format!("{}-key", id) },
        token_endpoint: Some(token_url(id)),
        token_field: "access_token".into(),
        token_kind: TokenKind::Bearer,
        stagger_offsets: offsets.iter().map(|s| Duration::from_secs(*s)).collect(),
    }
}

/// Credential whose secret is published as-is
pub fn static_credential(id: &str) -> Credential {
    Credential {
        token_endpoint: None,
        token_kind: TokenKind::ApiKey,
        stagger_offsets: Vec::new(),
        ..bearer_credential(id, &[])
    }
}

pub fn token_url(id: &str) -> String {
    format!("https://{}.example.com/token", id)
}
