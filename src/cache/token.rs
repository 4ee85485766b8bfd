use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const BEARER_PREFIX: &str = "Bearer ";

/// How a published value is meant to be presented upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    #[default]
    Bearer,
    ApiKey,
}

impl TokenKind {
    /// Render a raw token the way callers put it into an `Authorization` header
    pub fn render(&self, raw: &str) -> String {
        match self {
            TokenKind::Bearer => format!("{}{}", BEARER_PREFIX, raw),
            TokenKind::ApiKey => raw.to_owned(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Bearer => "bearer",
            TokenKind::ApiKey => "api_key",
        }
    }
}

/// One published token. Never mutated after it is stored; a refresh
/// stores a brand new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub value: String,
    pub kind: TokenKind,
    /// lifetime reported by the issuer, `<= 0` means unknown / static
    pub expires_in_seconds: i64,
    pub observed_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(value: String, kind: TokenKind, expires_in_seconds: i64, observed_at: DateTime<Utc>) -> Self {
        Self { value, kind, expires_in_seconds, observed_at }
    }

    /// Static values (pass-through secrets) carry no lifetime
    pub fn verbatim(value: String, kind: TokenKind, observed_at: DateTime<Utc>) -> Self {
        Self::new(value, kind, 0, observed_at)
    }

    /// `None` when no lifetime is known: static values, but also exchanged
    /// tokens whose issuer reported `expires_in <= 0`. Such records never go
    /// stale; the worker re-exchanges them every fallback interval instead.
    /// A lifetime too large to represent is treated the same way.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.expires_in_seconds <= 0 {
            return None;
        }
        Duration::try_seconds(self.expires_in_seconds)
            .and_then(|lifetime| self.observed_at.checked_add_signed(lifetime))
    }

    /// Issued, but past the lifetime the issuer reported
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|at| now >= at).unwrap_or(false)
    }
}
