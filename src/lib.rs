//! # Token Refresher Library
//!
//! Reads long-lived credentials from a secret store once, exchanges them at
//! token endpoints for short-lived tokens and keeps those tokens fresh with
//! staggered, redundant refresh workers.
//!
//! Modules:
//! - `config` - YAML / environment configuration and validation
//! - `secrets` - GCP and AWS secret stores
//! - `exchange` - token endpoint client
//! - `refresh` - credentials, refresh workers and the engine
//! - `cache` - lock-free token cache
//! - `parser` - token / expiry extraction from endpoint responses

pub mod cache;
pub mod config;
pub mod exchange;
pub mod helpers;
pub mod observability;
pub mod parser;
pub mod refresh;
pub mod resilience;
pub mod secrets;
pub mod server;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::cache::token_cache::TokenCache;
pub use crate::config::credentials::ServiceConfig;
pub use crate::refresh::{RefreshEngine, RefreshHandle};
