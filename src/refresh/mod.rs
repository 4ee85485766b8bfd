//! Credential refresh engine
//!
//! - `credential` - immutable credential definitions built from config
//! - `worker` - the exchange / store / sleep loop of one worker
//! - `engine` - startup, staggering and worker orchestration

pub mod credential;
pub mod engine;
pub mod worker;

pub use credential::{credentials_from_config, Credential};
pub use engine::{RefreshEngine, RefreshHandle};
pub use worker::{CycleOutcome, RefreshWorker, WorkerOptions, WorkerPlan, WorkerState};
