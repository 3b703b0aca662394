//! PromptWorks core: the asynchronous test-run execution pipeline.
//!
//! The REST layer, migrations and file storage live elsewhere; this crate owns
//! everything between "a test configuration was submitted" and "its results,
//! metrics and usage ledger rows are queryable":
//!
//! - [`providers::llm`] — chat-completion client for OpenAI-compatible
//!   endpoints (single-shot and streaming)
//! - [`engine`] — the generic run executor driving N sequential repetitions
//! - [`queue`] — serial single-worker task queues decoupling execution from
//!   the request cycle
//! - [`metrics`] — per-run summary statistics
//! - [`storage`] — SQLite persistence, including usage/dashboard aggregation
//! - [`service`] — the `PromptWorks` facade the outer layers call into

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod providers;
pub mod queue;
pub mod service;
pub mod storage;

pub use config::ServiceConfig;
pub use error::{ExecutionError, StoreError};
pub use service::PromptWorks;
pub use storage::Store;
