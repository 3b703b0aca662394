//! Shared test fixtures: a scripted client double and catalog seeding.

use promptworks_core::model::UsageSource;
use promptworks_core::providers::llm::{
    ChunkSink, InvocationOutcome, InvocationRequest, LlmClient,
};
use promptworks_core::storage::rows::NewUsageLog;
use promptworks_core::{ExecutionError, Store};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Route worker logs through the test harness when `RUST_LOG` is set.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client double that replays a scripted sequence of outcomes. When the
/// script runs dry it answers with a stock success, so tests only script the
/// calls they care about.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<InvocationOutcome, ExecutionError>>>,
    stream_chunks: Mutex<Vec<Vec<u8>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<InvocationOutcome, ExecutionError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_stream_chunks(&self, chunks: Vec<Vec<u8>>) {
        *self.stream_chunks.lock().unwrap() = chunks;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<InvocationOutcome, ExecutionError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(outcome("ok", Some(1), Some(1), Some(2), 5)))
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn invoke(
        &self,
        _request: &InvocationRequest,
    ) -> Result<InvocationOutcome, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }

    async fn invoke_stream(
        &self,
        _request: &InvocationRequest,
        sink: ChunkSink,
    ) -> Result<InvocationOutcome, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for chunk in self.stream_chunks.lock().unwrap().iter() {
            let _ = sink.send(chunk.clone());
        }
        self.next()
    }
}

pub fn outcome(
    text: &str,
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
    latency_ms: i64,
) -> InvocationOutcome {
    InvocationOutcome {
        output_text: text.to_string(),
        prompt_tokens,
        completion_tokens,
        total_tokens,
        latency_ms,
    }
}

/// Seed one provider with one catalog model; returns `(provider_id, model_id)`.
pub fn seed_catalog(store: &Store, model_name: &str) -> (i64, i64) {
    let provider_id = store
        .create_provider("OpenAI", Some("openai"), "test-key", None)
        .unwrap();
    let model_id = store.create_model(provider_id, model_name).unwrap();
    (provider_id, model_id)
}

#[allow(dead_code)]
pub fn usage_row(model: &str, source: UsageSource, total: Option<i64>) -> NewUsageLog {
    NewUsageLog {
        provider_id: None,
        model_id: None,
        model_name: model.into(),
        source,
        messages: None,
        parameters: None,
        response_text: None,
        temperature: None,
        latency_ms: None,
        prompt_tokens: None,
        completion_tokens: None,
        total_tokens: total,
    }
}
