//! One generic executor drives both task shapes.
//!
//! An adapter supplies the shape-specific parts (where the rounds and the
//! final status land); the executor owns the shared semantics: resolution,
//! the round loop, fail-fast on the first error, metrics on success.

use crate::config::ServiceConfig;
use crate::engine::messages::{build_messages, merge_parameters, try_parse_json};
use crate::error::{ExecutionError, StoreError};
use crate::metrics::{self, MetricsSummary, RoundStats};
use crate::model::{ChatMessage, RunConfig, RunStatus, UsageSource};
use crate::providers::llm::{InvocationRequest, LlmClient};
use crate::providers::registry::resolve_base_url;
use crate::storage::rows::{ModelRow, NewUsageLog, ProviderRow};
use crate::storage::Store;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

/// Fully resolved invocation target for a task.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub provider: ProviderRow,
    pub model: Option<ModelRow>,
    pub model_name: String,
    pub base_url: String,
}

/// Resolve which provider and model a task talks to.
///
/// Chain: explicit `provider_id`/`model_id` references in the config, then a
/// catalog join on the model name, then a provider whose name matches the
/// model name. Exhausting the chain is a configuration error.
pub fn resolve_target(
    store: &Store,
    config: &RunConfig,
    model_name: &str,
) -> Result<ResolvedTarget, ExecutionError> {
    if let Some(provider_id) = config.provider_id {
        let provider = store.get_provider(provider_id)?.ok_or_else(|| {
            ExecutionError::Configuration(format!("provider {provider_id} not found"))
        })?;
        let model = match config.model_id {
            Some(model_id) => {
                let model = store.get_model(model_id)?.ok_or_else(|| {
                    ExecutionError::Configuration(format!("model {model_id} not found"))
                })?;
                if model.provider_id != provider.id {
                    return Err(ExecutionError::Configuration(format!(
                        "model {model_id} does not belong to provider {provider_id}"
                    )));
                }
                Some(model)
            }
            None => store.find_model_for_provider(provider.id, model_name)?,
        };
        let effective_name = model
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| model_name.to_string());
        let base_url = resolve_base_url(&provider)?;
        return Ok(ResolvedTarget {
            provider,
            model,
            model_name: effective_name,
            base_url,
        });
    }

    if let Some((provider, model)) = store.find_model_by_name(model_name)? {
        let base_url = resolve_base_url(&provider)?;
        return Ok(ResolvedTarget {
            model_name: model.name.clone(),
            model: Some(model),
            base_url,
            provider,
        });
    }

    if let Some(provider) = store.find_provider_by_name(model_name)? {
        let base_url = resolve_base_url(&provider)?;
        return Ok(ResolvedTarget {
            provider,
            model: None,
            model_name: model_name.to_string(),
            base_url,
        });
    }

    Err(ExecutionError::Configuration(format!(
        "no provider configured for model '{model_name}'"
    )))
}

/// Everything produced by one round, shape-independent.
#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    pub run_index: u32,
    pub messages: Vec<ChatMessage>,
    pub parameters: Option<serde_json::Value>,
    pub output_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_output: Option<serde_json::Value>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
}

/// Shape-specific half of execution. The executor never touches the task
/// tables directly; it goes through these hooks.
pub trait TaskAdapter {
    /// Short identity for log lines, e.g. `test_run 17`.
    fn describe(&self) -> String;
    fn status(&self) -> RunStatus;
    fn repetitions(&self) -> u32;
    fn source(&self) -> UsageSource;
    fn model_name(&self) -> &str;
    fn temperature(&self) -> f64;
    fn top_p(&self) -> f64;
    fn prompt_snapshot(&self) -> Option<&str>;
    fn config(&self) -> &RunConfig;

    fn mark_running(&mut self, store: &Store) -> Result<(), StoreError>;
    /// Persist one completed round together with its usage ledger entry.
    fn persist_round(
        &mut self,
        store: &Store,
        record: &RoundRecord,
        usage: &NewUsageLog,
    ) -> Result<(), StoreError>;
    fn complete(&mut self, store: &Store, metrics: &MetricsSummary) -> Result<(), StoreError>;
    fn fail(&mut self, store: &Store, message: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct Executor {
    store: Store,
    client: Arc<dyn LlmClient>,
    config: ServiceConfig,
}

impl Executor {
    pub fn new(store: Store, client: Arc<dyn LlmClient>, config: ServiceConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run a task to a terminal state.
    ///
    /// Returns the final status and failure message. `Err` is reserved for
    /// infrastructure faults (the store itself failing); provider and
    /// configuration failures land in the returned FAILED status.
    pub async fn execute<A: TaskAdapter>(
        &self,
        adapter: &mut A,
    ) -> Result<(RunStatus, Option<String>), ExecutionError> {
        let task = adapter.describe();
        if adapter.status().is_terminal() {
            tracing::info!(%task, status = %adapter.status(), "task already terminal, skipping");
            return Ok((adapter.status(), None));
        }

        let target = match resolve_target(&self.store, adapter.config(), adapter.model_name()) {
            Ok(target) => target,
            Err(err @ ExecutionError::Configuration(_)) => {
                let message = err.to_string();
                tracing::warn!(%task, error = %message, "target resolution failed");
                adapter.fail(&self.store, &message)?;
                return Ok((RunStatus::Failed, Some(message)));
            }
            Err(err) => return Err(err),
        };

        adapter.mark_running(&self.store)?;
        tracing::info!(
            %task,
            provider = %target.provider.provider_name,
            model = %target.model_name,
            repetitions = adapter.repetitions(),
            "task started"
        );

        let parameters = merge_parameters(
            adapter.temperature(),
            adapter.top_p(),
            &adapter.config().overrides,
        );
        let parameters_json = serde_json::Value::Object(parameters.clone());

        let mut stats = Vec::with_capacity(adapter.repetitions() as usize);
        for run_index in 1..=adapter.repetitions() {
            self.jitter_pause().await;

            let messages = build_messages(
                &adapter.config().conversation,
                &adapter.config().inputs,
                adapter.prompt_snapshot(),
                run_index,
            );
            let request = InvocationRequest {
                base_url: target.base_url.clone(),
                api_key: target.provider.api_key.clone(),
                model: target.model_name.clone(),
                messages,
                parameters: parameters.clone(),
            };

            let outcome = match self.client.invoke(&request).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Fail fast: earlier rounds stay persisted, no round
                    // after this one is attempted.
                    let message = err.to_string();
                    tracing::warn!(%task, run_index, error = %message, "round failed");
                    adapter.fail(&self.store, &message)?;
                    return Ok((RunStatus::Failed, Some(message)));
                }
            };

            let parsed_output = try_parse_json(&outcome.output_text);
            let record = RoundRecord {
                run_index,
                messages: request.messages,
                parameters: Some(parameters_json.clone()),
                output_text: outcome.output_text,
                parsed_output,
                prompt_tokens: outcome.prompt_tokens,
                completion_tokens: outcome.completion_tokens,
                total_tokens: outcome.total_tokens,
                latency_ms: Some(outcome.latency_ms),
            };
            let usage = NewUsageLog {
                provider_id: Some(target.provider.id),
                model_id: target.model.as_ref().map(|m| m.id),
                model_name: target.model_name.clone(),
                source: adapter.source(),
                messages: serde_json::to_value(&record.messages).ok(),
                parameters: Some(parameters_json.clone()),
                response_text: Some(record.output_text.clone()),
                temperature: Some(adapter.temperature()),
                latency_ms: record.latency_ms,
                prompt_tokens: record.prompt_tokens,
                completion_tokens: record.completion_tokens,
                total_tokens: record.total_tokens,
            };
            adapter.persist_round(&self.store, &record, &usage)?;

            stats.push(RoundStats {
                latency_ms: record.latency_ms,
                total_tokens: record.total_tokens,
                parsed: record.parsed_output.is_some(),
            });
            tracing::debug!(%task, run_index, latency_ms = ?record.latency_ms, "round persisted");
        }

        let summary = metrics::aggregate(&stats);
        adapter.complete(&self.store, &summary)?;
        tracing::info!(%task, rounds = stats.len(), "task completed");
        Ok((RunStatus::Completed, None))
    }

    async fn jitter_pause(&self) {
        if let Some((lo, hi)) = self.config.jitter_ms {
            let millis = rand::thread_rng().gen_range(lo..=hi);
            if millis > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
            }
        }
    }
}
