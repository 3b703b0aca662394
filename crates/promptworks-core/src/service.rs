//! Top-level service facade.
//!
//! Owns the store, the invocation client and the two serial queues, and
//! exposes the submit/status/retry surface plus quick tests and usage
//! dashboards. The client is injected so tests can substitute a scripted
//! double for the real HTTP client.

use crate::config::ServiceConfig;
use crate::engine::{resolve_target, Executor};
use crate::error::{ExecutionError, StoreError};
use crate::model::{ChatMessage, JsonMap, RunConfig, RunStatus, UsageSource};
use crate::providers::llm::{ChunkSink, InvocationOutcome, InvocationRequest, LlmClient};
use crate::queue::{PromptTestJob, TaskQueue, TestRunJob};
use crate::storage::rows::{ExperimentRow, NewUsageLog, ResultRow, TestRunRow, UsageLogRow};
use crate::storage::{DateRange, ModelUsageSummary, Store, UsageDay, UsageTotals};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const MAX_TEST_RUN_REPETITIONS: u32 = 50;
pub const MAX_UNIT_ROUNDS: u32 = 100;

/// Submission payload for the simple task shape.
#[derive(Debug, Clone)]
pub struct NewTestRun {
    pub model_name: String,
    pub temperature: f64,
    pub top_p: f64,
    pub repetitions: u32,
    pub prompt_snapshot: Option<String>,
    pub config: RunConfig,
}

/// One unit of a prompt test submission.
#[derive(Debug, Clone)]
pub struct NewPromptTestUnit {
    pub model_name: String,
    pub temperature: f64,
    pub top_p: f64,
    pub rounds: u32,
    pub prompt_snapshot: Option<String>,
    pub config: RunConfig,
}

#[derive(Debug, Clone)]
pub struct NewPromptTest {
    pub name: String,
    pub units: Vec<NewPromptTestUnit>,
}

/// Polling view of a task's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct PromptWorks {
    store: Store,
    client: Arc<dyn LlmClient>,
    config: ServiceConfig,
    test_runs: TaskQueue,
    prompt_tests: TaskQueue,
}

impl PromptWorks {
    /// Wire up the executor and spawn both queue workers.
    pub fn start(store: Store, client: Arc<dyn LlmClient>, config: ServiceConfig) -> Self {
        let executor = Executor::new(store.clone(), Arc::clone(&client), config.clone());
        let test_runs = TaskQueue::start(TestRunJob::new(executor.clone()));
        let prompt_tests = TaskQueue::start(PromptTestJob::new(executor));
        Self {
            store,
            client,
            config,
            test_runs,
            prompt_tests,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // --- test runs --------------------------------------------------------

    /// Create a PENDING test run and hand it to the queue.
    pub fn submit_test_run(&self, req: NewTestRun) -> Result<i64, ExecutionError> {
        if req.repetitions == 0 || req.repetitions > MAX_TEST_RUN_REPETITIONS {
            return Err(ExecutionError::Configuration(format!(
                "repetitions must be between 1 and {MAX_TEST_RUN_REPETITIONS}"
            )));
        }
        let mut config = req.config;
        if config.prompt_snapshot.is_none() {
            config.prompt_snapshot = req.prompt_snapshot;
        }
        let id = self.store.create_test_run(
            &req.model_name,
            req.temperature,
            req.top_p,
            req.repetitions,
            &config,
        )?;
        self.test_runs.enqueue(id)?;
        tracing::info!(id, model = %req.model_name, "test run submitted");
        Ok(id)
    }

    pub fn get_test_run(&self, id: i64) -> Result<Option<TestRunRow>, StoreError> {
        self.store.get_test_run(id)
    }

    pub fn get_test_run_status(&self, id: i64) -> Result<Option<StatusView>, StoreError> {
        Ok(self.store.get_test_run(id)?.map(|row| StatusView {
            status: row.status,
            error: row.last_error,
        }))
    }

    pub fn get_results(&self, id: i64) -> Result<Vec<ResultRow>, StoreError> {
        self.store.list_results(id)
    }

    /// Reset a FAILED run to PENDING and re-enqueue it. Earlier rounds and
    /// metrics are purged; the usage ledger keeps its history.
    pub fn retry_test_run(&self, id: i64) -> Result<(), ExecutionError> {
        let Some(run) = self.store.get_test_run(id)? else {
            return Err(ExecutionError::Configuration(format!(
                "test run {id} not found"
            )));
        };
        if run.status != RunStatus::Failed {
            return Err(ExecutionError::Configuration(format!(
                "test run {id} is {}, only failed runs can be retried",
                run.status
            )));
        }
        self.store.delete_results(id)?;
        self.store.set_test_run_metrics(id, None)?;
        self.store.set_test_run_status(id, RunStatus::Pending, None)?;
        self.test_runs.enqueue(id)?;
        tracing::info!(id, "test run retried");
        Ok(())
    }

    // --- prompt tests -----------------------------------------------------

    pub fn submit_prompt_test(&self, req: NewPromptTest) -> Result<i64, ExecutionError> {
        for unit in &req.units {
            if unit.rounds == 0 || unit.rounds > MAX_UNIT_ROUNDS {
                return Err(ExecutionError::Configuration(format!(
                    "unit rounds must be between 1 and {MAX_UNIT_ROUNDS}"
                )));
            }
        }
        let task_id = self.store.create_prompt_test_task(&req.name)?;
        for unit in req.units {
            self.store.add_unit(
                task_id,
                &unit.model_name,
                unit.temperature,
                unit.top_p,
                unit.rounds,
                unit.prompt_snapshot.as_deref(),
                &unit.config,
            )?;
        }
        self.prompt_tests.enqueue(task_id)?;
        tracing::info!(task_id, name = %req.name, "prompt test submitted");
        Ok(task_id)
    }

    pub fn get_task_status(&self, id: i64) -> Result<Option<StatusView>, StoreError> {
        Ok(self
            .store
            .get_task(id)?
            .filter(|task| !task.is_deleted)
            .map(|task| StatusView {
                status: task.status,
                error: task.last_error,
            }))
    }

    pub fn list_experiments(&self, unit_id: i64) -> Result<Vec<ExperimentRow>, StoreError> {
        self.store.list_experiments(unit_id)
    }

    /// Reset a FAILED prompt test task and re-enqueue it. All experiments
    /// under its units are purged.
    pub fn retry_prompt_test(&self, id: i64) -> Result<(), ExecutionError> {
        let Some(task) = self.store.get_task(id)? else {
            return Err(ExecutionError::Configuration(format!("task {id} not found")));
        };
        if task.is_deleted {
            return Err(ExecutionError::Configuration(format!(
                "task {id} was deleted"
            )));
        }
        if task.status != RunStatus::Failed {
            return Err(ExecutionError::Configuration(format!(
                "task {id} is {}, only failed tasks can be retried",
                task.status
            )));
        }
        self.store.delete_experiments_for_task(id)?;
        self.store.set_task_status(id, RunStatus::Pending, None)?;
        self.prompt_tests.enqueue(id)?;
        tracing::info!(id, "prompt test retried");
        Ok(())
    }

    pub fn delete_prompt_test(&self, id: i64) -> Result<(), StoreError> {
        self.store.soft_delete_task(id)
    }

    // --- quick tests ------------------------------------------------------

    /// One ad-hoc call outside any task. Usage is recorded only when the
    /// call succeeds.
    pub async fn quick_test(
        &self,
        model_name: &str,
        messages: Vec<ChatMessage>,
        parameters: JsonMap,
    ) -> Result<InvocationOutcome, ExecutionError> {
        let (target, request) = self.quick_request(model_name, messages, parameters)?;
        let outcome = self.client.invoke(&request).await?;
        self.record_quick_usage(&target, &request, &outcome)?;
        Ok(outcome)
    }

    /// Streaming variant: raw upstream bytes go to `sink` as they arrive.
    pub async fn quick_test_stream(
        &self,
        model_name: &str,
        messages: Vec<ChatMessage>,
        parameters: JsonMap,
        sink: ChunkSink,
    ) -> Result<InvocationOutcome, ExecutionError> {
        let (target, request) = self.quick_request(model_name, messages, parameters)?;
        let outcome = self.client.invoke_stream(&request, sink).await?;
        self.record_quick_usage(&target, &request, &outcome)?;
        Ok(outcome)
    }

    fn quick_request(
        &self,
        model_name: &str,
        messages: Vec<ChatMessage>,
        parameters: JsonMap,
    ) -> Result<(QuickTarget, InvocationRequest), ExecutionError> {
        if messages.is_empty() {
            return Err(ExecutionError::Configuration(
                "quick test needs at least one message".into(),
            ));
        }
        let target = resolve_target(&self.store, &RunConfig::default(), model_name)?;
        let request = InvocationRequest {
            base_url: target.base_url.clone(),
            api_key: target.provider.api_key.clone(),
            model: target.model_name.clone(),
            messages,
            parameters,
        };
        Ok((
            QuickTarget {
                provider_id: target.provider.id,
                model_id: target.model.as_ref().map(|m| m.id),
                model_name: target.model_name,
            },
            request,
        ))
    }

    fn record_quick_usage(
        &self,
        target: &QuickTarget,
        request: &InvocationRequest,
        outcome: &InvocationOutcome,
    ) -> Result<(), StoreError> {
        let temperature = request
            .parameters
            .get("temperature")
            .and_then(serde_json::Value::as_f64);
        self.store.insert_usage_log(&NewUsageLog {
            provider_id: Some(target.provider_id),
            model_id: target.model_id,
            model_name: target.model_name.clone(),
            source: UsageSource::QuickTest,
            messages: serde_json::to_value(&request.messages).ok(),
            parameters: Some(serde_json::Value::Object(request.parameters.clone())),
            response_text: Some(outcome.output_text.clone()),
            temperature,
            latency_ms: Some(outcome.latency_ms),
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            total_tokens: outcome.total_tokens,
        })?;
        Ok(())
    }

    // --- dashboards -------------------------------------------------------

    pub fn usage_overview(&self, range: DateRange) -> Result<Option<UsageTotals>, StoreError> {
        self.store.usage_overview(range)
    }

    pub fn usage_by_model(&self, range: DateRange) -> Result<Vec<ModelUsageSummary>, StoreError> {
        self.store.usage_by_model(range)
    }

    pub fn usage_timeseries(
        &self,
        provider_id: Option<i64>,
        model_name: &str,
        range: DateRange,
    ) -> Result<Vec<UsageDay>, StoreError> {
        self.store.usage_timeseries(provider_id, model_name, range)
    }

    pub fn quick_test_history(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<UsageLogRow>, StoreError> {
        self.store.quick_test_history(limit, offset)
    }

    // --- lifecycle --------------------------------------------------------

    pub fn service_config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Wait for both queues to drain. Returns `false` on timeout.
    pub async fn wait_for_idle(&self, timeout: Option<Duration>) -> bool {
        self.test_runs.wait_for_idle(timeout).await && self.prompt_tests.wait_for_idle(timeout).await
    }

    /// Stop accepting work and let both workers finish what is enqueued.
    pub async fn shutdown(self) {
        self.test_runs.shutdown().await;
        self.prompt_tests.shutdown().await;
    }
}

struct QuickTarget {
    provider_id: i64,
    model_id: Option<i64>,
    model_name: String,
}
