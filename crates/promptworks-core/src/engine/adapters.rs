//! Shape-specific executor adapters.

use super::executor::{RoundRecord, TaskAdapter};
use crate::error::StoreError;
use crate::metrics::MetricsSummary;
use crate::model::{RunConfig, RunStatus, UsageSource};
use crate::storage::rows::{
    ExperimentRow, NewResult, NewUsageLog, PromptTestUnitRow, TestRunRow,
};
use crate::storage::Store;

/// Simple shape: rounds land in `results`, metrics and status on the run row.
pub struct TestRunAdapter {
    row: TestRunRow,
}

impl TestRunAdapter {
    pub fn load(store: &Store, id: i64) -> Result<Option<Self>, StoreError> {
        Ok(store.get_test_run(id)?.map(|row| Self { row }))
    }
}

impl TaskAdapter for TestRunAdapter {
    fn describe(&self) -> String {
        format!("test_run {}", self.row.id)
    }

    fn status(&self) -> RunStatus {
        self.row.status
    }

    fn repetitions(&self) -> u32 {
        self.row.repetitions
    }

    fn source(&self) -> UsageSource {
        UsageSource::TestRun
    }

    fn model_name(&self) -> &str {
        &self.row.model_name
    }

    fn temperature(&self) -> f64 {
        self.row.temperature
    }

    fn top_p(&self) -> f64 {
        self.row.top_p
    }

    fn prompt_snapshot(&self) -> Option<&str> {
        self.row.config.prompt_snapshot.as_deref()
    }

    fn config(&self) -> &RunConfig {
        &self.row.config
    }

    fn mark_running(&mut self, store: &Store) -> Result<(), StoreError> {
        store.set_test_run_status(self.row.id, RunStatus::Running, None)?;
        self.row.status = RunStatus::Running;
        Ok(())
    }

    fn persist_round(
        &mut self,
        store: &Store,
        record: &RoundRecord,
        usage: &NewUsageLog,
    ) -> Result<(), StoreError> {
        let result = NewResult {
            run_index: record.run_index,
            output: record.output_text.clone(),
            parsed_output: record.parsed_output.clone(),
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            total_tokens: record.total_tokens,
            latency_ms: record.latency_ms,
        };
        store.insert_result_with_usage(self.row.id, &result, usage)
    }

    fn complete(&mut self, store: &Store, metrics: &MetricsSummary) -> Result<(), StoreError> {
        store.set_test_run_metrics(self.row.id, Some(metrics))?;
        store.set_test_run_status(self.row.id, RunStatus::Completed, None)?;
        self.row.status = RunStatus::Completed;
        Ok(())
    }

    fn fail(&mut self, store: &Store, message: &str) -> Result<(), StoreError> {
        store.set_test_run_status(self.row.id, RunStatus::Failed, Some(message))?;
        self.row.status = RunStatus::Failed;
        Ok(())
    }
}

/// Richer shape: one experiment attempt of a unit. Rounds accumulate in
/// memory and land as the experiment's `outputs` JSON at the end; the usage
/// ledger still gets one row per successful call as it happens.
pub struct ExperimentAdapter {
    unit: PromptTestUnitRow,
    experiment: ExperimentRow,
    rounds: Vec<RoundRecord>,
}

impl ExperimentAdapter {
    pub fn new(unit: PromptTestUnitRow, experiment: ExperimentRow) -> Self {
        Self {
            unit,
            experiment,
            rounds: Vec::new(),
        }
    }

    fn outputs_json(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&self.rounds).ok()
    }
}

impl TaskAdapter for ExperimentAdapter {
    fn describe(&self) -> String {
        format!(
            "experiment {} (unit {})",
            self.experiment.id, self.unit.id
        )
    }

    fn status(&self) -> RunStatus {
        self.experiment.status
    }

    fn repetitions(&self) -> u32 {
        self.unit.rounds
    }

    fn source(&self) -> UsageSource {
        UsageSource::PromptTest
    }

    fn model_name(&self) -> &str {
        &self.unit.model_name
    }

    fn temperature(&self) -> f64 {
        self.unit.temperature
    }

    fn top_p(&self) -> f64 {
        self.unit.top_p
    }

    fn prompt_snapshot(&self) -> Option<&str> {
        self.unit
            .prompt_snapshot
            .as_deref()
            .or(self.unit.config.prompt_snapshot.as_deref())
    }

    fn config(&self) -> &RunConfig {
        &self.unit.config
    }

    fn mark_running(&mut self, store: &Store) -> Result<(), StoreError> {
        store.start_experiment(self.experiment.id)?;
        self.experiment.status = RunStatus::Running;
        Ok(())
    }

    fn persist_round(
        &mut self,
        store: &Store,
        record: &RoundRecord,
        usage: &NewUsageLog,
    ) -> Result<(), StoreError> {
        store.insert_usage_log(usage)?;
        self.rounds.push(record.clone());
        Ok(())
    }

    fn complete(&mut self, store: &Store, metrics: &MetricsSummary) -> Result<(), StoreError> {
        store.finish_experiment(
            self.experiment.id,
            RunStatus::Completed,
            None,
            self.outputs_json().as_ref(),
            Some(metrics),
        )?;
        self.experiment.status = RunStatus::Completed;
        Ok(())
    }

    fn fail(&mut self, store: &Store, message: &str) -> Result<(), StoreError> {
        store.finish_experiment(
            self.experiment.id,
            RunStatus::Failed,
            Some(message),
            self.outputs_json().as_ref(),
            None,
        )?;
        self.experiment.status = RunStatus::Failed;
        Ok(())
    }
}
