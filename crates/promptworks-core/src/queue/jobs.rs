//! Queue jobs for the two task shapes.

use super::QueueJob;
use crate::engine::{Executor, ExperimentAdapter, TestRunAdapter};
use crate::error::ExecutionError;
use crate::model::RunStatus;
use async_trait::async_trait;

/// Message stored on a task when the worker itself faults; the detailed
/// error goes to the log, not the row.
const GENERIC_FAILURE: &str = "task execution failed unexpectedly";

/// Drives `test_runs` rows through the executor.
pub struct TestRunJob {
    executor: Executor,
}

impl TestRunJob {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl QueueJob for TestRunJob {
    fn kind(&self) -> &'static str {
        "test_runs"
    }

    async fn process(&self, id: i64) -> Result<(), ExecutionError> {
        let Some(mut adapter) = TestRunAdapter::load(self.executor.store(), id)? else {
            // Deleted between enqueue and dequeue; nothing to do.
            tracing::info!(id, "test run vanished before processing");
            return Ok(());
        };
        self.executor.execute(&mut adapter).await?;
        Ok(())
    }

    fn record_failure(&self, id: i64) {
        if let Err(err) =
            self.executor
                .store()
                .set_test_run_status(id, RunStatus::Failed, Some(GENERIC_FAILURE))
        {
            tracing::error!(id, error = %err, "could not record test run failure");
        }
    }
}

/// Drives `prompt_test_tasks` rows: one fresh experiment per unit, stopping
/// at the first failed unit.
pub struct PromptTestJob {
    executor: Executor,
}

impl PromptTestJob {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl QueueJob for PromptTestJob {
    fn kind(&self) -> &'static str {
        "prompt_tests"
    }

    async fn process(&self, id: i64) -> Result<(), ExecutionError> {
        let store = self.executor.store();
        let Some(task) = store.get_task(id)? else {
            tracing::info!(id, "prompt test task vanished before processing");
            return Ok(());
        };
        if task.is_deleted {
            tracing::info!(id, "prompt test task deleted, skipping");
            return Ok(());
        }
        if task.status.is_terminal() {
            tracing::info!(id, status = %task.status, "prompt test task already terminal");
            return Ok(());
        }

        let units = store.list_units(id)?;
        if units.is_empty() {
            store.set_task_status(id, RunStatus::Completed, None)?;
            return Ok(());
        }

        store.set_task_status(id, RunStatus::Running, None)?;
        for unit in units {
            let experiment = store.create_experiment(unit.id)?;
            let mut adapter = ExperimentAdapter::new(unit, experiment);
            let (status, message) = self.executor.execute(&mut adapter).await?;
            if status == RunStatus::Failed {
                // First failed unit fails the task; later units stay untried.
                store.set_task_status(id, RunStatus::Failed, message.as_deref())?;
                return Ok(());
            }
        }
        store.set_task_status(id, RunStatus::Completed, None)?;
        Ok(())
    }

    fn record_failure(&self, id: i64) {
        if let Err(err) =
            self.executor
                .store()
                .set_task_status(id, RunStatus::Failed, Some(GENERIC_FAILURE))
        {
            tracing::error!(id, error = %err, "could not record prompt test failure");
        }
    }
}
