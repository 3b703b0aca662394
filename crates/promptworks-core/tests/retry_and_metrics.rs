//! Retry semantics: FAILED is the only retryable state, and a retry starts
//! from a clean slate (except the usage ledger, which is append-only).

mod common;

use common::{outcome, seed_catalog, ScriptedClient};
use promptworks_core::model::{RunConfig, RunStatus};
use promptworks_core::service::{NewPromptTest, NewPromptTestUnit, NewTestRun, PromptWorks};
use promptworks_core::{ExecutionError, ServiceConfig, Store};
use std::sync::Arc;
use std::time::Duration;

const IDLE: Option<Duration> = Some(Duration::from_secs(5));

fn run_request(model: &str, repetitions: u32) -> NewTestRun {
    NewTestRun {
        model_name: model.into(),
        temperature: 0.7,
        top_p: 1.0,
        repetitions,
        prompt_snapshot: None,
        config: RunConfig::default(),
    }
}

#[tokio::test]
async fn retry_purges_rounds_and_reruns_from_scratch() {
    let store = Store::memory().unwrap();
    seed_catalog(&store, "chat-mini");
    let client = Arc::new(ScriptedClient::new());
    // First attempt: one good round, then a provider failure.
    client.push(Ok(outcome("partial", Some(1), Some(1), Some(2), 50)));
    client.push(Err(ExecutionError::Provider {
        status: 503,
        body: "{\"message\":\"overloaded\"}".into(),
    }));

    let service = PromptWorks::start(store.clone(), client.clone(), ServiceConfig::default());
    let id = service.submit_test_run(run_request("chat-mini", 2)).unwrap();
    assert!(service.wait_for_idle(IDLE).await);

    let status = service.get_test_run_status(id).unwrap().unwrap();
    assert_eq!(status.status, RunStatus::Failed);
    assert_eq!(service.get_results(id).unwrap().len(), 1);

    // Second attempt succeeds throughout (the script is empty, so the
    // double answers with stock successes).
    service.retry_test_run(id).unwrap();
    assert!(service.wait_for_idle(IDLE).await);

    let run = service.get_test_run(id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.last_error.is_none());
    assert!(run.metrics.is_some());

    let results = service.get_results(id).unwrap();
    assert_eq!(results.len(), 2);
    // The purge cleared the first attempt, so run_index restarts at 1
    // without tripping the uniqueness constraint.
    assert_eq!(results[0].run_index, 1);
    assert_eq!(results[0].output, "ok");

    // 2 calls from the first attempt, 2 from the retry; each successful
    // call left a ledger row that the purge never touched.
    assert_eq!(client.calls(), 4);
    assert_eq!(store.list_usage_logs(Some("test_run")).unwrap().len(), 3);
    service.shutdown().await;
}

#[tokio::test]
async fn only_failed_runs_can_be_retried() {
    let store = Store::memory().unwrap();
    seed_catalog(&store, "chat-mini");
    let service = PromptWorks::start(
        store,
        Arc::new(ScriptedClient::new()),
        ServiceConfig::default(),
    );
    let id = service.submit_test_run(run_request("chat-mini", 1)).unwrap();
    assert!(service.wait_for_idle(IDLE).await);
    assert_eq!(
        service.get_test_run_status(id).unwrap().unwrap().status,
        RunStatus::Completed
    );

    let err = service.retry_test_run(id).unwrap_err();
    assert!(matches!(err, ExecutionError::Configuration(_)));
    let err = service.retry_test_run(999).unwrap_err();
    assert!(matches!(err, ExecutionError::Configuration(_)));
    service.shutdown().await;
}

#[tokio::test]
async fn prompt_test_retry_purges_experiments() {
    let store = Store::memory().unwrap();
    seed_catalog(&store, "chat-mini");
    let client = Arc::new(ScriptedClient::new());
    client.push(Err(ExecutionError::Network("unreachable".into())));

    let service = PromptWorks::start(store.clone(), client, ServiceConfig::default());
    let id = service
        .submit_prompt_test(NewPromptTest {
            name: "retryable".into(),
            units: vec![NewPromptTestUnit {
                model_name: "chat-mini".into(),
                temperature: 0.7,
                top_p: 1.0,
                rounds: 1,
                prompt_snapshot: None,
                config: RunConfig::default(),
            }],
        })
        .unwrap();
    assert!(service.wait_for_idle(IDLE).await);

    let status = service.get_task_status(id).unwrap().unwrap();
    assert_eq!(status.status, RunStatus::Failed);
    let units = store.list_units(id).unwrap();
    assert_eq!(store.list_experiments(units[0].id).unwrap().len(), 1);

    service.retry_prompt_test(id).unwrap();
    assert!(service.wait_for_idle(IDLE).await);

    let status = service.get_task_status(id).unwrap().unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    let experiments = store.list_experiments(units[0].id).unwrap();
    // The failed attempt was purged; only the fresh one remains.
    assert_eq!(experiments.len(), 1);
    assert_eq!(experiments[0].status, RunStatus::Completed);
    assert!(experiments[0].outputs.is_some());
    service.shutdown().await;
}

#[tokio::test]
async fn deleted_tasks_are_invisible_and_not_retryable() {
    let store = Store::memory().unwrap();
    let service = PromptWorks::start(
        store,
        Arc::new(ScriptedClient::new()),
        ServiceConfig::default(),
    );
    let id = service
        .submit_prompt_test(NewPromptTest {
            name: "gone".into(),
            units: vec![],
        })
        .unwrap();
    assert!(service.wait_for_idle(IDLE).await);

    service.delete_prompt_test(id).unwrap();
    assert!(service.get_task_status(id).unwrap().is_none());
    assert!(service.retry_prompt_test(id).is_err());
    service.shutdown().await;
}
