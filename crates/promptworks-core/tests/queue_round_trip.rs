//! End-to-end: submit through the facade, drain the queues, inspect rows.

mod common;

use common::{outcome, seed_catalog, ScriptedClient};
use promptworks_core::engine::Executor;
use promptworks_core::model::{RunConfig, RunStatus};
use promptworks_core::queue::{TaskQueue, TestRunJob};
use promptworks_core::service::{NewPromptTest, NewPromptTestUnit, NewTestRun, PromptWorks};
use promptworks_core::{ServiceConfig, Store};
use std::sync::Arc;
use std::time::Duration;

fn new_test_run(model: &str, repetitions: u32) -> NewTestRun {
    NewTestRun {
        model_name: model.into(),
        temperature: 0.7,
        top_p: 1.0,
        repetitions,
        prompt_snapshot: Some("You are a test assistant.".into()),
        config: RunConfig::default(),
    }
}

#[tokio::test]
async fn submitted_run_completes_with_results_and_usage() {
    common::init_logging();
    let store = Store::memory().unwrap();
    seed_catalog(&store, "chat-mini");
    let client = Arc::new(ScriptedClient::new());
    client.push(Ok(outcome("Hello", Some(5), Some(4), Some(9), 100)));
    client.push(Ok(outcome("Hello", Some(5), Some(4), Some(9), 200)));

    let service = PromptWorks::start(store.clone(), client, ServiceConfig::default());
    let id = service.submit_test_run(new_test_run("chat-mini", 2)).unwrap();
    assert!(service.wait_for_idle(Some(Duration::from_secs(5))).await);

    let status = service.get_test_run_status(id).unwrap().unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    assert!(status.error.is_none());

    let results = service.get_results(id).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].run_index, 1);
    assert_eq!(results[1].run_index, 2);
    assert_eq!(results[0].total_tokens, Some(9));

    let run = service.get_test_run(id).unwrap().unwrap();
    let metrics = run.metrics.unwrap();
    assert_eq!(metrics.rounds, 2);
    assert_eq!(metrics.avg_latency_ms, Some(150.0));
    assert_eq!(metrics.avg_total_tokens, Some(9.0));

    let usage = store.list_usage_logs(Some("test_run")).unwrap();
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].model_name, "chat-mini");
    assert!(usage[0].provider_id.is_some());

    service.shutdown().await;
}

#[tokio::test]
async fn zero_unit_prompt_test_completes_immediately() {
    let store = Store::memory().unwrap();
    let service = PromptWorks::start(
        store,
        Arc::new(ScriptedClient::new()),
        ServiceConfig::default(),
    );
    let id = service
        .submit_prompt_test(NewPromptTest {
            name: "empty".into(),
            units: vec![],
        })
        .unwrap();
    assert!(service.wait_for_idle(Some(Duration::from_secs(5))).await);

    let status = service.get_task_status(id).unwrap().unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    service.shutdown().await;
}

#[tokio::test]
async fn prompt_test_runs_every_unit() {
    let store = Store::memory().unwrap();
    seed_catalog(&store, "chat-mini");
    let client = Arc::new(ScriptedClient::new());
    let service = PromptWorks::start(store.clone(), client.clone(), ServiceConfig::default());

    let unit = NewPromptTestUnit {
        model_name: "chat-mini".into(),
        temperature: 0.5,
        top_p: 1.0,
        rounds: 2,
        prompt_snapshot: Some("Round {{run_index}}".into()),
        config: RunConfig::default(),
    };
    let id = service
        .submit_prompt_test(NewPromptTest {
            name: "pair".into(),
            units: vec![unit.clone(), unit],
        })
        .unwrap();
    assert!(service.wait_for_idle(Some(Duration::from_secs(5))).await);

    let status = service.get_task_status(id).unwrap().unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    // 2 units x 2 rounds
    assert_eq!(client.calls(), 4);
    assert_eq!(store.list_usage_logs(Some("prompt_test")).unwrap().len(), 4);
    service.shutdown().await;
}

#[tokio::test]
async fn missing_id_is_dropped_silently() {
    let store = Store::memory().unwrap();
    let executor = Executor::new(
        store.clone(),
        Arc::new(ScriptedClient::new()),
        ServiceConfig::default(),
    );
    let queue = TaskQueue::start(TestRunJob::new(executor));
    queue.enqueue(4242).unwrap();
    assert!(queue.wait_for_idle(Some(Duration::from_secs(5))).await);
    queue.shutdown().await;
    // Nothing was created and nothing panicked.
    assert!(store.get_test_run(4242).unwrap().is_none());
}

#[tokio::test]
async fn repetition_bounds_are_enforced_at_submit() {
    let store = Store::memory().unwrap();
    let service = PromptWorks::start(
        store,
        Arc::new(ScriptedClient::new()),
        ServiceConfig::default(),
    );
    assert!(service.submit_test_run(new_test_run("m", 0)).is_err());
    assert!(service.submit_test_run(new_test_run("m", 51)).is_err());
    service.shutdown().await;
}
