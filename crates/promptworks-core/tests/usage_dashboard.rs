//! Dashboard aggregation over ledger rows produced by real pipeline runs.

mod common;

use common::{outcome, seed_catalog, ScriptedClient};
use promptworks_core::model::{ChatMessage, JsonMap, RunConfig};
use promptworks_core::service::{NewTestRun, PromptWorks};
use promptworks_core::storage::DateRange;
use promptworks_core::{ServiceConfig, Store};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn overview_and_breakdown_cover_all_sources() {
    let store = Store::memory().unwrap();
    let (provider_id, _) = seed_catalog(&store, "chat-mini");
    store.create_model(provider_id, "chat-large").unwrap();

    let client = Arc::new(ScriptedClient::new());
    // Test run: two rounds of 9 tokens each.
    client.push(Ok(outcome("a", Some(5), Some(4), Some(9), 10)));
    client.push(Ok(outcome("b", Some(5), Some(4), Some(9), 10)));
    // Quick test against the bigger model: reported total missing, parts
    // present, so aggregation falls back to 30 + 70.
    client.push(Ok(outcome("c", Some(30), Some(70), None, 10)));

    let service = PromptWorks::start(store.clone(), client, ServiceConfig::default());
    service
        .submit_test_run(NewTestRun {
            model_name: "chat-mini".into(),
            temperature: 0.7,
            top_p: 1.0,
            repetitions: 2,
            prompt_snapshot: None,
            config: RunConfig::default(),
        })
        .unwrap();
    assert!(service.wait_for_idle(Some(Duration::from_secs(5))).await);
    service
        .quick_test("chat-large", vec![ChatMessage::user("hi")], JsonMap::new())
        .await
        .unwrap();

    let totals = service
        .usage_overview(DateRange::default())
        .unwrap()
        .unwrap();
    assert_eq!(totals.call_count, 3);
    assert_eq!(totals.total_tokens, 9 + 9 + 100);
    assert_eq!(totals.input_tokens, 5 + 5 + 30);
    assert_eq!(totals.output_tokens, 4 + 4 + 70);

    let by_model = service.usage_by_model(DateRange::default()).unwrap();
    assert_eq!(by_model.len(), 2);
    assert_eq!(by_model[0].model_name, "chat-large");
    assert_eq!(by_model[0].total_tokens, 100);
    assert_eq!(by_model[0].provider_name.as_deref(), Some("OpenAI"));
    assert_eq!(by_model[1].model_name, "chat-mini");
    assert_eq!(by_model[1].call_count, 2);

    let days = service
        .usage_timeseries(Some(provider_id), "chat-mini", DateRange::default())
        .unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].call_count, 2);
    assert_eq!(days[0].input_tokens, 10);

    service.shutdown().await;
}

#[tokio::test]
async fn quick_test_history_is_newest_first_and_paged() {
    let store = Store::memory().unwrap();
    seed_catalog(&store, "chat-mini");
    let client = Arc::new(ScriptedClient::new());
    for text in ["one", "two", "three"] {
        client.push(Ok(outcome(text, None, None, None, 1)));
    }
    let service = PromptWorks::start(store, client, ServiceConfig::default());
    for _ in 0..3 {
        service
            .quick_test("chat-mini", vec![ChatMessage::user("hi")], JsonMap::new())
            .await
            .unwrap();
    }

    let page = service.quick_test_history(2, 0).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].response_text.as_deref(), Some("three"));
    assert_eq!(page[1].response_text.as_deref(), Some("two"));

    let rest = service.quick_test_history(2, 2).unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].response_text.as_deref(), Some("one"));
    service.shutdown().await;
}

#[tokio::test]
async fn future_range_reports_no_usage() {
    let store = Store::memory().unwrap();
    seed_catalog(&store, "chat-mini");
    let client = Arc::new(ScriptedClient::new());
    let service = PromptWorks::start(store, client, ServiceConfig::default());
    service
        .quick_test("chat-mini", vec![ChatMessage::user("hi")], JsonMap::new())
        .await
        .unwrap();

    let tomorrow = chrono::Utc::now().date_naive() + chrono::Days::new(1);
    let range = DateRange {
        start: Some(tomorrow),
        end: None,
    };
    assert!(service.usage_overview(range).unwrap().is_none());
    assert!(service.usage_by_model(range).unwrap().is_empty());
    service.shutdown().await;
}
