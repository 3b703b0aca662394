//! Command dispatch. Everything prints JSON so output is scriptable.

use crate::args::{
    Command, ModelCommand, ProviderCommand, QuickTestArgs, RangeArgs, RunCommand, SubmitArgs,
    UsageCommand,
};
use anyhow::{bail, Context};
use promptworks_core::model::{ChatMessage, JsonMap, RunConfig};
use promptworks_core::providers::llm::HttpLlmClient;
use promptworks_core::service::{NewTestRun, PromptWorks};
use promptworks_core::storage::DateRange;
use promptworks_core::{ServiceConfig, Store};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const QUEUE_WAIT: Duration = Duration::from_secs(600);

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_service(db: &Path) -> anyhow::Result<PromptWorks> {
    let store = Store::open(db)
        .with_context(|| format!("could not open database at {}", db.display()))?;
    let config = ServiceConfig::from_env();
    let client = HttpLlmClient::new(config.request_timeout)?;
    Ok(PromptWorks::start(store, Arc::new(client), config))
}

fn to_range(args: RangeArgs) -> DateRange {
    DateRange {
        start: args.start,
        end: args.end,
    }
}

pub async fn dispatch(db: &Path, command: Command) -> anyhow::Result<()> {
    let service = open_service(db)?;
    let result = run(&service, command).await;
    service.shutdown().await;
    result
}

async fn run(service: &PromptWorks, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Provider(cmd) => provider(service, cmd),
        Command::Model(cmd) => model(service, cmd),
        Command::Run(cmd) => test_run(service, cmd).await,
        Command::QuickTest(args) => quick_test(service, args).await,
        Command::Usage(cmd) => usage(service, cmd),
    }
}

fn provider(service: &PromptWorks, cmd: ProviderCommand) -> anyhow::Result<()> {
    match cmd {
        ProviderCommand::Add {
            name,
            key,
            api_key,
            base_url,
        } => {
            let id = service.store().create_provider(
                &name,
                key.as_deref(),
                &api_key,
                base_url.as_deref(),
            )?;
            print_json(&json!({ "id": id, "name": name }))
        }
        ProviderCommand::List => {
            let providers = service.store().list_providers()?;
            // API keys stay out of listings.
            let rows: Vec<_> = providers
                .into_iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "name": p.provider_name,
                        "key": p.provider_key,
                        "base_url": p.base_url,
                    })
                })
                .collect();
            print_json(&rows)
        }
        ProviderCommand::Defaults => {
            let rows: Vec<_> = promptworks_core::providers::registry::common_providers()
                .iter()
                .map(|d| json!({ "key": d.key, "name": d.name, "base_url": d.base_url }))
                .collect();
            print_json(&rows)
        }
    }
}

fn model(service: &PromptWorks, cmd: ModelCommand) -> anyhow::Result<()> {
    match cmd {
        ModelCommand::Add { provider_id, name } => {
            let id = service.store().create_model(provider_id, &name)?;
            print_json(&json!({ "id": id, "provider_id": provider_id, "name": name }))
        }
        ModelCommand::List { provider_id } => {
            print_json(&service.store().list_models(provider_id)?)
        }
    }
}

async fn test_run(service: &PromptWorks, cmd: RunCommand) -> anyhow::Result<()> {
    match cmd {
        RunCommand::Submit(args) => submit(service, args).await,
        RunCommand::Status { id } => match service.get_test_run_status(id)? {
            Some(status) => print_json(&status),
            None => bail!("test run {id} not found"),
        },
        RunCommand::Results { id } => print_json(&service.get_results(id)?),
        RunCommand::Retry { id } => {
            service.retry_test_run(id)?;
            if !service.wait_for_idle(Some(QUEUE_WAIT)).await {
                bail!("timed out waiting for the queue");
            }
            match service.get_test_run_status(id)? {
                Some(status) => print_json(&status),
                None => bail!("test run {id} vanished"),
            }
        }
    }
}

async fn submit(service: &PromptWorks, args: SubmitArgs) -> anyhow::Result<()> {
    let id = service.submit_test_run(NewTestRun {
        model_name: args.model,
        temperature: args.temperature,
        top_p: args.top_p,
        repetitions: args.repetitions,
        prompt_snapshot: args.system,
        config: RunConfig {
            inputs: args.inputs,
            ..Default::default()
        },
    })?;
    if args.no_wait {
        return print_json(&json!({ "id": id, "status": "pending" }));
    }
    if !service.wait_for_idle(Some(QUEUE_WAIT)).await {
        bail!("timed out waiting for test run {id}");
    }
    let run = service
        .get_test_run(id)?
        .context("submitted run vanished")?;
    print_json(&json!({
        "id": run.id,
        "status": run.status,
        "error": run.last_error,
        "metrics": run.metrics,
    }))
}

async fn quick_test(service: &PromptWorks, args: QuickTestArgs) -> anyhow::Result<()> {
    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(args.message));

    let mut parameters = JsonMap::new();
    if let Some(temperature) = args.temperature {
        parameters.insert("temperature".into(), json!(temperature));
    }

    if args.stream {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let relay = tokio::spawn(async move {
            let mut stdout = std::io::stdout();
            while let Some(chunk) = rx.recv().await {
                let _ = stdout.write_all(&chunk);
                let _ = stdout.flush();
            }
        });
        let outcome = service
            .quick_test_stream(&args.model, messages, parameters, tx)
            .await?;
        let _ = relay.await;
        eprintln!();
        tracing::info!(
            latency_ms = outcome.latency_ms,
            total_tokens = ?outcome.total_tokens,
            "stream finished"
        );
        Ok(())
    } else {
        let outcome = service.quick_test(&args.model, messages, parameters).await?;
        print_json(&json!({
            "output": outcome.output_text,
            "latency_ms": outcome.latency_ms,
            "prompt_tokens": outcome.prompt_tokens,
            "completion_tokens": outcome.completion_tokens,
            "total_tokens": outcome.total_tokens,
        }))
    }
}

fn usage(service: &PromptWorks, cmd: UsageCommand) -> anyhow::Result<()> {
    match cmd {
        UsageCommand::Overview(range) => match service.usage_overview(to_range(range))? {
            Some(totals) => print_json(&totals),
            None => print_json(&json!({ "call_count": 0 })),
        },
        UsageCommand::ByModel(range) => print_json(&service.usage_by_model(to_range(range))?),
        UsageCommand::Timeseries {
            model,
            provider_id,
            range,
        } => print_json(&service.usage_timeseries(provider_id, &model, to_range(range))?),
        UsageCommand::History { limit, offset } => {
            print_json(&service.quick_test_history(limit, offset)?)
        }
    }
}
