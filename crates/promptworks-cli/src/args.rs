//! Command-line surface.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pw",
    version,
    about = "Run LLM prompt tests and inspect their results and usage"
)]
pub struct Cli {
    /// SQLite database file.
    #[arg(long, env = "PROMPTWORKS_DB", default_value = "promptworks.db", global = true)]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage the provider catalog.
    #[command(subcommand)]
    Provider(ProviderCommand),
    /// Manage catalog models.
    #[command(subcommand)]
    Model(ModelCommand),
    /// Submit and inspect test runs.
    #[command(subcommand)]
    Run(RunCommand),
    /// One ad-hoc call outside any task.
    QuickTest(QuickTestArgs),
    /// Usage dashboards over the ledger.
    #[command(subcommand)]
    Usage(UsageCommand),
}

#[derive(Subcommand)]
pub enum ProviderCommand {
    /// Register a provider.
    Add {
        /// Display name.
        #[arg(long)]
        name: String,
        /// Well-known provider key (openai, anthropic, ...) for URL defaults.
        #[arg(long)]
        key: Option<String>,
        #[arg(long, env = "PROMPTWORKS_API_KEY")]
        api_key: String,
        /// Explicit endpoint; overrides any key-based default.
        #[arg(long)]
        base_url: Option<String>,
    },
    /// List registered providers.
    List,
    /// Show the built-in endpoint defaults for well-known providers.
    Defaults,
}

#[derive(Subcommand)]
pub enum ModelCommand {
    /// Attach a model to a provider.
    Add {
        #[arg(long)]
        provider_id: i64,
        #[arg(long)]
        name: String,
    },
    /// List a provider's models.
    List {
        #[arg(long)]
        provider_id: i64,
    },
}

#[derive(Subcommand)]
pub enum RunCommand {
    /// Submit a run and wait for it to finish.
    Submit(SubmitArgs),
    /// Lifecycle status of a run.
    Status { id: i64 },
    /// Per-round results of a run.
    Results { id: i64 },
    /// Re-enqueue a failed run from scratch.
    Retry { id: i64 },
}

#[derive(Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub model: String,
    #[arg(long, default_value_t = 1)]
    pub repetitions: u32,
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f64,
    #[arg(long, default_value_t = 1.0)]
    pub top_p: f64,
    /// System prompt; `{{run_index}}` is substituted per round.
    #[arg(long)]
    pub system: Option<String>,
    /// User inputs, cycled across rounds. Repeatable.
    #[arg(long = "input")]
    pub inputs: Vec<String>,
    /// Do not wait for the queue; print the ID and return.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args)]
pub struct QuickTestArgs {
    #[arg(long)]
    pub model: String,
    /// The user message to send.
    pub message: String,
    #[arg(long)]
    pub system: Option<String>,
    #[arg(long)]
    pub temperature: Option<f64>,
    /// Relay the raw event stream to stdout as it arrives.
    #[arg(long)]
    pub stream: bool,
}

#[derive(Subcommand)]
pub enum UsageCommand {
    /// Totals across all sources.
    Overview(RangeArgs),
    /// Per-model breakdown, heaviest first.
    ByModel(RangeArgs),
    /// Daily series for one model.
    Timeseries {
        #[arg(long)]
        model: String,
        #[arg(long)]
        provider_id: Option<i64>,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Recent quick-test calls, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

#[derive(Args, Clone, Copy)]
pub struct RangeArgs {
    /// Inclusive start day (YYYY-MM-DD).
    #[arg(long)]
    pub start: Option<NaiveDate>,
    /// Inclusive end day (YYYY-MM-DD).
    #[arg(long)]
    pub end: Option<NaiveDate>,
}
