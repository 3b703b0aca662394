//! Row structs and column-mapping helpers.

use crate::metrics::MetricsSummary;
use crate::model::{RunConfig, RunStatus, UsageSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRow {
    pub id: i64,
    pub provider_name: String,
    pub provider_key: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRow {
    pub id: i64,
    pub provider_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunRow {
    pub id: i64,
    pub model_name: String,
    pub temperature: f64,
    pub top_p: f64,
    pub repetitions: u32,
    pub config: RunConfig,
    pub status: RunStatus,
    pub last_error: Option<String>,
    pub metrics: Option<MetricsSummary>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: i64,
    pub test_run_id: i64,
    pub run_index: u32,
    pub output: String,
    pub parsed_output: Option<Value>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
    pub created_at: String,
}

/// One repetition's outcome, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub run_index: u32,
    pub output: String,
    pub parsed_output: Option<Value>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTestTaskRow {
    pub id: i64,
    pub name: String,
    pub status: RunStatus,
    pub last_error: Option<String>,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTestUnitRow {
    pub id: i64,
    pub task_id: i64,
    pub model_name: String,
    pub temperature: f64,
    pub top_p: f64,
    pub rounds: u32,
    pub prompt_snapshot: Option<String>,
    pub config: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRow {
    pub id: i64,
    pub unit_id: i64,
    pub sequence: i64,
    pub status: RunStatus,
    pub error: Option<String>,
    pub outputs: Option<Value>,
    pub metrics: Option<MetricsSummary>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogRow {
    pub id: i64,
    pub provider_id: Option<i64>,
    pub model_id: Option<i64>,
    pub model_name: String,
    pub source: String,
    pub messages: Option<Value>,
    pub parameters: Option<Value>,
    pub response_text: Option<String>,
    pub temperature: Option<f64>,
    pub latency_ms: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub created_at: String,
}

/// Ledger entry for one successful external call.
#[derive(Debug, Clone)]
pub struct NewUsageLog {
    pub provider_id: Option<i64>,
    pub model_id: Option<i64>,
    pub model_name: String,
    pub source: UsageSource,
    pub messages: Option<Value>,
    pub parameters: Option<Value>,
    pub response_text: Option<String>,
    pub temperature: Option<f64>,
    pub latency_ms: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

// --- column-mapping helpers ---------------------------------------------

fn conversion_failure(idx: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        reason.into(),
    )
}

pub(crate) fn parse_status(idx: usize, raw: String) -> rusqlite::Result<RunStatus> {
    RunStatus::parse(&raw).ok_or_else(|| conversion_failure(idx, format!("unknown status '{raw}'")))
}

pub(crate) fn parse_json_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_failure(idx, e.to_string())))
        .transpose()
}

pub(crate) fn parse_config(idx: usize, raw: Option<String>) -> rusqlite::Result<RunConfig> {
    match raw {
        Some(s) => serde_json::from_str(&s).map_err(|e| conversion_failure(idx, e.to_string())),
        None => Ok(RunConfig::default()),
    }
}

pub(crate) fn parse_metrics(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<MetricsSummary>> {
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_failure(idx, e.to_string())))
        .transpose()
}

pub(crate) fn to_json_text<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}
