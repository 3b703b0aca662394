//! Domain types shared across the pipeline.

use serde::{Deserialize, Serialize};

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Lifecycle of a task/run entity: `PENDING → RUNNING → {COMPLETED | FAILED}`.
/// `FAILED → PENDING` happens only through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states are never re-entered by a worker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin tag recorded on every usage ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    QuickTest,
    TestRun,
    PromptTest,
}

impl UsageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageSource::QuickTest => "quick_test",
            UsageSource::TestRun => "test_run",
            UsageSource::PromptTest => "prompt_test",
        }
    }
}

/// One chat message in OpenAI chat-completion shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Typed execution configuration stored on a task entity.
///
/// Replaces the open JSON "schema" bag of the original data model: known keys
/// are explicit optional fields, and only `overrides` remains a genuinely
/// open passthrough for provider-specific request parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Explicit provider reference; wins over any name-based lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<i64>,
    /// Explicit model reference within `provider_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i64>,
    /// Prompt content captured once at task creation; later edits to the live
    /// prompt never retroactively change this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_snapshot: Option<String>,
    /// Fixed conversation prefix; `{{run_index}}` is substituted per round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation: Vec<ChatMessage>,
    /// Per-round user inputs, cycled by `(run_index - 1) % len`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Open passthrough request parameters; always win over defaults.
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub overrides: JsonMap,
}
