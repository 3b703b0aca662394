//! Per-round prompt assembly.

use crate::model::{ChatMessage, JsonMap};
use serde_json::Value;

/// Replace every `{{run_index}}` placeholder with the 1-based round number.
pub fn substitute_run_index(template: &str, run_index: u32) -> String {
    template.replace("{{run_index}}", &run_index.to_string())
}

/// Build the message list for one round.
///
/// The configured conversation comes first, placeholders substituted. A
/// prompt snapshot becomes a leading system message unless the conversation
/// already carries one. An input (cycled over rounds) becomes the user turn
/// unless one is already present. An empty result gets a minimal user turn
/// so the request is never message-less.
pub fn build_messages(
    conversation: &[ChatMessage],
    inputs: &[String],
    prompt_snapshot: Option<&str>,
    run_index: u32,
) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = conversation
        .iter()
        .map(|m| ChatMessage::new(&m.role, substitute_run_index(&m.content, run_index)))
        .collect();

    let has_system = messages.iter().any(|m| m.role == "system");
    if let Some(snapshot) = prompt_snapshot {
        if !has_system {
            messages.insert(
                0,
                ChatMessage::system(substitute_run_index(snapshot, run_index)),
            );
        }
    }

    let has_user = messages.iter().any(|m| m.role == "user");
    if !has_user {
        if !inputs.is_empty() {
            let input = &inputs[((run_index - 1) as usize) % inputs.len()];
            messages.push(ChatMessage::user(substitute_run_index(input, run_index)));
        } else if messages.is_empty() {
            messages.push(ChatMessage::user(format!("Round {run_index}")));
        }
    }

    messages
}

/// Sampling parameters: the task's temperature/top_p defaults, with any
/// config overrides winning on key collision.
pub fn merge_parameters(temperature: f64, top_p: f64, overrides: &JsonMap) -> JsonMap {
    let mut params = JsonMap::new();
    params.insert("temperature".into(), temperature.into());
    params.insert("top_p".into(), top_p.into());
    for (key, value) in overrides {
        params.insert(key.clone(), value.clone());
    }
    params
}

/// Parse output text as JSON only when it plausibly is a document: trimmed
/// text starting with `{` or `[`.
pub fn try_parse_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
