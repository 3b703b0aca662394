//! reqwest-backed client for OpenAI-compatible chat-completion endpoints.

use super::sse::SseAccumulator;
use super::{ChunkSink, InvocationOutcome, InvocationRequest, LlmClient};
use crate::error::ExecutionError;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::time::{Duration, Instant};

pub struct HttpLlmClient {
    client: reqwest::Client,
}

impl HttpLlmClient {
    /// Build a client with the fixed per-call timeout.
    pub fn new(timeout: Duration) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn url(request: &InvocationRequest) -> String {
        format!(
            "{}/chat/completions",
            request.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationOutcome, ExecutionError> {
        let url = Self::url(request);
        tracing::debug!(%url, model = %request.model, "invoking chat completion");

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.api_key)
            .json(&request.payload(false))
            .send()
            .await
            .map_err(ExecutionError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Provider {
                status: status.as_u16(),
                body: wrap_error_body(&raw),
            });
        }

        let latency_ms = started.elapsed().as_millis() as i64;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ExecutionError::Unexpected(format!("undecodable provider response: {e}")))?;

        let (prompt_tokens, completion_tokens, total_tokens) = extract_usage(&payload);
        Ok(InvocationOutcome {
            output_text: extract_output(&payload),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            latency_ms,
        })
    }

    async fn invoke_stream(
        &self,
        request: &InvocationRequest,
        sink: ChunkSink,
    ) -> Result<InvocationOutcome, ExecutionError> {
        let url = Self::url(request);
        tracing::debug!(%url, model = %request.model, "invoking streaming chat completion");

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.api_key)
            .json(&request.payload(true))
            .send()
            .await
            .map_err(ExecutionError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            // Read the full error body before raising; nothing is persisted.
            let raw = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Provider {
                status: status.as_u16(),
                body: wrap_error_body(&raw),
            });
        }

        let mut accumulator = SseAccumulator::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ExecutionError::from_reqwest)?;
            // A dropped receiver stops the real-time relay, not the call.
            let _ = sink.send(chunk.to_vec());
            accumulator.push_bytes(&chunk);
        }
        accumulator.finish();

        let usage = accumulator.usage().unwrap_or_default();
        let total_tokens = usage.total_tokens.or(match (usage.prompt_tokens, usage.completion_tokens) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        });
        Ok(InvocationOutcome {
            output_text: accumulator.text().to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens,
            latency_ms: started.elapsed().as_millis() as i64,
        })
    }
}

/// Assistant text from the first choice: `message.content`, falling back to
/// the legacy `text` field, else empty.
fn extract_output(payload: &Value) -> String {
    payload
        .pointer("/choices/0/message/content")
        .or_else(|| payload.pointer("/choices/0/text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// `usage.{prompt,completion,total}_tokens`, each optional; `total` falls
/// back to `prompt + completion` when both parts are present.
fn extract_usage(payload: &Value) -> (Option<i64>, Option<i64>, Option<i64>) {
    let usage = payload.get("usage");
    let field = |name: &str| usage.and_then(|u| u.get(name)).and_then(Value::as_i64);
    let prompt = field("prompt_tokens");
    let completion = field("completion_tokens");
    let total = field("total_tokens").or(match (prompt, completion) {
        (Some(p), Some(c)) => Some(p + c),
        _ => None,
    });
    (prompt, completion, total)
}

/// Error bodies are kept as-is when they are JSON, else wrapped so the
/// failure message stays structured.
fn wrap_error_body(raw: &str) -> String {
    let trimmed = raw.trim();
    if serde_json::from_str::<Value>(trimmed).is_ok() {
        trimmed.to_string()
    } else {
        serde_json::json!({ "message": trimmed }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_prefers_message_content() {
        let payload = json!({ "choices": [{ "message": { "content": "hi" }, "text": "legacy" }] });
        assert_eq!(extract_output(&payload), "hi");
    }

    #[test]
    fn output_falls_back_to_text_field() {
        let payload = json!({ "choices": [{ "text": "legacy" }] });
        assert_eq!(extract_output(&payload), "legacy");
        assert_eq!(extract_output(&json!({ "choices": [] })), "");
    }

    #[test]
    fn usage_total_computed_from_parts_when_absent() {
        let payload = json!({ "usage": { "prompt_tokens": 3, "completion_tokens": 5 } });
        assert_eq!(extract_usage(&payload), (Some(3), Some(5), Some(8)));
    }

    #[test]
    fn usage_total_left_null_when_a_part_is_missing() {
        let payload = json!({ "usage": { "prompt_tokens": 3 } });
        assert_eq!(extract_usage(&payload), (Some(3), None, None));
        assert_eq!(extract_usage(&json!({})), (None, None, None));
    }

    #[test]
    fn reported_total_wins_over_sum() {
        let payload = json!({
            "usage": { "prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 9 }
        });
        assert_eq!(extract_usage(&payload), (Some(3), Some(5), Some(9)));
    }

    #[test]
    fn error_body_wrapping() {
        assert_eq!(
            wrap_error_body("{\"error\":{\"code\":429}}"),
            "{\"error\":{\"code\":429}}"
        );
        assert_eq!(
            wrap_error_body("upstream exploded"),
            "{\"message\":\"upstream exploded\"}"
        );
    }
}
