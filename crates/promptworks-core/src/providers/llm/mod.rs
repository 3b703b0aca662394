//! Chat-completion invocation against OpenAI-compatible endpoints.

pub mod openai;
pub(crate) mod sse;

pub use openai::HttpLlmClient;

use crate::error::ExecutionError;
use crate::model::{ChatMessage, JsonMap};
use async_trait::async_trait;
use serde_json::Value;

/// Everything needed for one chat-completion call.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Open parameter map; caller-supplied keys always win over defaults.
    pub parameters: JsonMap,
}

impl InvocationRequest {
    /// Request payload `{model, messages, ...parameters}`. When `stream` is
    /// set, `stream: true` and `stream_options.include_usage: true` are
    /// forced (preserving any caller-supplied `stream_options` keys).
    pub(crate) fn payload(&self, stream: bool) -> Value {
        let mut body = self.parameters.clone();
        body.remove("stream");
        body.insert("model".into(), Value::String(self.model.clone()));
        body.insert(
            "messages".into(),
            serde_json::to_value(&self.messages).unwrap_or(Value::Null),
        );
        if stream {
            body.insert("stream".into(), Value::Bool(true));
            let options = body
                .entry("stream_options")
                .or_insert_with(|| Value::Object(JsonMap::new()));
            if let Some(map) = options.as_object_mut() {
                map.entry("include_usage").or_insert(Value::Bool(true));
            } else {
                *options = serde_json::json!({ "include_usage": true });
            }
        }
        Value::Object(body)
    }
}

/// Outcome of one successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub output_text: String,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub latency_ms: i64,
}

/// Receiver side gets the raw upstream bytes for real-time display; dropping
/// it does not abort the call.
pub type ChunkSink = tokio::sync::mpsc::UnboundedSender<Vec<u8>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-shot chat completion.
    async fn invoke(&self, request: &InvocationRequest)
        -> Result<InvocationOutcome, ExecutionError>;

    /// Streaming chat completion: forwards raw bytes to `sink` while
    /// accumulating delta text and the final usage block for persistence.
    async fn invoke_stream(
        &self,
        request: &InvocationRequest,
        sink: ChunkSink,
    ) -> Result<InvocationOutcome, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(parameters: JsonMap) -> InvocationRequest {
        InvocationRequest {
            base_url: "https://llm.example/v1".into(),
            api_key: "k".into(),
            model: "chat-mini".into(),
            messages: vec![ChatMessage::user("hi")],
            parameters,
        }
    }

    #[test]
    fn payload_merges_parameters_under_model_and_messages() {
        let mut params = JsonMap::new();
        params.insert("temperature".into(), serde_json::json!(0.2));
        params.insert("model".into(), serde_json::json!("shadowed"));
        let body = request(params).payload(false);

        assert_eq!(body["model"], "chat-mini");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn stream_payload_forces_usage_reporting() {
        let body = request(JsonMap::new()).payload(true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn stream_payload_keeps_caller_stream_options() {
        let mut params = JsonMap::new();
        params.insert(
            "stream_options".into(),
            serde_json::json!({ "chunk_size": 16 }),
        );
        params.insert("stream".into(), serde_json::json!(false));
        let body = request(params).payload(true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["chunk_size"], 16);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }
}
