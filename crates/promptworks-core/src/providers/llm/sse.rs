//! Incremental parser for OpenAI-style event streams.
//!
//! The wire format is newline-delimited events: one or more `data: {...}`
//! lines terminated by a blank line, ending in `data: [DONE]`. Bytes arrive
//! in arbitrary chunk boundaries, so lines and events are buffered until
//! complete.

use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UsageTokens {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Default)]
pub(crate) struct SseAccumulator {
    line_buf: String,
    event_data: Vec<String>,
    text: String,
    usage: Option<UsageTokens>,
}

impl SseAccumulator {
    /// Feed a raw byte chunk; chunk boundaries need not align with lines.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        self.line_buf.push_str(&String::from_utf8_lossy(chunk));
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            self.push_line(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Flush any trailing line/event once the stream closes.
    pub fn finish(&mut self) {
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.push_line(line.trim_end_matches('\r'));
        }
        self.flush_event();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn usage(&self) -> Option<UsageTokens> {
        self.usage
    }

    fn push_line(&mut self, line: &str) {
        if line.is_empty() {
            self.flush_event();
        } else if let Some(data) = line.strip_prefix("data:") {
            self.event_data.push(data.trim_start().to_string());
        }
        // ":" comment lines and unknown fields are ignored.
    }

    fn flush_event(&mut self) {
        if self.event_data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.event_data).join("\n");
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return;
        }
        let Ok(payload) = serde_json::from_str::<Value>(data) else {
            tracing::debug!(frame = data, "ignoring unparseable stream frame");
            return;
        };

        if let Some(usage) = payload.get("usage").filter(|u| u.is_object()) {
            self.usage = Some(UsageTokens {
                prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_i64),
                completion_tokens: usage.get("completion_tokens").and_then(Value::as_i64),
                total_tokens: usage.get("total_tokens").and_then(Value::as_i64),
            });
        }

        for choice in payload
            .get("choices")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let content = choice
                .pointer("/delta/content")
                .or_else(|| choice.pointer("/message/content"))
                .and_then(Value::as_str);
            if let Some(content) = content {
                self.text.push_str(content);
            }
        }
    }
}
