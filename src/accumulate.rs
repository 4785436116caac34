//! Reply accumulation — folds streamed chat-completion chunks into the text
//! a chat view shows, and maps how a session ended to what the user sees.
//!
//! The server forwards OpenAI-compatible chunks untouched, so `data` is JSON
//! with `choices[].delta.content`, an optional `usage` object, and a final
//! `[DONE]` sentinel. Anything else is skipped without interrupting the
//! stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::session::{SessionState, StreamSession};
use crate::sse::ProtocolMessage;

/// Sentinel that ends an OpenAI-compatible stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Effect of one message on the accumulated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Text appended to the reply.
    Delta(String),
    /// Usage recorded, no text.
    Usage,
    /// The `[DONE]` sentinel.
    Done,
    /// Nothing usable in this message.
    Ignored,
}

#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    text: String,
    usage: Option<Usage>,
    done: bool,
    chunks: usize,
}

impl ReplyAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: &ProtocolMessage) -> Applied {
        let data = message.data.trim();
        if data.is_empty() {
            return Applied::Ignored;
        }
        if data == DONE_SENTINEL {
            self.done = true;
            return Applied::Done;
        }

        let payload: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, event = ?message.event, "skipping non-JSON stream chunk");
                return Applied::Ignored;
            }
        };
        self.chunks += 1;

        let mut applied = Applied::Ignored;
        if let Some(usage) = payload.get("usage").filter(|u| u.is_object()) {
            self.usage = Some(Usage {
                prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
                completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
                total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
            });
            applied = Applied::Usage;
        }

        let mut appended = String::new();
        for choice in payload.get("choices").and_then(Value::as_array).into_iter().flatten() {
            if let Some(content) = choice_content(choice) {
                appended.push_str(content);
            }
        }
        if !appended.is_empty() {
            self.text.push_str(&appended);
            applied = Applied::Delta(appended);
        }
        applied
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// JSON chunks seen so far.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

fn choice_content(choice: &Value) -> Option<&str> {
    fn non_empty(v: Option<&Value>) -> Option<&str> {
        v.and_then(Value::as_str).filter(|s| !s.is_empty())
    }
    non_empty(choice.get("delta").and_then(|d| d.get("content")))
        .or_else(|| non_empty(choice.get("message").and_then(|m| m.get("content"))))
}

/// Drive `session` to its end, feeding every message into `accumulator`
/// and every appended fragment to `on_delta`.
///
/// # Errors
///
/// Returns the session's failure, if it failed. Completion and
/// cancellation are both `Ok`.
pub async fn consume<F>(
    mut session: StreamSession,
    accumulator: &mut ReplyAccumulator,
    mut on_delta: F,
) -> Result<SessionState, ClientError>
where
    F: FnMut(&str),
{
    while let Some(item) = session.next().await {
        if let Applied::Delta(text) = accumulator.apply(&item?) {
            on_delta(&text);
        }
    }
    Ok(session.state())
}

// =============================================================================
// USER-FACING OUTCOME
// =============================================================================

/// How an ended session should be presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Completed or cancelled; nothing to show.
    Silent,
    /// The stream failed.
    Failed { message: String },
    /// The server rejected the request.
    Rejected { status: u16, message: String },
}

impl Notice {
    #[must_use]
    pub fn from_outcome(outcome: &Result<SessionState, ClientError>) -> Self {
        match outcome {
            Ok(_) => Self::Silent,
            Err(ClientError::Connection { status, payload }) => {
                Self::Rejected { status: *status, message: payload_message(payload) }
            }
            Err(err) => Self::Failed { message: err.to_string() },
        }
    }

    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Silent)
    }
}

/// Human-readable text from an error payload: `detail` (string or object
/// with `message`), then `message`, then a raw string, then compact JSON.
#[must_use]
pub fn payload_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_string();
        }
        if let Some(text) = detail.get("message").and_then(Value::as_str) {
            return text.to_string();
        }
    }
    if let Some(text) = payload.get("message").and_then(Value::as_str) {
        return text.to_string();
    }
    match payload {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "accumulate_test.rs"]
mod tests;
