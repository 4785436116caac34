//! Request and record types exchanged with the prompt API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Upper bound accepted by the server.
pub const MAX_TEMPERATURE: f64 = 2.0;

// =============================================================================
// INVOCATION
// =============================================================================

/// A single chat message. `content` follows the OpenAI chat format: plain
/// text or structured parts, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: Value::String(content.into()) }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Outbound payload for one streamed invocation. Immutable once handed to
/// [`crate::client::PromptClient::stream_invocation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationRequest {
    /// Target provider; part of the URL, not the body.
    #[serde(skip)]
    pub provider_id: i64,
    pub messages: Vec<ChatMessage>,
    pub parameters: Map<String, Value>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i64>,
    #[serde(skip_serializing_if = "is_blank")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_version_id: Option<i64>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}

impl InvocationRequest {
    #[must_use]
    pub fn new(provider_id: i64, messages: Vec<ChatMessage>) -> Self {
        Self {
            provider_id,
            messages,
            parameters: Map::new(),
            temperature: DEFAULT_TEMPERATURE,
            model_id: None,
            model: None,
            prompt_id: None,
            prompt_version_id: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: i64) -> Self {
        self.model_id = Some(model_id);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Link the invocation to a stored prompt (and optionally one of its
    /// versions) for later history lookup.
    #[must_use]
    pub fn with_prompt(mut self, prompt_id: i64, prompt_version_id: Option<i64>) -> Self {
        self.prompt_id = Some(prompt_id);
        self.prompt_version_id = prompt_version_id;
        self
    }

    /// Check the request before anything goes on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for an empty message list or a
    /// temperature outside `0.0..=2.0`.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.messages.is_empty() {
            return Err(ClientError::InvalidRequest("messages must not be empty".into()));
        }
        if !self.temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(ClientError::InvalidRequest(format!(
                "temperature {} outside 0..={MAX_TEMPERATURE}",
                self.temperature
            )));
        }
        Ok(())
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// Message as stored in an invocation history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: Value,
}

/// One past quick-test invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    pub provider_id: Option<i64>,
    pub provider_name: Option<String>,
    pub provider_logo_emoji: Option<String>,
    pub provider_logo_url: Option<String>,
    pub model_id: Option<i64>,
    pub model_name: String,
    pub response_text: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    pub temperature: Option<f64>,
    pub latency_ms: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub prompt_id: Option<i64>,
    pub prompt_version_id: Option<i64>,
    pub created_at: String,
}

/// Paging for [`crate::client::PromptClient::fetch_history`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl HistoryQuery {
    /// Query-string pairs for the values that are set.
    #[must_use]
    pub fn to_pairs(self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
