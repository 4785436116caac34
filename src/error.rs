//! Client errors — one taxonomy for streaming and plain API calls.
//!
//! DESIGN
//! ======
//! Cancellation is not represented here. A cancelled session ends its
//! sequence without an error value; only genuine failures become a
//! [`ClientError`], and each one is surfaced exactly once.

use serde_json::Value;
use tracing::warn;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by the prompt API client and stream sessions.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The invocation request was rejected locally, before any network I/O.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server answered with a non-success status.
    #[error("connection rejected: status {status}")]
    Connection { status: u16, payload: Value },

    /// The server reported success but sent no readable body.
    #[error("stream unavailable: response carried no body")]
    StreamUnavailable,

    /// The request or a mid-stream read failed for reasons other than cancellation.
    #[error("transport failed: {0}")]
    Transport(String),

    /// A successful response body did not match the expected shape.
    #[error("response parse failed: {0}")]
    Parse(String),
}

impl ClientError {
    /// Grepable error code for logs and user-facing diagnostics.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::InvalidRequest(_) => "E_INVALID_REQUEST",
            Self::Connection { .. } => "E_CONNECTION",
            Self::StreamUnavailable => "E_STREAM_UNAVAILABLE",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Parse(_) => "E_PARSE",
        }
    }

    /// Whether a fresh invocation could reasonably succeed. Advisory only:
    /// sessions never retry on their own.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Connection { status: 429 | 500..=599, .. })
    }

    /// HTTP status carried by a rejected connection.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Connection { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

// =============================================================================
// PAYLOAD DECODING
// =============================================================================

/// Best-effort decode of an HTTP body into JSON.
///
/// Used for error payloads and for plain API responses alike.
///
/// Empty text yields `null`. Text that is not JSON is carried verbatim as a
/// string; this is logged as a warning and never fails the caller.
#[must_use]
pub fn decode_payload(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "response body is not JSON; carrying raw text");
            Value::String(text.to_owned())
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
