//! Prompt API client — streamed invocations plus plain JSON calls.
//!
//! DESIGN
//! ======
//! [`PromptClient::stream_invocation`] returns an idle [`StreamSession`];
//! the POST is only sent on the session's first pull, raced against the
//! caller's cancellation token. Plain calls ([`PromptClient::request_json`],
//! [`PromptClient::fetch_history`]) share the same best-effort payload
//! decoding for error bodies.
//!
//! ERROR HANDLING
//! ==============
//! No retries anywhere. A non-success status becomes
//! [`ClientError::Connection`] with the decoded body; a success status with
//! no body (204/205) on the stream endpoint becomes
//! [`ClientError::StreamUnavailable`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, decode_payload};
use crate::session::{ChunkSource, StreamSession};
use crate::types::{HistoryItem, HistoryQuery, InvocationRequest};

const EVENT_STREAM: &str = "text/event-stream";
const HISTORY_PATH: &str = "/llm-providers/quick-test/history";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct PromptClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl PromptClient {
    /// # Errors
    ///
    /// Returns [`ClientError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Build a client from `PROMPT_API_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the HTTP client fails.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(&ClientConfig::from_env()?)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path; exactly one `/` joins the two.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a streamed invocation. Nothing is sent until the returned
    /// session is first pulled; cancelling `token` aborts the request or the
    /// open body at any point.
    #[must_use]
    pub fn stream_invocation(&self, request: InvocationRequest, token: CancellationToken) -> StreamSession {
        let url = self.url(&format!("/llm-providers/{}/invoke/stream", request.provider_id));
        let http = self.http.clone();
        StreamSession::new(Box::pin(open_stream(http, url, request)), token)
    }

    /// Generic JSON call for domain records.
    ///
    /// A `204` (or any empty body) deserializes from JSON `null`, so `T` may
    /// be `()` or an `Option`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connection`] for a non-success status,
    /// [`ClientError::Transport`] when the request fails, and
    /// [`ClientError::Parse`] when the body does not match `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        self.send_json(method, path, &[], body).await
    }

    /// Recent quick-test invocations, newest first.
    ///
    /// # Errors
    ///
    /// Same as [`PromptClient::request_json`].
    pub async fn fetch_history(&self, query: HistoryQuery) -> Result<Vec<HistoryItem>, ClientError> {
        self.send_json(Method::GET, HISTORY_PATH, &query.to_pairs(), None).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(%method, %url, "api request");

        let mut request = self.http.request(method, &url).timeout(self.request_timeout);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(json) = body {
            request = request.json(&json);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let value = decode_payload(&text);

        if !status.is_success() {
            warn!(status = status.as_u16(), %url, "api request rejected");
            return Err(ClientError::Connection { status: status.as_u16(), payload: value });
        }
        serde_json::from_value(value).map_err(|e| ClientError::Parse(e.to_string()))
    }
}

// =============================================================================
// STREAM CONNECT
// =============================================================================

async fn open_stream(
    http: reqwest::Client,
    url: String,
    request: InvocationRequest,
) -> Result<Box<dyn ChunkSource>, ClientError> {
    request.validate()?;
    info!(
        provider_id = request.provider_id,
        model = request.model.as_deref().unwrap_or(""),
        messages = request.messages.len(),
        %url,
        "starting streamed invocation"
    );

    let response = http
        .post(&url)
        .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let payload = match response.text().await {
            Ok(text) => decode_payload(&text),
            Err(e) => {
                warn!(error = %e, "failed to read error body");
                Value::Null
            }
        };
        warn!(status = status.as_u16(), %payload, "streamed invocation rejected");
        return Err(ClientError::Connection { status: status.as_u16(), payload });
    }
    if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
        return Err(ClientError::StreamUnavailable);
    }

    debug!(status = status.as_u16(), "stream open");
    Ok(Box::new(ResponseBody { response }))
}

/// [`ChunkSource`] over a `reqwest` response. Dropping it closes the
/// connection.
pub struct ResponseBody {
    response: reqwest::Response,
}

#[async_trait]
impl ChunkSource for ResponseBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        Ok(self.response.chunk().await?)
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
