//! Client configuration parsed from environment variables.

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    pub connect_timeout_secs: u64,
    /// Applies to plain request/response calls. Streams have no intrinsic
    /// timeout; cancel them instead.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `PROMPT_API_BASE_URL`: default `http://localhost:8000/api/v1`
    /// - `PROMPT_API_CONNECT_TIMEOUT_SECS`: default 10
    /// - `PROMPT_API_REQUEST_TIMEOUT_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigParse`] when the base URL is not http(s).
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = normalize_base_url(std::env::var("PROMPT_API_BASE_URL").ok().as_deref())?;
        Ok(Self {
            base_url,
            connect_timeout_secs: env_parse_u64("PROMPT_API_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout_secs: env_parse_u64("PROMPT_API_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Replace the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigParse`] when the URL is not http(s).
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ClientError> {
        self.base_url = normalize_base_url(Some(raw))?;
        Ok(self)
    }
}

/// Blank → default; otherwise trailing slashes are trimmed.
///
/// # Errors
///
/// Returns [`ClientError::ConfigParse`] when the URL is not http(s).
pub fn normalize_base_url(raw: Option<&str>) -> Result<String, ClientError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(DEFAULT_BASE_URL.to_string());
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientError::ConfigParse(format!(
            "base URL '{trimmed}' must start with http:// or https://"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
