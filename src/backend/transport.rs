//! Pooled HTTP transport shared by both backend variants.

use super::BackendError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Connection settings for one backend
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the backend (e.g. "http://localhost:3030")
    pub base_url: String,
    /// TCP connect budget
    pub connect_timeout: Duration,
    /// Maximum idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl TransportConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            connect_timeout: Duration::from_millis(250),
            pool_max_idle_per_host: 64,
        }
    }
}

/// JSON-over-HTTP client for a backend's `/detect` endpoint
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    detect_url: String,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, BackendError> {
        reqwest::Url::parse(&config.base_url).map_err(|e| {
            BackendError::Transport(format!("invalid base url '{}': {}", config.base_url, e))
        })?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let detect_url = format!("{}/detect", config.base_url.trim_end_matches('/'));

        Ok(Self { client, detect_url })
    }

    pub fn detect_url(&self) -> &str {
        &self.detect_url
    }

    /// POST `body` to the detect endpoint and decode the JSON reply
    pub async fn post_detect<B, R>(&self, body: &B, deadline: Duration) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(&self.detect_url)
            .timeout(deadline)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_error(e, deadline))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %self.detect_url, status = %status, "Backend returned error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_error(e, deadline))?;

        serde_json::from_slice(&bytes).map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

fn classify_error(error: reqwest::Error, deadline: Duration) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout {
            after_ms: deadline.as_millis() as u64,
        }
    } else if error.is_connect() {
        BackendError::Connection(error.to_string())
    } else if error.is_decode() {
        BackendError::Malformed(error.to_string())
    } else {
        BackendError::Transport(error.to_string())
    }
}
