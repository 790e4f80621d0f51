//! HTTP client for the channel server.

use std::time::Duration;

use reqwest::StatusCode;

use sine_phy::PropagationPath;

use crate::{PathsRequest, PathsResponse};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request timed out after {0:?}")]
    Timeout(Duration),
    #[error("channel server unreachable: {0}")]
    Unreachable(reqwest::Error),
    #[error("channel server returned {0}")]
    Status(StatusCode),
    #[error("invalid channel response: {0}")]
    Decode(reqwest::Error),
}

/// Client with a per-request timeout. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ChannelClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            timeout,
        }
    }

    /// Fetch propagation paths for a directed pair.
    pub async fn paths(&self, request: &PathsRequest) -> Result<Vec<PropagationPath>, ChannelError> {
        let response = self
            .http
            .post(format!("{}/paths", self.base_url))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChannelError::Timeout(self.timeout)
                } else {
                    ChannelError::Unreachable(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(ChannelError::Status(response.status()));
        }
        let body: PathsResponse = response.json().await.map_err(ChannelError::Decode)?;
        Ok(body.into_paths())
    }

    /// Liveness probe against `GET /health`.
    pub async fn healthy(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
