//! HTTP fetch with bounded retry

use std::time::Duration;

use reqwest::{Client, Url};
use shoal_core::{ShoalError, ShoalResult};
use tokio_util::sync::CancellationToken;

/// Bounded retry with exponential backoff
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retry
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`, given `attempt` failures so far (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    pub fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts.max(1)
    }
}

pub(crate) fn transport_err(e: reqwest::Error) -> ShoalError {
    ShoalError::Transport(e.to_string())
}

/// Plain HTTP GET client shared by asset downloads and code-image fetches
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// No request timeout is configured: a stalled server stalls the caller.
    pub fn new(retry: RetryPolicy) -> ShoalResult<Self> {
        let client = Client::builder().build().map_err(transport_err)?;
        Ok(Self::with_client(client, retry))
    }

    pub fn with_client(client: Client, retry: RetryPolicy) -> Self {
        HttpFetcher { client, retry }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// GET `url` and return the whole body. Transient failures are retried.
    ///
    /// Cancelling `cancel` abandons the request in flight or the backoff
    /// sleep and returns [`ShoalError::Cancelled`]; no further attempt is made.
    pub async fn get_bytes(&self, url: &str, cancel: &CancellationToken) -> ShoalResult<Vec<u8>> {
        let mut failures = 0u32;
        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ShoalError::Cancelled),
                attempt = self.get_once(url) => attempt,
            };
            match attempt {
                Ok(body) => return Ok(body),
                Err(e) => {
                    failures += 1;
                    if !e.is_transient() || !self.retry.allows_retry(failures) {
                        return Err(e);
                    }
                    let backoff = self.retry.backoff_for(failures);
                    tracing::debug!(%url, error = %e, attempt = failures, ?backoff, "GET failed, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::debug!(%url, attempt = failures, "GET cancelled during backoff");
                            return Err(ShoalError::Cancelled);
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    async fn get_once(&self, url: &str) -> ShoalResult<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShoalError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(transport_err)?;
        Ok(body.to_vec())
    }
}

/// Build `<endpoint>?size=WxH&data=<escaped data>`
pub fn code_image_url(endpoint: &str, width: u32, height: u32, data: &str) -> ShoalResult<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ShoalError::InvalidConfig(format!("code endpoint {endpoint}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("size", &format!("{width}x{height}"))
        .append_pair("data", data);
    Ok(url)
}
