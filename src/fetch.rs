//! Fetches one window of observations from the Tempest REST API, with
//! bounded retry on transient failures and a fixed pacing delay after every
//! attempt to stay inside the provider's rate limit.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::warn;

use crate::window::Window;

const BASE_URL: &str = "https://swd.weatherflow.com/swd/rest/observations/station";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network-level or 5xx condition; worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// 4xx response; retrying cannot help.
    #[error("request rejected with status {status}")]
    Rejected { status: StatusCode },
}

impl FetchError {
    /// A rejection that means the credentials are bad. Every later window
    /// would fail identically, so callers may abort the whole run on this.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            FetchError::Rejected { status }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }
}

/// Retry schedule for transient failures, plus the mandatory per-request
/// pacing delay. Injected rather than ambient so tests can run with a
/// zero-delay schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub backoff: Duration,
    /// Fixed delay after every attempt, success or failure.
    pub pacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            pacing: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        // attempt is 1-based
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Zero-delay schedule for tests.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
            pacing: Duration::ZERO,
        }
    }
}

/// One raw request for one window's payload. Implemented by the REST client
/// below and by scripted fakes in tests.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn request(&self, window: &Window) -> Result<Value, FetchError>;
}

/// Client for the Tempest station-observations endpoint.
pub struct TempestApi {
    http: Client,
    token: String,
    station: String,
}

impl TempestApi {
    pub fn new(token: &str, station: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            token: token.to_string(),
            station: station.to_string(),
        })
    }
}

#[async_trait]
impl ObservationSource for TempestApi {
    async fn request(&self, window: &Window) -> Result<Value, FetchError> {
        let url = format!("{BASE_URL}/{}", self.station);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("time_start", window.start_ts().to_string()),
                ("time_end", window.end_ts().to_string()),
                ("token", self.token.clone()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(FetchError::Rejected { status });
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!("HTTP status {status}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Transient(format!("reading response body: {e}")))
    }
}

/// Applies the retry schedule and pacing delay around an
/// [`ObservationSource`].
pub struct Fetcher<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: ObservationSource> Fetcher<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Resolves one window to its raw payload. Transient failures are
    /// retried with doubling backoff up to the attempt budget; rejections
    /// return immediately. The pacing delay runs after every attempt.
    pub async fn fetch_window(&self, window: &Window) -> Result<Value, FetchError> {
        let mut attempt = 1;

        loop {
            let result = self.source.request(window).await;
            tokio::time::sleep(self.policy.pacing).await;

            match result {
                Ok(payload) => return Ok(payload),
                Err(FetchError::Transient(cause)) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        window = %window,
                        attempt,
                        "transient fetch failure ({cause}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// -- Tests -------------------------------------------------------------------
