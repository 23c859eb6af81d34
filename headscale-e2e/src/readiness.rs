//! Polling the health endpoint until the server answers
//!
//! A probe ends one of three ways: the connection fails (nothing listening
//! yet), the server answers with a non-200 status (listening, not healthy),
//! or it answers 200. Both failures are retried under a [`RetryPolicy`]; when
//! the budget runs out the error reports which of the two was seen last.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Path of the health endpoint served by headscale
pub const HEALTH_PATH: &str = "/health";

/// Errors from waiting on the health endpoint
#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error("failed to build health check client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("headscale is not ready: {url} unreachable after {attempts} attempts: {source}")]
    Unreachable {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("headscale status code not ok: {url} returned {status} after {attempts} attempts")]
    NotReady {
        url: String,
        attempts: u32,
        status: u16,
    },
}

impl ReadinessError {
    /// Number of probes issued before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            ReadinessError::Client(_) => 0,
            ReadinessError::Unreachable { attempts, .. }
            | ReadinessError::NotReady { attempts, .. } => *attempts,
        }
    }
}

/// Outcome of a single failed probe
#[derive(Debug)]
pub enum ProbeFailure {
    /// Connection refused, reset or timed out
    Transport(reqwest::Error),
    /// The server answered with something other than 200
    Status(StatusCode),
}

impl ProbeFailure {
    fn into_error(self, url: &str, attempts: u32) -> ReadinessError {
        match self {
            ProbeFailure::Transport(source) => ReadinessError::Unreachable {
                url: url.to_string(),
                attempts,
                source,
            },
            ProbeFailure::Status(status) => ReadinessError::NotReady {
                url: url.to_string(),
                attempts,
                status: status.as_u16(),
            },
        }
    }
}

/// Exponential backoff budget for readiness polling
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failed probe
    pub initial_interval: Duration,
    /// Growth factor applied to the delay after each failure
    pub multiplier: f64,
    /// Upper bound for a single delay
    pub max_interval: Duration,
    /// Total time budget; no new probe starts past it
    pub max_elapsed: Duration,
    /// Optional cap on the number of probes
    pub max_attempts: Option<u32>,
    /// Timeout of one HTTP request
    pub probe_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(5),
            max_elapsed: Duration::from_secs(60),
            max_attempts: None,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy bounded only by the number of probes, with a fixed delay.
    pub fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            multiplier: 1.0,
            max_interval: interval,
            max_elapsed: Duration::MAX,
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    /// Delay following `current`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max_interval)
    }

    /// Successive delays between probes, ignoring the budget.
    pub fn intervals(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_interval.min(self.max_interval)), |d| {
            Some(self.next_interval(*d))
        })
    }

    /// Whether another probe may start after `attempts` probes, `elapsed`
    /// time so far and a pending `delay`.
    pub fn allows_another(&self, attempts: u32, elapsed: Duration, delay: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return false;
        }
        elapsed.saturating_add(delay) <= self.max_elapsed
    }
}

/// Issues health probes until the server is ready
pub struct ReadinessPoller {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ReadinessPoller {
    pub fn new(policy: RetryPolicy) -> Result<Self, ReadinessError> {
        let client = reqwest::Client::builder()
            .timeout(policy.probe_timeout)
            .no_proxy()
            .build()
            .map_err(ReadinessError::Client)?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issue one GET against `url`.
    pub async fn probe(&self, url: &str) -> Result<(), ProbeFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ProbeFailure::Transport)?;

        if response.status() != StatusCode::OK {
            return Err(ProbeFailure::Status(response.status()));
        }
        Ok(())
    }

    /// Probe `url` until it answers 200 or the retry budget is spent.
    pub async fn wait_ready(&self, url: &str) -> Result<(), ReadinessError> {
        info!("waiting for headscale to be ready at {}", url);

        let start = Instant::now();
        let mut delays = self.policy.intervals();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let failure = match self.probe(url).await {
                Ok(()) => {
                    info!(url, attempts, elapsed = ?start.elapsed(), "headscale is ready");
                    return Ok(());
                }
                Err(failure) => failure,
            };

            let delay = delays.next().unwrap_or(self.policy.max_interval);
            if !self.policy.allows_another(attempts, start.elapsed(), delay) {
                return Err(failure.into_error(url, attempts));
            }

            match &failure {
                ProbeFailure::Transport(e) => debug!(url, attempts, "health probe failed: {}", e),
                ProbeFailure::Status(status) => {
                    debug!(url, attempts, status = status.as_u16(), "health probe not ok")
                }
            }
            sleep(delay).await;
        }
    }
}

/// Convenience wrapper building a one-off [`ReadinessPoller`].
pub async fn wait_ready(url: &str, policy: RetryPolicy) -> Result<(), ReadinessError> {
    ReadinessPoller::new(policy)?.wait_ready(url).await
}

#[cfg(test)]
mod tests;
