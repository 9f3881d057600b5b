//! Probe trait, probe results, and the HTTP probe

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MonitorConfig;
use crate::io::HttpClient;
use crate::PingwatchError;

/// Outcome of a single check against a URL
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency: Option<Duration>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(
        url: impl Into<String>,
        status_code: u16,
        latency: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            success: true,
            status_code: Some(status_code),
            latency: Some(latency),
            error: None,
            timestamp,
        }
    }

    pub fn failure(
        url: impl Into<String>,
        error: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            success: false,
            status_code: None,
            latency: None,
            error: Some(error.into()),
            timestamp,
        }
    }
}

/// Trait for checking whether a URL is healthy
#[async_trait]
pub trait Probe: Send + Sync + std::fmt::Debug {
    /// Check the target once. Failures are reported in the result, never as errors.
    async fn probe(&self, target: &MonitorConfig) -> ProbeResult;
}

/// Probe that issues an HTTP GET and compares the status code
pub struct HttpProbe {
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe").finish()
    }
}

impl HttpProbe {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, target: &MonitorConfig) -> ProbeResult {
        let timeout = target.timeout();
        tracing::debug!("Probing {} (timeout {}s)", target.url, timeout.as_secs());

        let started = Instant::now();
        let outcome = self.http.get(&target.url, timeout).await;
        let latency = started.elapsed();

        let (success, status_code, error) = match outcome {
            Ok(response) => {
                let success = target.expected_status_codes.contains(&response.status);
                let error = (!success)
                    .then(|| format!("Unexpected status code: {}", response.status));
                (success, Some(response.status), error)
            }
            Err(PingwatchError::Timeout(secs)) => {
                (false, None, Some(format!("Request timeout after {}s", secs)))
            }
            Err(PingwatchError::Connection(msg)) => {
                (false, None, Some(format!("Connection error: {}", msg)))
            }
            Err(PingwatchError::Http(msg)) => (false, None, Some(format!("Request error: {}", msg))),
            Err(other) => (false, None, Some(format!("Unexpected error: {}", other))),
        };

        if latency.as_secs_f64() > timeout.as_secs_f64() * 0.8 {
            tracing::warn!(
                "Slow response from {}: {:.3}s (timeout threshold: {}s)",
                target.url,
                latency.as_secs_f64(),
                timeout.as_secs()
            );
        }

        match &error {
            None => tracing::debug!(
                "{} is up ({:?}, {:.3}s)",
                target.url,
                status_code,
                latency.as_secs_f64()
            ),
            Some(e) => tracing::debug!("{} check failed: {}", target.url, e),
        }

        ProbeResult {
            url: target.url.clone(),
            success,
            status_code,
            latency: Some(latency),
            error,
            timestamp: Utc::now(),
        }
    }
}
