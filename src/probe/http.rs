//! HTTP probe implementation.

use chrono::Utc;
use std::time::{Duration, Instant};
use url::Url;

use super::{ProbeError, ProbeOutcome};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Executes HTTP GET probes with a bounded timeout.
///
/// Cloning is cheap and clones share one connection pool; a single prober can
/// serve any number of concurrent probes.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Run one probe against `target`.
    ///
    /// Latency covers the full response body. Network failures are returned
    /// as a DOWN outcome; only a malformed target is an error.
    pub async fn execute(&self, target: &str) -> Result<ProbeOutcome, ProbeError> {
        let url = parse_target(target)?;

        let started_at = Utc::now();
        let start = Instant::now();

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                if e.is_timeout() {
                    tracing::debug!("Probe of {} timed out after {:?}", target, self.timeout);
                } else {
                    tracing::debug!("Probe of {} failed: {}", target, e);
                }
                return Ok(ProbeOutcome::unreachable(started_at));
            }
        };

        let status_code = response.status().as_u16();

        // The status line already arrived, so a broken body still classifies by code.
        if let Err(e) = response.bytes().await {
            tracing::debug!("Probe of {} failed reading body: {}", target, e);
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(ProbeOutcome::responded(started_at, status_code, elapsed_ms))
    }
}

/// Parse `target` as an absolute http(s) URL with a host.
pub fn parse_target(target: &str) -> Result<Url, ProbeError> {
    let invalid = |reason: String| ProbeError::InvalidTarget {
        target: target.to_string(),
        reason,
    };

    let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url)
}
