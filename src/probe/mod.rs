//! Probe module: the single-shot health check.
//!
//! A probe never reports an unreachable endpoint as an error. Timeouts,
//! DNS and TLS failures and refused connections all come back as a DOWN
//! [`ProbeOutcome`]. [`ProbeError`] is reserved for misuse, such as a target
//! that is not an absolute http(s) URL.

mod http;

pub use http::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{CheckStatus, NewCheckResult};

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Result of one probe, before it is attributed to a URL and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub started_at: DateTime<Utc>,
    pub status: CheckStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
}

impl ProbeOutcome {
    /// Outcome for a probe that never got a response.
    pub fn unreachable(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            status: CheckStatus::Down,
            status_code: None,
            response_time_ms: None,
        }
    }

    /// Outcome for a probe that received `status_code` after `elapsed_ms`.
    pub fn responded(started_at: DateTime<Utc>, status_code: u16, elapsed_ms: f64) -> Self {
        Self {
            started_at,
            status: classify(status_code),
            status_code: Some(status_code),
            response_time_ms: Some(elapsed_ms),
        }
    }

    pub fn into_check(self, url_id: i64) -> NewCheckResult {
        NewCheckResult {
            url_id,
            checked_at: self.started_at,
            status: self.status,
            status_code: self.status_code,
            response_time_ms: self.response_time_ms,
        }
    }
}

/// UP for any status in 200..=399, DOWN otherwise.
pub fn classify(status_code: u16) -> CheckStatus {
    CheckStatus::from((200..=399).contains(&status_code))
}
