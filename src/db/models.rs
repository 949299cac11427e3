//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A URL under monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredUrl {
    pub id: i64,
    /// Normalized absolute URL, unique within the registry.
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Reachability classification of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    pub fn is_up(self) -> bool {
        matches!(self, CheckStatus::Up)
    }
}

impl From<bool> for CheckStatus {
    fn from(up: bool) -> Self {
        if up {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        }
    }
}

/// A check result that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckResult {
    pub url_id: i64,
    pub checked_at: DateTime<Utc>,
    pub status: CheckStatus,
    /// HTTP status, only when a response was received.
    pub status_code: Option<u16>,
    /// Elapsed probe time, only when a response was received.
    pub response_time_ms: Option<f64>,
}

/// A persisted, immutable check result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub id: i64,
    pub url_id: i64,
    pub checked_at: DateTime<Utc>,
    pub status: CheckStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
}

impl CheckResult {
    pub(crate) fn from_new(id: i64, new: NewCheckResult) -> Self {
        Self {
            id,
            url_id: new.url_id,
            checked_at: new.checked_at,
            status: new.status,
            status_code: new.status_code,
            response_time_ms: new.response_time_ms,
        }
    }
}
