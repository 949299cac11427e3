//! Metrics aggregation over a URL's check history.
//!
//! Snapshots are recomputed from the store on every call.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tdigests::TDigest;

use crate::db::{CheckResult, Store};
use crate::error::{Error, Result};

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Derived statistics for one URL over `[now - window_days, now]`.
///
/// Every `Option` is `None` when there is nothing to compute it from; an empty
/// window never reports 0% uptime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub url_id: i64,
    pub window_days: u32,
    pub total_checks: u64,
    pub up_checks: u64,
    pub down_checks: u64,
    pub uptime_percentage: Option<f64>,
    pub average_response_time_ms: Option<f64>,
    pub min_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<f64>,
    pub p50_response_time_ms: Option<f64>,
    pub p95_response_time_ms: Option<f64>,
    pub p99_response_time_ms: Option<f64>,
}

/// Computes [`MetricsSnapshot`]s from stored history.
#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<Store>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn metrics(&self, url_id: i64, window_days: u32) -> Result<MetricsSnapshot> {
        self.metrics_at(url_id, window_days, Utc::now())
    }

    fn metrics_at(&self, url_id: i64, window_days: u32, now: DateTime<Utc>) -> Result<MetricsSnapshot> {
        validate_window(window_days)?;
        self.store.get_url(url_id)?;

        let since = now - ChronoDuration::days(i64::from(window_days));
        let checks = self.store.get_check_results(url_id, since, now)?;

        Ok(summarize(url_id, window_days, &checks))
    }
}

pub fn validate_window(window_days: u32) -> Result<()> {
    if (1..=MAX_WINDOW_DAYS).contains(&window_days) {
        Ok(())
    } else {
        Err(Error::InvalidWindow(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}, got {window_days}"
        )))
    }
}

/// Summarize `checks`, which must already be restricted to the window.
pub fn summarize(url_id: i64, window_days: u32, checks: &[CheckResult]) -> MetricsSnapshot {
    let total_checks = checks.len() as u64;
    let up_checks = checks.iter().filter(|c| c.status.is_up()).count() as u64;

    let uptime_percentage =
        (total_checks > 0).then(|| 100.0 * up_checks as f64 / total_checks as f64);

    // Checks without a measured time are left out, not counted as zero.
    let timings: Vec<f64> = checks
        .iter()
        .filter_map(|c| c.response_time_ms)
        .filter(|t| t.is_finite())
        .collect();

    let latency = LatencySummary::from_timings(timings);

    MetricsSnapshot {
        url_id,
        window_days,
        total_checks,
        up_checks,
        down_checks: total_checks - up_checks,
        uptime_percentage,
        average_response_time_ms: latency.as_ref().map(|l| l.mean),
        min_response_time_ms: latency.as_ref().map(|l| l.min),
        max_response_time_ms: latency.as_ref().map(|l| l.max),
        p50_response_time_ms: latency.as_ref().and_then(|l| l.p50),
        p95_response_time_ms: latency.as_ref().and_then(|l| l.p95),
        p99_response_time_ms: latency.as_ref().and_then(|l| l.p99),
    }
}

struct LatencySummary {
    mean: f64,
    min: f64,
    max: f64,
    p50: Option<f64>,
    p95: Option<f64>,
    p99: Option<f64>,
}

impl LatencySummary {
    fn from_timings(timings: Vec<f64>) -> Option<Self> {
        if timings.is_empty() {
            return None;
        }

        let count = timings.len() as f64;
        let mean = timings.iter().sum::<f64>() / count;
        let min = timings.iter().copied().fold(f64::INFINITY, f64::min);
        let max = timings.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut td = TDigest::from_values(timings);
        td.compress(100);
        let quantile = |q: f64| {
            let v = td.estimate_quantile(q);
            v.is_finite().then(|| v.clamp(min, max))
        };

        Some(Self {
            mean,
            min,
            max,
            p50: quantile(0.50),
            p95: quantile(0.95),
            p99: quantile(0.99),
        })
    }
}
