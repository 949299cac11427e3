//! Configuration module for HealthTrail.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8000)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "healthtrail.db")
    pub db_path: String,
    /// Seconds between scheduled check rounds (default: 60)
    pub check_interval_secs: u64,
    /// Per-probe timeout in seconds (default: 10)
    pub check_timeout_secs: u64,
    /// Upper bound on scheduled checks running at once (default: 32)
    pub max_concurrent_checks: usize,
    /// Days of history kept by the retention sweep, 0 keeps everything (default: 90)
    pub retention_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            db_path: "healthtrail.db".to_string(),
            check_interval_secs: 60,
            check_timeout_secs: 10,
            max_concurrent_checks: 32,
            retention_days: 90,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HEALTHTRAIL_HTTP_PORT`: HTTP port (default: 8000)
    /// - `HEALTHTRAIL_DB_PATH`: Database file path (default: "healthtrail.db")
    /// - `HEALTHTRAIL_CHECK_INTERVAL_SECS`: scheduler interval (default: 60)
    /// - `HEALTHTRAIL_CHECK_TIMEOUT_SECS`: probe timeout (default: 10)
    /// - `HEALTHTRAIL_MAX_CONCURRENT_CHECKS`: scheduled check limit (default: 32)
    /// - `HEALTHTRAIL_RETENTION_DAYS`: history retention, 0 disables (default: 90)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "HEALTHTRAIL_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("HEALTHTRAIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "HEALTHTRAIL_CHECK_INTERVAL_SECS") {
            if secs > 0 {
                cfg.check_interval_secs = secs;
            } else {
                tracing::warn!("HEALTHTRAIL_CHECK_INTERVAL_SECS must be positive, keeping default");
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "HEALTHTRAIL_CHECK_TIMEOUT_SECS") {
            if secs > 0 {
                cfg.check_timeout_secs = secs;
            } else {
                tracing::warn!("HEALTHTRAIL_CHECK_TIMEOUT_SECS must be positive, keeping default");
            }
        }

        if let Some(limit) = parse_var::<usize, _>(&lookup, "HEALTHTRAIL_MAX_CONCURRENT_CHECKS") {
            if limit > 0 {
                cfg.max_concurrent_checks = limit;
            } else {
                tracing::warn!("HEALTHTRAIL_MAX_CONCURRENT_CHECKS must be positive, keeping default");
            }
        }

        if let Some(days) = parse_var(&lookup, "HEALTHTRAIL_RETENTION_DAYS") {
            cfg.retention_days = days;
        }

        cfg
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
