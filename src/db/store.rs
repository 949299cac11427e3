//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("database lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
///
/// A single connection sits behind a mutex, so every statement (and every
/// multi-statement operation below) is atomic with respect to other callers.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Enable foreign keys and run embedded migrations.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let report = embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        for migration in report.applied_migrations() {
            tracing::info!("Applied migration {}", migration);
        }

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- URL registry ---

    /// Return the URL row matching `url` exactly, inserting it first if absent.
    ///
    /// The boolean is `true` when a new row was created.
    pub fn get_or_insert_url(&self, url: &str) -> Result<(MonitoredUrl, bool), DbError> {
        let conn = self.conn()?;

        let existing = conn
            .query_row(
                "SELECT id, url, created_at FROM urls WHERE url = ?1",
                params![url],
                url_from_row,
            )
            .optional()?;
        if let Some(found) = existing {
            return Ok((found, false));
        }

        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO urls (url, created_at) VALUES (?1, ?2)",
            params![url, format_db_time(created_at)],
        )?;

        let monitored = MonitoredUrl {
            id: conn.last_insert_rowid(),
            url: url.to_string(),
            created_at,
        };
        Ok((monitored, true))
    }

    /// Get all URLs in insertion order.
    pub fn get_urls(&self) -> Result<Vec<MonitoredUrl>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, url, created_at FROM urls ORDER BY id ASC")?;

        let urls = stmt
            .query_map([], url_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(urls)
    }

    /// Get a URL by ID.
    pub fn get_url(&self, id: i64) -> Result<MonitoredUrl, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, url, created_at FROM urls WHERE id = ?1",
            params![id],
            url_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a URL and all of its check results.
    pub fn delete_url(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM health_checks WHERE url_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM urls WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit()?;
        Ok(())
    }

    // --- Check results ---

    /// Append a check result. Fails with `NotFound` if the owning URL is gone.
    pub fn add_check_result(&self, result: NewCheckResult) -> Result<CheckResult, DbError> {
        let conn = self.conn()?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM urls WHERE id = ?1",
                params![result.url_id],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DbError::NotFound);
        }

        conn.execute(
            "INSERT INTO health_checks (url_id, checked_at, status, status_code, response_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result.url_id,
                format_db_time(result.checked_at),
                result.status.is_up(),
                result.status_code,
                result.response_time_ms,
            ],
        )?;

        Ok(CheckResult::from_new(conn.last_insert_rowid(), result))
    }

    /// Get check results for a URL with `since <= checked_at <= until`, latest first.
    pub fn get_check_results(
        &self,
        url_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url_id, checked_at, status, status_code, response_time_ms
             FROM health_checks
             WHERE url_id = ?1 AND checked_at >= ?2 AND checked_at <= ?3
             ORDER BY checked_at DESC, id DESC",
        )?;

        let results = stmt
            .query_map(
                params![url_id, format_db_time(since), format_db_time(until)],
                check_from_row,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(results)
    }

    /// Get the most recent `limit` check results for a URL, latest first.
    pub fn get_recent_check_results(
        &self,
        url_id: i64,
        limit: u32,
    ) -> Result<Vec<CheckResult>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url_id, checked_at, status, status_code, response_time_ms
             FROM health_checks
             WHERE url_id = ?1
             ORDER BY checked_at DESC, id DESC
             LIMIT ?2",
        )?;

        let results = stmt
            .query_map(params![url_id, limit], check_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(results)
    }

    /// Delete check results for all URLs before a cutoff time.
    ///
    /// Returns the number of rows removed.
    pub fn delete_check_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM health_checks WHERE checked_at < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(removed)
    }
}

fn url_from_row(row: &Row<'_>) -> SqlResult<MonitoredUrl> {
    Ok(MonitoredUrl {
        id: row.get(0)?,
        url: row.get(1)?,
        created_at: time_column(row, 2)?,
    })
}

fn check_from_row(row: &Row<'_>) -> SqlResult<CheckResult> {
    let up: bool = row.get(3)?;
    Ok(CheckResult {
        id: row.get(0)?,
        url_id: row.get(1)?,
        checked_at: time_column(row, 2)?,
        status: CheckStatus::from(up),
        status_code: row.get(4)?,
        response_time_ms: row.get(5)?,
    })
}

fn time_column(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unparseable timestamp {raw:?}").into(),
        )
    })
}

/// Format a timestamp as fixed-width text so string order matches time order.
fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
