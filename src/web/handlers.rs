//! HTTP request handlers.

use super::AppState;
use crate::db::{CheckResult, CheckStatus, MonitoredUrl};
use crate::error::{Error, Result};
use crate::metrics::{validate_window, DEFAULT_WINDOW_DAYS};
use crate::registry::normalize_url;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Liveness of this service, not of any monitored URL.
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "API is running",
    })
}

// ============================================================================
// API: URLs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<MonitoredUrl> for UrlResponse {
    fn from(u: MonitoredUrl) -> Self {
        Self {
            id: u.id,
            url: u.url,
            created_at: u.created_at,
        }
    }
}

pub async fn handle_get_urls(State(state): State<AppState>) -> Result<Json<Vec<UrlResponse>>> {
    let urls = state.registry.list()?;
    Ok(Json(urls.into_iter().map(UrlResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    pub url: String,
}

pub async fn handle_create_url(
    State(state): State<AppState>,
    Json(req): Json<CreateUrlRequest>,
) -> Result<Json<UrlResponse>> {
    let url = state.registry.register(&req.url)?;
    Ok(Json(url.into()))
}

pub async fn handle_delete_url(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.registry.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// API: Checks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckUrlsRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckUrlResponse {
    pub url: String,
    pub status: CheckStatus,
    pub response_time: Option<f64>,
    pub status_code: Option<u16>,
    pub checked_at: DateTime<Utc>,
}

/// Check a batch of URLs in parallel, registering any that are new.
///
/// Every input is validated before anything is registered or probed. An
/// unreachable URL is a DOWN entry in a 200 response, not a failure. So is a
/// URL removed while its check ran, since its result was never stored.
pub async fn handle_check_urls(
    State(state): State<AppState>,
    Json(req): Json<CheckUrlsRequest>,
) -> Result<Json<Vec<CheckUrlResponse>>> {
    tracing::info!("Checking {} URLs on demand", req.urls.len());

    let normalized = req
        .urls
        .iter()
        .map(|u| normalize_url(u))
        .collect::<Result<Vec<_>>>()?;

    let urls = normalized
        .iter()
        .map(|u| state.registry.register(u))
        .collect::<Result<Vec<_>>>()?;

    let results = state.coordinator.check_many(&urls).await;

    let mut response = Vec::with_capacity(urls.len());
    for (url, result) in urls.into_iter().zip(results) {
        let entry = match result {
            Ok(result) => CheckUrlResponse {
                url: url.url,
                status: result.status,
                response_time: result.response_time_ms,
                status_code: result.status_code,
                checked_at: result.checked_at,
            },
            Err(Error::NotFound) => CheckUrlResponse {
                url: url.url,
                status: CheckStatus::Down,
                response_time: None,
                status_code: None,
                checked_at: Utc::now(),
            },
            Err(e) => return Err(e),
        };
        response.push(entry);
    }

    Ok(Json(response))
}

/// Check one registered URL now, joining a check already in flight for it.
pub async fn handle_check_url(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CheckUrlResponse>> {
    let url = state.registry.get(id)?;
    let result = state.coordinator.check_now(&url).await?;

    Ok(Json(CheckUrlResponse {
        url: url.url,
        status: result.status,
        response_time: result.response_time_ms,
        status_code: result.status_code,
        checked_at: result.checked_at,
    }))
}

// ============================================================================
// API: Metrics & History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub url_id: i64,
    pub url: String,
    pub time_period_days: u32,
    pub uptime_percentage: Option<f64>,
    pub average_response_time: Option<f64>,
    pub total_checks: u64,
    pub up_checks: u64,
    pub down_checks: u64,
    pub min_response_time: Option<f64>,
    pub max_response_time: Option<f64>,
    pub p50_response_time: Option<f64>,
    pub p95_response_time: Option<f64>,
    pub p99_response_time: Option<f64>,
}

pub async fn handle_get_metrics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<MetricsResponse>> {
    let url = state.registry.get(id)?;
    let m = state
        .metrics
        .metrics(id, query.days.unwrap_or(DEFAULT_WINDOW_DAYS))?;

    Ok(Json(MetricsResponse {
        url_id: m.url_id,
        url: url.url,
        time_period_days: m.window_days,
        uptime_percentage: m.uptime_percentage,
        average_response_time: m.average_response_time_ms,
        total_checks: m.total_checks,
        up_checks: m.up_checks,
        down_checks: m.down_checks,
        min_response_time: m.min_response_time_ms,
        max_response_time: m.max_response_time_ms,
        p50_response_time: m.p50_response_time_ms,
        p95_response_time: m.p95_response_time_ms,
        p99_response_time: m.p99_response_time_ms,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub url_id: i64,
    pub checked_at: DateTime<Utc>,
    /// `true` for UP.
    pub status: bool,
    pub response_time: Option<f64>,
    pub status_code: Option<u16>,
}

impl From<CheckResult> for HistoryEntry {
    fn from(r: CheckResult) -> Self {
        Self {
            id: r.id,
            url_id: r.url_id,
            checked_at: r.checked_at,
            status: r.status.is_up(),
            response_time: r.response_time_ms,
            status_code: r.status_code,
        }
    }
}

/// History for one URL, latest first.
pub async fn handle_get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>> {
    state.registry.get(id)?;

    let mut checks = match query.days {
        Some(days) => {
            validate_window(days)?;
            let now = Utc::now();
            state
                .store
                .get_check_results(id, now - ChronoDuration::days(i64::from(days)), now)?
        }
        None => state
            .store
            .get_recent_check_results(id, query.limit.unwrap_or(u32::MAX))?,
    };

    if let Some(limit) = query.limit {
        checks.truncate(limit as usize);
    }

    Ok(Json(checks.into_iter().map(HistoryEntry::from).collect()))
}

#[cfg(test)]
mod tests {
    use crate::db::Store;
    use crate::metrics::MetricsAggregator;
    use crate::probe::HttpProber;
    use crate::registry::Registry;
    use crate::scheduler::CheckCoordinator;
    use crate::web::{router, AppState};

    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::NamedTempFile;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct TestApp {
        _tmp: NamedTempFile,
        base: String,
        client: reqwest::Client,
    }

    impl TestApp {
        async fn spawn(probe_timeout: Duration) -> Self {
            let tmp = NamedTempFile::new().unwrap();
            let store = Arc::new(Store::new(tmp.path()).unwrap());
            let prober = HttpProber::new(probe_timeout).unwrap();
            let state = AppState {
                store: store.clone(),
                registry: Registry::new(store.clone()),
                coordinator: Arc::new(CheckCoordinator::new(store.clone(), prober)),
                metrics: MetricsAggregator::new(store),
            };

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router(state)).await.unwrap();
            });

            Self {
                _tmp: tmp,
                base: format!("http://{addr}"),
                client: reqwest::Client::new(),
            }
        }

        async fn get(&self, path: &str) -> (u16, Value) {
            let resp = self
                .client
                .get(format!("{}{}", self.base, path))
                .send()
                .await
                .unwrap();
            let status = resp.status().as_u16();
            (status, resp.json().await.unwrap_or(Value::Null))
        }

        async fn post(&self, path: &str, body: Value) -> (u16, Value) {
            let resp = self
                .client
                .post(format!("{}{}", self.base, path))
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = resp.status().as_u16();
            (status, resp.json().await.unwrap_or(Value::Null))
        }

        async fn delete(&self, path: &str) -> u16 {
            self.client
                .delete(format!("{}{}", self.base, path))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }
    }

    async fn upstream() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::spawn(Duration::from_secs(1)).await;
        let (status, body) = app.get("/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_check_urls_mixed_batch() {
        let app = TestApp::spawn(Duration::from_millis(500)).await;
        let server = upstream().await;
        let good = format!("{}/good", server.uri());
        let slow = format!("{}/slow", server.uri());

        let (status, body) = app
            .post("/check-urls", json!({ "urls": [good.clone(), slow.clone()] }))
            .await;
        assert_eq!(status, 200);

        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0]["url"], good.as_str());
        assert_eq!(results[0]["status"], "UP");
        assert_eq!(results[0]["status_code"], 200);
        assert!(results[0]["response_time"].as_f64().unwrap() >= 50.0);

        assert_eq!(results[1]["url"], slow.as_str());
        assert_eq!(results[1]["status"], "DOWN");
        assert!(results[1]["status_code"].is_null());
        assert!(results[1]["response_time"].is_null());

        let (_, urls) = app.get("/urls").await;
        let listed: Vec<&str> = urls
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["url"].as_str().unwrap())
            .collect();
        assert_eq!(listed, vec![good.as_str(), slow.as_str()]);
    }

    #[tokio::test]
    async fn test_check_urls_runs_in_parallel() {
        let app = TestApp::spawn(Duration::from_secs(2)).await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .expect(2)
            .mount(&server)
            .await;

        let start = Instant::now();
        let (status, body) = app
            .post(
                "/check-urls",
                json!({ "urls": [format!("{}/a", server.uri()), format!("{}/b", server.uri())] }),
            )
            .await;
        let elapsed = start.elapsed();

        assert_eq!(status, 200);
        assert!(body.as_array().unwrap().iter().all(|r| r["status"] == "UP"));
        assert!(elapsed < Duration::from_millis(550), "batch took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_check_urls_survives_removal_mid_batch() {
        let app = Arc::new(TestApp::spawn(Duration::from_secs(2)).await);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lagging"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;
        let fast = format!("{}/fast", server.uri());
        let lagging = format!("{}/lagging", server.uri());

        let (_, created) = app.post("/urls", json!({ "url": lagging })).await;
        let lagging_id = created["id"].as_i64().unwrap();

        let batch = {
            let app = app.clone();
            let urls = json!({ "urls": [fast.clone(), lagging.clone()] });
            tokio::spawn(async move { app.post("/check-urls", urls).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(app.delete(&format!("/urls/{lagging_id}")).await, 204);

        let (status, body) = batch.await.unwrap();
        assert_eq!(status, 200);
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0]["url"], fast.as_str());
        assert_eq!(results[0]["status"], "UP");
        assert_eq!(results[0]["status_code"], 200);

        assert_eq!(results[1]["url"], lagging.as_str());
        assert_eq!(results[1]["status"], "DOWN");
        assert!(results[1]["status_code"].is_null());
        assert!(results[1]["response_time"].is_null());

        assert_eq!(app.get(&format!("/url/{lagging_id}/health-history")).await.0, 404);
    }

    #[tokio::test]
    async fn test_check_urls_rejects_invalid_batch_without_side_effects() {
        let app = TestApp::spawn(Duration::from_secs(1)).await;
        let server = upstream().await;

        let (status, body) = app
            .post(
                "/check-urls",
                json!({ "urls": [format!("{}/good", server.uri()), "ftp://nope.test"] }),
            )
            .await;
        assert_eq!(status, 400);
        assert!(body["detail"].as_str().unwrap().contains("ftp://nope.test"));

        let (_, urls) = app.get("/urls").await;
        assert!(urls.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_urls_empty() {
        let app = TestApp::spawn(Duration::from_secs(1)).await;
        let (status, body) = app.post("/check-urls", json!({ "urls": [] })).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_register_normalizes_and_dedupes() {
        let app = TestApp::spawn(Duration::from_secs(1)).await;

        let (status, first) = app.post("/urls", json!({ "url": "example.com" })).await;
        assert_eq!(status, 200);
        assert_eq!(first["url"], "https://example.com");

        let (_, second) = app.post("/urls", json!({ "url": "https://example.com" })).await;
        assert_eq!(first["id"], second["id"]);

        let (_, urls) = app.get("/urls").await;
        assert_eq!(urls.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_and_history() {
        let app = TestApp::spawn(Duration::from_secs(1)).await;
        let server = upstream().await;
        let good = format!("{}/good", server.uri());
        let broken = format!("{}/broken", server.uri());

        let (_, created) = app.post("/urls", json!({ "url": good })).await;
        let id = created["id"].as_i64().unwrap();

        let (status, empty) = app.get(&format!("/url/{id}/metrics")).await;
        assert_eq!(status, 200);
        assert_eq!(empty["total_checks"], 0);
        assert!(empty["uptime_percentage"].is_null());
        assert!(empty["average_response_time"].is_null());
        assert_eq!(empty["time_period_days"], 7);

        for _ in 0..3 {
            app.post("/check-urls", json!({ "urls": [good] })).await;
        }
        app.post("/check-urls", json!({ "urls": [broken] })).await;

        let (_, metrics) = app.get(&format!("/url/{id}/metrics?days=1")).await;
        assert_eq!(metrics["total_checks"], 3);
        assert_eq!(metrics["uptime_percentage"], 100.0);
        assert!(metrics["average_response_time"].as_f64().unwrap() >= 50.0);

        let (status, history) = app.get(&format!("/url/{id}/health-history")).await;
        assert_eq!(status, 200);
        let entries = history.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e["status"] == true));
        let ids: Vec<i64> = entries.iter().map(|e| e["id"].as_i64().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] > w[1]));

        let (_, latest) = app.get(&format!("/url/{id}/health-history?limit=1")).await;
        assert_eq!(latest.as_array().unwrap().len(), 1);
        assert_eq!(latest[0]["id"], entries[0]["id"]);
    }

    #[tokio::test]
    async fn test_check_single_url() {
        let app = TestApp::spawn(Duration::from_secs(1)).await;
        let server = upstream().await;

        let (_, created) = app
            .post("/urls", json!({ "url": format!("{}/broken", server.uri()) }))
            .await;
        let id = created["id"].as_i64().unwrap();

        let (status, result) = app.post(&format!("/url/{id}/check"), json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(result["status"], "DOWN");
        assert_eq!(result["status_code"], 500);

        assert_eq!(app.post("/url/999/check", json!({})).await.0, 404);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_requests() {
        let app = TestApp::spawn(Duration::from_secs(1)).await;

        assert_eq!(app.get("/url/42/metrics").await.0, 404);
        assert_eq!(app.get("/url/42/health-history").await.0, 404);
        assert_eq!(app.delete("/urls/42").await, 404);

        let (_, created) = app.post("/urls", json!({ "url": "example.com" })).await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(app.get(&format!("/url/{id}/metrics?days=0")).await.0, 400);
        assert_eq!(app.get(&format!("/url/{id}/metrics?days=abc")).await.0, 400);

        assert_eq!(app.delete(&format!("/urls/{id}")).await, 204);
        assert_eq!(app.get(&format!("/url/{id}/metrics")).await.0, 404);
    }
}
