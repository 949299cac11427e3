//! Web server module.

mod error;
mod handlers;

use crate::db::Store;
use crate::metrics::MetricsAggregator;
use crate::registry::Registry;
use crate::scheduler::CheckCoordinator;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub registry: Registry,
    pub coordinator: Arc<CheckCoordinator>,
    pub metrics: MetricsAggregator,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/urls", get(handlers::handle_get_urls).post(handlers::handle_create_url))
        .route("/urls/{id}", delete(handlers::handle_delete_url))
        .route("/check-urls", post(handlers::handle_check_urls))
        .route("/url/{id}/check", post(handlers::handle_check_url))
        .route("/url/{id}/metrics", get(handlers::handle_get_metrics))
        .route("/url/{id}/health-history", get(handlers::handle_get_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}

/// Web server for HealthTrail.
pub struct Server {
    state: AppState,
    http_port: u16,
}

impl Server {
    pub fn new(state: AppState, http_port: u16) -> Self {
        Self { state, http_port }
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let router = router(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
