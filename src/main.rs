//! HealthTrail - URL Health Monitoring Service
//!
//! Registers URLs, checks them on demand and on a schedule, records every
//! result and serves uptime and latency metrics over HTTP.

mod config;
mod db;
mod error;
mod metrics;
mod probe;
mod registry;
mod scheduler;
mod web;

use config::ServerConfig;
use db::Store;
use metrics::MetricsAggregator;
use probe::HttpProber;
use registry::Registry;
use scheduler::{CheckCoordinator, RetentionManager, Scheduler};
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("healthtrail=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting HealthTrail on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let registry = Registry::new(store.clone());
    let prober = HttpProber::new(cfg.check_timeout())?;
    let coordinator = Arc::new(CheckCoordinator::new(store.clone(), prober));

    // Start scheduler
    let retention_manager = Arc::new(RetentionManager::new(store.clone(), cfg.retention_days));
    let scheduler = Scheduler::new(
        registry.clone(),
        coordinator.clone(),
        cfg.check_interval(),
        cfg.max_concurrent_checks,
        retention_manager,
    );
    scheduler.start().await;

    // Start web server
    let state = AppState {
        store: store.clone(),
        registry,
        coordinator,
        metrics: MetricsAggregator::new(store),
    };
    let server = Server::new(state, cfg.http_port);
    let served = server.start(shutdown_signal()).await;

    scheduler.stop().await;
    tracing::info!("HealthTrail stopped");

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
