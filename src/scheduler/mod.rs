//! Scheduler module for recurring checks and history retention.

mod coordinator;
mod retention;

pub use coordinator::*;
pub use retention::*;

use crate::db::MonitoredUrl;
use crate::registry::Registry;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;

/// Periodically checks every registered URL.
///
/// The URL list is re-read from the registry on every tick, so URLs added
/// after start are picked up without a restart.
pub struct Scheduler {
    registry: Registry,
    coordinator: Arc<CheckCoordinator>,
    interval: Duration,
    limit: Arc<Semaphore>,
    retention_manager: Arc<RetentionManager>,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl Scheduler {
    pub fn new(
        registry: Registry,
        coordinator: Arc<CheckCoordinator>,
        interval: Duration,
        max_concurrent_checks: usize,
        retention_manager: Arc<RetentionManager>,
    ) -> Self {
        Self {
            registry,
            coordinator,
            interval,
            limit: Arc::new(Semaphore::new(max_concurrent_checks)),
            retention_manager,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the tick loop and the retention manager.
    pub async fn start(&self) {
        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        {
            let mut stop = self.stop.lock().await;
            if stop.is_some() {
                return; // Already running
            }
            *stop = Some(stop_tx);
        }

        tracing::info!("Starting scheduler, checking every {:?}", self.interval);

        let registry = self.registry.clone();
        let coordinator = self.coordinator.clone();
        let limit = self.limit.clone();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        run_round(&registry, &coordinator, &limit);
                    }
                }
            }
            tracing::info!("Scheduler stopped");
        });

        self.retention_manager.start().await;
    }

    /// Stop the tick loop and the retention manager. In-flight checks finish.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
        self.retention_manager.stop().await;
    }
}

/// Spawn one scheduled check per registered URL.
///
/// URLs already being checked are skipped, as are URLs for which no
/// concurrency slot is free this round.
fn run_round(
    registry: &Registry,
    coordinator: &Arc<CheckCoordinator>,
    limit: &Arc<Semaphore>,
) -> Vec<JoinHandle<()>> {
    let urls = match registry.list() {
        Ok(u) => u,
        Err(e) => {
            tracing::error!("Scheduler: Failed to list URLs: {}", e);
            return Vec::new();
        }
    };

    let mut handles = Vec::with_capacity(urls.len());
    for url in urls {
        if coordinator.is_in_flight(url.id) {
            tracing::debug!("Skipping scheduled check for {}, already in flight", url.url);
            continue;
        }

        let permit = match limit.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("Skipping scheduled check for {} due to concurrency limit", url.url);
                continue;
            }
        };

        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit; // Hold permit until done
            scheduled_check(&coordinator, url).await;
        }));
    }
    handles
}

async fn scheduled_check(coordinator: &CheckCoordinator, url: MonitoredUrl) {
    // Add jitter to avoid bursts against shared hosts
    let jitter = rand::random::<u64>() % 100;
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    match coordinator.check_scheduled(&url).await {
        None => {
            tracing::debug!("Skipping scheduled check for {}, already in flight", url.url);
        }
        Some(Ok(result)) => {
            tracing::debug!("Scheduled check for {} stored as {}", url.url, result.id);
        }
        Some(Err(e)) => {
            tracing::warn!("Scheduled check for {} not stored: {}", url.url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::probe::HttpProber;
    use tempfile::NamedTempFile;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _tmp: NamedTempFile,
        store: Arc<Store>,
        registry: Registry,
        coordinator: Arc<CheckCoordinator>,
    }

    fn fixture() -> Fixture {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let prober = HttpProber::new(Duration::from_secs(5)).unwrap();
        Fixture {
            registry: Registry::new(store.clone()),
            coordinator: Arc::new(CheckCoordinator::new(store.clone(), prober)),
            store,
            _tmp: tmp,
        }
    }

    async fn server_with_delay(delay_ms: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(delay_ms)))
            .mount(&server)
            .await;
        server
    }

    async fn join_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_round_checks_every_url() {
        let f = fixture();
        let server = server_with_delay(0).await;
        let a = f.registry.register(&format!("{}/a", server.uri())).unwrap();
        let b = f.registry.register(&format!("{}/b", server.uri())).unwrap();

        let limit = Arc::new(Semaphore::new(8));
        join_all(run_round(&f.registry, &f.coordinator, &limit)).await;

        assert_eq!(f.store.get_recent_check_results(a.id, 10).unwrap().len(), 1);
        assert_eq!(f.store.get_recent_check_results(b.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_round_skips_in_flight_url() {
        let f = fixture();
        let server = server_with_delay(300).await;
        let url = f.registry.register(&server.uri()).unwrap();

        let on_demand = {
            let coordinator = f.coordinator.clone();
            let url = url.clone();
            tokio::spawn(async move { coordinator.check_now(&url).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let limit = Arc::new(Semaphore::new(8));
        let handles = run_round(&f.registry, &f.coordinator, &limit);
        assert!(handles.is_empty());

        on_demand.await.unwrap().unwrap();
        assert_eq!(f.store.get_recent_check_results(url.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_round_respects_concurrency_limit() {
        let f = fixture();
        let server = server_with_delay(100).await;
        f.registry.register(&format!("{}/a", server.uri())).unwrap();
        f.registry.register(&format!("{}/b", server.uri())).unwrap();
        f.registry.register(&format!("{}/c", server.uri())).unwrap();

        let limit = Arc::new(Semaphore::new(2));
        let handles = run_round(&f.registry, &f.coordinator, &limit);
        assert_eq!(handles.len(), 2);
        join_all(handles).await;
        assert_eq!(limit.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_started_scheduler_picks_up_new_urls() {
        let f = fixture();
        let server = server_with_delay(0).await;
        let retention = Arc::new(RetentionManager::new(f.store.clone(), 0));
        let scheduler = Scheduler::new(
            f.registry.clone(),
            f.coordinator.clone(),
            Duration::from_millis(100),
            4,
            retention,
        );

        scheduler.start().await;
        let url = f.registry.register(&server.uri()).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.stop().await;

        let checks = f.store.get_recent_check_results(url.id, 100).unwrap();
        assert!(!checks.is_empty());
    }
}
