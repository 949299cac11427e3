//! Retention manager for purging old check results.

use crate::db::Store;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Manager for deleting check results past the retention horizon.
pub struct RetentionManager {
    store: Arc<Store>,
    retention_days: u32,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl RetentionManager {
    /// `retention_days == 0` keeps history forever.
    pub fn new(store: Arc<Store>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the retention manager background task.
    pub async fn start(&self) {
        if self.retention_days == 0 {
            tracing::info!("RetentionManager: Disabled, keeping all history");
            return;
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        {
            let mut stop = self.stop.lock().await;
            if stop.is_some() {
                return; // Already running
            }
            *stop = Some(stop_tx);
        }

        let store = self.store.clone();
        let retention_days = self.retention_days;
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        process_retention(&store, retention_days, Utc::now());
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
    }

    #[cfg(test)]
    async fn is_running(&self) -> bool {
        self.stop.lock().await.is_some()
    }
}

fn process_retention(store: &Store, retention_days: u32, now: DateTime<Utc>) {
    let cutoff = now - ChronoDuration::days(i64::from(retention_days));

    match store.delete_check_results_before(cutoff) {
        Ok(0) => {}
        Ok(removed) => {
            tracing::info!("RetentionManager: Purged {} check results before {}", removed, cutoff);
        }
        Err(e) => {
            tracing::error!("RetentionManager: Failed to purge check results: {}", e);
        }
    }
}
