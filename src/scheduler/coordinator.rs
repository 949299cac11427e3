//! Per-URL check coordination.
//!
//! At most one check per URL is in flight. The first caller starts a detached
//! task that probes, stores the result and publishes it on a watch channel.
//! On-demand callers arriving meanwhile wait for that same result; scheduled
//! callers skip.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::db::{CheckResult, DbError, MonitoredUrl, Store};
use crate::error::{Error, Result};
use crate::probe::{HttpProber, ProbeOutcome};

type CheckOutcome = std::result::Result<CheckResult, Arc<DbError>>;
type OutcomeRx = watch::Receiver<Option<CheckOutcome>>;
type InFlight = Arc<Mutex<HashMap<i64, OutcomeRx>>>;

enum Begin {
    Started(OutcomeRx),
    Joined(OutcomeRx),
}

impl Begin {
    fn into_receiver(self) -> OutcomeRx {
        match self {
            Begin::Started(rx) | Begin::Joined(rx) => rx,
        }
    }
}

/// Runs checks and keeps them from overlapping per URL.
pub struct CheckCoordinator {
    store: Arc<Store>,
    prober: HttpProber,
    in_flight: InFlight,
}

impl CheckCoordinator {
    pub fn new(store: Arc<Store>, prober: HttpProber) -> Self {
        Self {
            store,
            prober,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check `url` now, or wait for the check already running for it.
    pub async fn check_now(&self, url: &MonitoredUrl) -> Result<CheckResult> {
        let rx = self.begin(url).into_receiver();
        wait_for_outcome(rx).await
    }

    /// Check every URL in parallel. Results come back in input order, and
    /// only once all of them have finished.
    pub async fn check_many(&self, urls: &[MonitoredUrl]) -> Vec<Result<CheckResult>> {
        let pending: Vec<OutcomeRx> = urls
            .iter()
            .map(|url| self.begin(url).into_receiver())
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for rx in pending {
            results.push(wait_for_outcome(rx).await);
        }
        results
    }

    /// Scheduled check: returns `None` without probing if `url` is already
    /// being checked.
    pub async fn check_scheduled(&self, url: &MonitoredUrl) -> Option<Result<CheckResult>> {
        match self.begin(url) {
            Begin::Joined(_) => None,
            Begin::Started(rx) => Some(wait_for_outcome(rx).await),
        }
    }

    pub fn is_in_flight(&self, url_id: i64) -> bool {
        lock(&self.in_flight).contains_key(&url_id)
    }

    fn begin(&self, url: &MonitoredUrl) -> Begin {
        let mut in_flight = lock(&self.in_flight);
        if let Some(rx) = in_flight.get(&url.id) {
            return Begin::Joined(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(url.id, rx.clone());
        drop(in_flight);

        tokio::spawn(run_check(
            self.store.clone(),
            self.prober.clone(),
            self.in_flight.clone(),
            url.clone(),
            tx,
        ));

        Begin::Started(rx)
    }
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<i64, OutcomeRx>> {
    // The map holds no invariant a panicking holder could break halfway.
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_check(
    store: Arc<Store>,
    prober: HttpProber,
    in_flight: InFlight,
    url: MonitoredUrl,
    tx: watch::Sender<Option<CheckOutcome>>,
) {
    let outcome = match prober.execute(&url.url).await {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!("Check of {} could not run: {}", url.url, e);
            ProbeOutcome::unreachable(Utc::now())
        }
    };

    tracing::debug!(
        "Checked {}: {:?} code={:?} time_ms={:?}",
        url.url,
        outcome.status,
        outcome.status_code,
        outcome.response_time_ms
    );

    let stored = store.add_check_result(outcome.into_check(url.id));
    match &stored {
        Ok(_) => {}
        Err(DbError::NotFound) => {
            tracing::debug!("{} was removed mid-check, dropping result", url.url);
        }
        Err(e) => {
            tracing::error!("Failed to store check result for {}: {}", url.url, e);
        }
    }

    lock(&in_flight).remove(&url.id);
    let _ = tx.send(Some(stored.map_err(Arc::new)));
}

async fn wait_for_outcome(mut rx: OutcomeRx) -> Result<CheckResult> {
    let outcome = {
        let published = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Aborted)?;
        (*published).clone()
    };

    match outcome {
        Some(Ok(result)) => Ok(result),
        Some(Err(e)) if matches!(*e, DbError::NotFound) => Err(Error::NotFound),
        Some(Err(e)) => Err(Error::Persist(e)),
        None => Err(Error::Aborted),
    }
}
