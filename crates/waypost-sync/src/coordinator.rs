//! Sync cycle orchestration.
//!
//! The coordinator owns the two entry points the host runtime ever calls:
//! [`SyncCoordinator::accept_fix`] on the producer path and
//! [`SyncCoordinator::run_cycle`] from the scheduler. Every internal
//! failure is folded into a boolean or a [`CycleOutcome`] at these
//! boundaries; nothing propagates outward as a raised fault.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use waypost_store::{DEFAULT_BATCH_LIMIT, RETENTION_WINDOW_MS, Store};
use waypost_types::{Fix, geo, now_millis};

use crate::client::Transport;
use crate::identity::DeviceIdentity;

/// Terminal outcome of one sync cycle, consumed by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The whole unsent window was delivered (an empty window counts).
    Success,
    /// Recoverable delivery fault; the scheduler reschedules with backoff.
    /// Nothing was marked sent, the same window is re-read next attempt.
    Retry,
    /// Unexpected local failure (storage); not retried with backoff to
    /// avoid a tight failure loop, the next periodic tick picks it up.
    Failure,
}

/// Live cycle state for presentation collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleStatus {
    /// No cycle has run yet.
    #[default]
    Idle,
    /// A cycle is in flight.
    Running,
    /// The most recent cycle finished with this outcome.
    Finished(CycleOutcome),
}

/// Orchestrates filtering, storage, and batched delivery.
pub struct SyncCoordinator {
    store: Arc<Mutex<Store>>,
    identity: Arc<DeviceIdentity>,
    transport: Arc<dyn Transport>,
    min_distance_m: f64,
    batch_limit: usize,
    // Single-flight guard: a second run_cycle while one is in flight is
    // rejected, never interleaved.
    cycle_lock: Mutex<()>,
    status_tx: watch::Sender<CycleStatus>,
}

impl SyncCoordinator {
    /// Create a coordinator with default filter threshold and batch limit.
    pub fn new(
        store: Arc<Mutex<Store>>,
        identity: Arc<DeviceIdentity>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (status_tx, _) = watch::channel(CycleStatus::Idle);
        Self {
            store,
            identity,
            transport,
            min_distance_m: geo::DEFAULT_MIN_DISTANCE_M,
            batch_limit: DEFAULT_BATCH_LIMIT,
            cycle_lock: Mutex::new(()),
            status_tx,
        }
    }

    /// Set the movement-significance threshold in meters.
    #[must_use]
    pub fn min_distance(mut self, meters: f64) -> Self {
        self.min_distance_m = meters;
        self
    }

    /// Set the maximum number of records per delivery batch.
    #[must_use]
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Subscribe to live cycle status updates.
    pub fn subscribe_status(&self) -> watch::Receiver<CycleStatus> {
        self.status_tx.subscribe()
    }

    /// Filter and store a raw fix.
    ///
    /// Returns `true` when the fix was stored. A rejection by the
    /// significance filter is a normal outcome, not an error; storage
    /// failures are logged and also come back as `false`.
    pub async fn accept_fix(&self, fix: Fix) -> bool {
        let store = self.store.lock().await;

        let previous = match store.last_record() {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to read last location: {}", e);
                return false;
            }
        };

        let previous_coords = previous.map(|r| r.coordinates());
        if !geo::is_significant(
            fix.latitude,
            fix.longitude,
            previous_coords,
            self.min_distance_m,
        ) {
            debug!(
                "Fix within {}m of previous location, discarded",
                self.min_distance_m
            );
            return false;
        }

        match store.insert(&fix) {
            Ok(id) => {
                debug!("Stored location {}", id);
                true
            }
            Err(e) => {
                error!("Failed to store location: {}", e);
                false
            }
        }
    }

    /// Run one delivery cycle.
    ///
    /// Pulls the oldest unsent window, delivers it, marks exactly the
    /// delivered ids as sent, and purges delivered records past retention.
    /// A concurrent invocation is rejected and reported as [`CycleOutcome::Retry`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Sync cycle already in flight, rejecting");
            return CycleOutcome::Retry;
        };

        self.status_tx.send_replace(CycleStatus::Running);
        let outcome = self.cycle_inner().await;
        self.status_tx.send_replace(CycleStatus::Finished(outcome));
        outcome
    }

    async fn cycle_inner(&self) -> CycleOutcome {
        let batch = match self.store.lock().await.unsent_batch(self.batch_limit) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to read unsent batch: {}", e);
                return CycleOutcome::Failure;
            }
        };

        if batch.is_empty() {
            debug!("No unsent locations, cycle is a no-op");
            return self.purge_retention().await;
        }

        let device_id = match self.identity.get_or_create().await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to resolve device id: {}", e);
                return CycleOutcome::Failure;
            }
        };

        if let Err(e) = self.transport.send_batch(&device_id, &batch).await {
            if e.is_delivery() {
                warn!("Delivery failed, batch will be retried: {}", e);
                return CycleOutcome::Retry;
            }
            error!("Sync cycle failed: {}", e);
            return CycleOutcome::Failure;
        }

        let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
        match self.store.lock().await.mark_sent(&ids) {
            Ok(_) => info!("Delivered {} locations", ids.len()),
            Err(e) => {
                error!("Failed to mark batch as sent: {}", e);
                return CycleOutcome::Failure;
            }
        }

        self.purge_retention().await
    }

    async fn purge_retention(&self) -> CycleOutcome {
        // Only reached after a successful (possibly empty) delivery
        let cutoff = now_millis() - RETENTION_WINDOW_MS;
        match self.store.lock().await.purge_older_than(cutoff) {
            Ok(_) => CycleOutcome::Success,
            Err(e) => {
                error!("Retention purge failed: {}", e);
                CycleOutcome::Failure
            }
        }
    }
}
