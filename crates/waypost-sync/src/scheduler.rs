//! Background delivery scheduling.
//!
//! Realizes the scheduling contract around the coordinator: a periodic
//! cycle every 15 minutes, an on-demand one-shot whose pending request is
//! replaced rather than queued, network-availability gating before every
//! attempt, exponential backoff after retryable outcomes, and a
//! cancellation path that can never leave a batch half-marked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::{CycleOutcome, SyncCoordinator};

/// Default periodic sync interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Network availability gate consulted before each delivery attempt.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Whether a network path to the collector currently exists.
    async fn is_online(&self) -> bool;
}

/// Assumes a network path always exists.
#[derive(Debug, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl NetworkMonitor for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Exponential backoff between retry attempts.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 = double each time).
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
    /// Retries attempted within one tick before giving up until the next.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(5 * 60),
            multiplier: 2.0,
            jitter: true,
            max_attempts: 6,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Add up to 25% jitter
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Drives periodic and on-demand sync cycles.
///
/// There is one well-known work identity per scheduler: requesting a
/// one-shot while another is pending replaces it, and starting the
/// periodic loop twice replaces the first loop. [`SyncScheduler::cancel`]
/// stops everything; a cycle cancelled mid-delivery is dropped before
/// `mark_sent` runs, which is indistinguishable from a retryable failure.
pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    network: Arc<dyn NetworkMonitor>,
    backoff: BackoffConfig,
    interval: Duration,
    cancel: CancellationToken,
    once: Mutex<Option<JoinHandle<()>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Create a scheduler with the default interval and backoff.
    pub fn new(coordinator: Arc<SyncCoordinator>, network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            coordinator,
            network,
            backoff: BackoffConfig::default(),
            interval: DEFAULT_SYNC_INTERVAL,
            cancel: CancellationToken::new(),
            once: Mutex::new(None),
            periodic: Mutex::new(None),
        }
    }

    /// Set the periodic interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the backoff configuration.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Request an immediate sync cycle.
    ///
    /// A pending not-yet-finished request is replaced, never queued behind.
    pub async fn schedule_once(&self) {
        let mut slot = self.once.lock().await;
        if let Some(handle) = slot.take()
            && !handle.is_finished()
        {
            handle.abort();
            debug!("Replaced pending on-demand sync request");
        }

        let coordinator = Arc::clone(&self.coordinator);
        let network = Arc::clone(&self.network);
        let cancel = self.cancel.clone();
        *slot = Some(tokio::spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            if !network.is_online().await {
                debug!("No network path, skipping on-demand sync");
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => debug!("On-demand sync cancelled mid-cycle"),
                outcome = coordinator.run_cycle() => {
                    debug!("On-demand sync finished: {:?}", outcome);
                }
            }
        }));
    }

    /// Start the periodic delivery loop.
    ///
    /// The first cycle runs immediately; later ones every interval. A
    /// second call replaces the running loop.
    pub async fn schedule_periodic(&self) {
        let mut slot = self.periodic.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
            debug!("Replaced running periodic sync loop");
        }

        let coordinator = Arc::clone(&self.coordinator);
        let network = Arc::clone(&self.network);
        let backoff = self.backoff.clone();
        let interval = self.interval;
        let cancel = self.cancel.clone();
        info!("Scheduling periodic sync every {:?}", interval);
        *slot = Some(tokio::spawn(run_periodic(
            coordinator,
            network,
            backoff,
            interval,
            cancel,
        )));
    }

    /// Stop all scheduled work.
    ///
    /// In-flight cycles are dropped at their next await point; `mark_sent`
    /// either ran completely or not at all.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.once.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.periodic.lock().await.take() {
            handle.abort();
        }
        info!("Sync scheduling cancelled");
    }

    /// Whether the scheduler has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn run_periodic(
    coordinator: Arc<SyncCoordinator>,
    network: Arc<dyn NetworkMonitor>,
    backoff: BackoffConfig,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Periodic sync loop stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        if !network.is_online().await {
            debug!("No network path, skipping periodic sync");
            continue;
        }

        run_with_backoff(&coordinator, &network, &backoff, &cancel).await;
    }
}

/// Run one cycle, re-attempting retryable outcomes with exponential
/// backoff until success, hard failure, cancellation, or the attempt cap.
async fn run_with_backoff(
    coordinator: &SyncCoordinator,
    network: &Arc<dyn NetworkMonitor>,
    backoff: &BackoffConfig,
    cancel: &CancellationToken,
) {
    for attempt in 0..=backoff.max_attempts {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = coordinator.run_cycle() => outcome,
        };

        match outcome {
            CycleOutcome::Success => return,
            CycleOutcome::Failure => {
                // Deliberately not backed off: a hard local failure would
                // just loop tightly. The next periodic tick retries.
                warn!("Sync cycle failed, waiting for next periodic tick");
                return;
            }
            CycleOutcome::Retry => {
                if attempt == backoff.max_attempts {
                    warn!(
                        "Sync still failing after {} retries, waiting for next tick",
                        attempt
                    );
                    return;
                }
                let delay = backoff.delay_for_attempt(attempt);
                debug!("Sync retry in {:?}", delay);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if !network.is_online().await {
                    debug!("Network lost during backoff, waiting for next tick");
                    return;
                }
            }
        }
    }
}
