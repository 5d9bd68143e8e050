//! Offline-durable delivery layer for Waypost location telemetry.
//!
//! This crate contains everything between the durable queue and the remote
//! collector:
//!
//! - [`DeviceIdentity`] - lazily-created, persisted device identifier
//! - [`SyncClient`] - HTTP delivery client behind the [`Transport`] seam
//! - [`SyncCoordinator`] - the `accept_fix` / `run_cycle` entry points
//! - [`SyncScheduler`] - periodic + on-demand scheduling with network
//!   gating, exponential backoff, and cancellation
//!
//! The producer and the host runtime only ever see booleans and
//! [`CycleOutcome`] values; no failure escapes these boundaries as a
//! raised fault.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use waypost_store::Store;
//! use waypost_sync::{
//!     AlwaysOnline, DeviceIdentity, StoreSettings, SyncClient, SyncCoordinator, SyncScheduler,
//! };
//!
//! # async fn example() -> waypost_sync::Result<()> {
//! let store = Arc::new(Mutex::new(Store::open_default()?));
//! let settings = Arc::new(StoreSettings::new(Arc::clone(&store)));
//! let identity = Arc::new(DeviceIdentity::new(settings));
//! let client = Arc::new(SyncClient::new("https://collector.example.com")?);
//!
//! let coordinator = Arc::new(SyncCoordinator::new(store, identity, client));
//! let scheduler = SyncScheduler::new(Arc::clone(&coordinator), Arc::new(AlwaysOnline));
//! scheduler.schedule_periodic().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod coordinator;
mod error;
mod identity;
mod scheduler;
mod settings;

pub use client::{BatchRequest, LocationPayload, SingleRequest, SyncClient, Transport};
pub use coordinator::{CycleOutcome, CycleStatus, SyncCoordinator};
pub use error::{Error, Result};
pub use identity::{DeviceIdentity, HardwareId, INVALID_HARDWARE_ID, MachineId};
pub use scheduler::{
    AlwaysOnline, BackoffConfig, DEFAULT_SYNC_INTERVAL, NetworkMonitor, SyncScheduler,
};
pub use settings::{
    KEY_DEVICE_ID, KEY_TRACKING_ENABLED, MemorySettings, Settings, StoreSettings,
    set_tracking_enabled, tracking_enabled,
};
