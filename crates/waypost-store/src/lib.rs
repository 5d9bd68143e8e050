//! Durable local persistence for Waypost location telemetry.
//!
//! This crate provides the SQLite-backed queue at the center of the
//! pipeline: fixes are appended with an unsent status, delivered in
//! oldest-first batches, marked sent only on confirmed delivery, and
//! purged once they age past the retention window.
//!
//! # Features
//!
//! - Append-only location queue with sent/unsent status
//! - Atomic batch insert
//! - Live unsent counter via a watch channel
//! - Retention purge that never touches undelivered records
//! - Durable key-value settings (device id, tracking flag)
//!
//! # Example
//!
//! ```no_run
//! use waypost_store::{Store, DEFAULT_BATCH_LIMIT};
//! use waypost_types::Fix;
//!
//! let store = Store::open_default()?;
//! store.insert(&Fix::new(59.437, 24.7536, 8.0))?;
//! let batch = store.unsent_batch(DEFAULT_BATCH_LIMIT)?;
//! # Ok::<(), waypost_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::LocationRecord;
pub use store::{DEFAULT_BATCH_LIMIT, RETENTION_WINDOW_MS, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/waypost/telemetry.db`
/// - macOS: `~/Library/Application Support/waypost/telemetry.db`
/// - Windows: `C:\Users\<user>\AppData\Local\waypost\telemetry.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("waypost")
        .join("telemetry.db")
}
