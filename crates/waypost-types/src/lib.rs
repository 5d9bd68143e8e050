//! Platform-agnostic types for the Waypost telemetry pipeline.
//!
//! This crate provides the shared vocabulary used by the store, the sync
//! layer, and host adapters: the raw [`Fix`] sample and the pure geo math
//! that decides whether a fix represents significant movement.
//!
//! # Example
//!
//! ```
//! use waypost_types::{Fix, geo};
//!
//! let fix = Fix::new(59.4370, 24.7536, 8.0);
//! assert!(geo::is_significant(fix.latitude, fix.longitude, None, 10.0));
//! ```

pub mod fix;
pub mod geo;

pub use fix::Fix;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Storage and wire timestamps are millisecond integers throughout the
/// pipeline; this is the single place the clock is read.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
