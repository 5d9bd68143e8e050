//! Data models for stored records.

use serde::{Deserialize, Serialize};

use waypost_types::Fix;

/// A location record persisted in the queue.
///
/// Records are immutable once written, except for the `sent` flag, which
/// only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Store-assigned surrogate key, unique and immutable.
    pub id: i64,
    /// Latitude in signed degrees.
    pub latitude: f64,
    /// Longitude in signed degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy: f64,
    /// Altitude in meters, if the sensor reported it.
    pub altitude: Option<f64>,
    /// Ground speed in meters per second, if reported.
    pub speed: Option<f64>,
    /// Bearing in degrees, if reported.
    pub bearing: Option<f64>,
    /// Capture time in milliseconds since the Unix epoch; the ordering key.
    pub timestamp: i64,
    /// Free-text source label.
    pub provider: Option<String>,
    /// Whether a delivery has been positively acknowledged.
    pub sent: bool,
}

impl LocationRecord {
    /// The record's coordinate pair.
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Convert back to a raw fix (used when re-feeding a record through
    /// producer-facing code paths).
    pub fn to_fix(&self) -> Fix {
        Fix {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            altitude: self.altitude,
            speed: self.speed,
            bearing: self.bearing,
            provider: self.provider.clone(),
            timestamp: Some(self.timestamp),
        }
    }
}
