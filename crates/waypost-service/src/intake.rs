//! Fix intake: newline-delimited JSON from the producer.
//!
//! Each non-empty line on stdin is one JSON object with the same shape as
//! [`Fix`]: `latitude`, `longitude`, `accuracy` required, the sensor
//! extras optional. Malformed lines are reported and skipped; the intake
//! never takes the service down.

use waypost_types::Fix;

/// Intake errors for a single line.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Coordinates out of range: latitude {latitude}, longitude {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}

/// Parse one intake line.
///
/// Returns `Ok(None)` for blank lines and `#` comments so callers can
/// stream files as well as live input.
pub fn parse_fix_line(line: &str) -> Result<Option<Fix>, IntakeError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fix: Fix = serde_json::from_str(line)?;

    if !fix.latitude.is_finite()
        || !fix.longitude.is_finite()
        || fix.latitude.abs() > 90.0
        || fix.longitude.abs() > 180.0
    {
        return Err(IntakeError::OutOfRange {
            latitude: fix.latitude,
            longitude: fix.longitude,
        });
    }

    Ok(Some(fix))
}
