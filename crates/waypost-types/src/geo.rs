//! Great-circle distance and the movement-significance filter.
//!
//! Everything here is pure and deterministic: the filter never touches the
//! store or the clock, so its callers can be tested with plain coordinates.

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default minimum movement, in meters, for a fix to be worth storing.
pub const DEFAULT_MIN_DISTANCE_M: f64 = 10.0;

/// Great-circle distance between two coordinate pairs in meters.
///
/// Uses the haversine formula in its atan2 form, which is numerically safe
/// for identical, antipodal, and pole-adjacent coordinates.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Decide whether a new fix represents significant movement.
///
/// Returns `true` when there is no previous fix (the first sample is always
/// accepted), or when the distance from the previous coordinates meets or
/// exceeds `min_distance_m`.
pub fn is_significant(
    latitude: f64,
    longitude: f64,
    previous: Option<(f64, f64)>,
    min_distance_m: f64,
) -> bool {
    match previous {
        None => true,
        Some((prev_lat, prev_lon)) => {
            haversine_distance(latitude, longitude, prev_lat, prev_lon) >= min_distance_m
        }
    }
}
