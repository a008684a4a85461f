//! Modified Julian Date conversions.

use chrono::{DateTime, Utc};

/// MJD of the Unix epoch (1970-01-01T00:00:00Z).
pub const MJD_UNIX_EPOCH: f64 = 40_587.0;

const SECONDS_PER_DAY: f64 = 86_400.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// UTC instant of `mjd`, to the millisecond. `None` when out of range.
pub fn mjd_to_datetime(mjd: f64) -> Option<DateTime<Utc>> {
    let millis = ((mjd - MJD_UNIX_EPOCH) * MILLIS_PER_DAY).round();
    if !millis.is_finite() || millis.abs() > 8.0e15 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

pub fn datetime_to_mjd(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / MILLIS_PER_DAY + MJD_UNIX_EPOCH
}

/// MJD of a mission timestamp given the mission's reference epoch.
pub fn mission_time_to_mjd(seconds: f64, mjd_ref: f64) -> f64 {
    mjd_ref + seconds / SECONDS_PER_DAY
}
