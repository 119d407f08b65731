//! Point-to-point geometry and kinematics.
//!
//! All horizontal distances use the haversine formula on the `geo` mean Earth
//! radius, so every metric in the crate shares one spherical model.

use chrono::{DateTime, TimeDelta, Utc};
use geo::{Distance, Haversine};

use crate::{GeoPoint, OptionExt, Result, TrackError};

/// Great-circle distance between two points in meters.
///
/// Never negative; 0 for coincident points.
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d = Haversine::distance(a.to_point(), b.to_point());
    if d.is_finite() && d > 0.0 {
        d
    } else {
        0.0
    }
}

/// Signed altitude change from `a` to `b` in meters.
pub fn elevation(a: &GeoPoint, b: &GeoPoint) -> Result<f64> {
    let from = a.altitude.ok_or_missing_altitude("start point has no altitude")?;
    let to = b.altitude.ok_or_missing_altitude("end point has no altitude")?;
    Ok(to - from)
}

/// Elapsed seconds from `t0` to `t1` (microsecond precision).
pub fn duration(t0: &DateTime<Utc>, t1: &DateTime<Utc>) -> Result<f64> {
    let delta = *t1 - *t0;
    if delta < TimeDelta::zero() {
        return Err(TrackError::InvalidTimeOrder {
            from: *t0,
            to: *t1,
        });
    }
    Ok(match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    })
}

/// Speed in m/s; `None` when no time elapsed.
pub fn speed(distance: f64, duration: f64) -> Option<f64> {
    if duration == 0.0 {
        return None;
    }
    let v = distance / duration;
    v.is_finite().then_some(v)
}

/// Pace in s/m; `None` when no time elapsed or no distance covered.
pub fn pace(distance: f64, duration: f64) -> Option<f64> {
    if duration == 0.0 || distance == 0.0 {
        return None;
    }
    let p = duration / distance;
    p.is_finite().then_some(p)
}

/// Slope as a percentage; `None` for a zero horizontal distance.
pub fn slope(elevation: f64, distance: f64) -> Option<f64> {
    if distance == 0.0 {
        return None;
    }
    let s = elevation / distance * 100.0;
    s.is_finite().then_some(s)
}
