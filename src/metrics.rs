//! # Metrics Pipeline
//!
//! Per-point metrics and per-segment statistics for a normalized track.
//!
//! For every segment independently:
//! 1. One [`PointMetric`] per consecutive pair of points: distance always,
//!    elevation and slope when the segment has altitude, duration, speed and
//!    pace when both points are timestamped.
//! 2. One [`GlobalStats`] reducing those metrics: heights, climb and descent,
//!    max slope, totals, and speed/pace figures when the whole segment is timed.
//!
//! Segments with fewer than two points produce no point metrics and zeroed
//! statistics rather than an error.

use log::warn;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::kinematics;
use crate::{GeoPoint, Result, Segment, TrackError};

/// What to do when a timestamp is earlier than the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOrderPolicy {
    /// Fail the computation with `InvalidTimeOrder`
    #[default]
    Reject,
    /// Treat the pair as instantaneous (duration 0, no speed or pace)
    Clamp,
}

/// Configuration for the metrics pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsConfig {
    /// Handling of non-monotonic timestamps. Default: reject
    pub time_order: TimeOrderPolicy,
}

/// Metrics between one point and the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointMetric {
    /// Horizontal distance in meters
    pub distance: f64,
    /// Signed altitude change in meters
    pub elevation: Option<f64>,
    /// Elevation over distance, in percent
    pub slope: Option<f64>,
    /// Seconds
    pub duration: Option<f64>,
    /// m/s
    pub speed: Option<f64>,
    /// s/m
    pub pace: Option<f64>,
}

/// Aggregate statistics of one segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub max_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub max_pace: Option<f64>,
    pub max_slope: Option<f64>,
    /// Total climb (sum of positive elevation deltas)
    pub positive_elevation: f64,
    /// Total descent (sum of negative elevation deltas, <= 0)
    pub negative_elevation: f64,
    pub duration: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    pub points: Vec<PointMetric>,
    pub global: GlobalStats,
}

/// Whether the segment's altitude can be used: all points or none.
fn segment_has_altitude(points: &[GeoPoint]) -> Result<bool> {
    let with_altitude = points.iter().filter(|p| p.altitude.is_some()).count();
    if with_altitude == points.len() {
        Ok(!points.is_empty())
    } else if with_altitude == 0 {
        Ok(false)
    } else {
        Err(TrackError::MissingAltitude {
            message: format!(
                "{} of {} points have no altitude",
                points.len() - with_altitude,
                points.len()
            ),
        })
    }
}

fn pair_metric(
    prev: &GeoPoint,
    current: &GeoPoint,
    with_altitude: bool,
    config: &MetricsConfig,
) -> Result<PointMetric> {
    let distance = kinematics::distance(prev, current);
    let mut metric = PointMetric {
        distance,
        ..Default::default()
    };

    if let (Some(t0), Some(t1)) = (&prev.timestamp, &current.timestamp) {
        let duration = match kinematics::duration(t0, t1) {
            Ok(d) => d,
            Err(e) if config.time_order == TimeOrderPolicy::Clamp => {
                warn!("[Metrics] Clamping: {}", e);
                0.0
            }
            Err(e) => return Err(e),
        };
        metric.duration = Some(duration);
        metric.speed = kinematics::speed(distance, duration);
        metric.pace = kinematics::pace(distance, duration);
    }

    if with_altitude {
        let elevation = kinematics::elevation(prev, current)?;
        metric.elevation = Some(elevation);
        metric.slope = kinematics::slope(elevation, distance);
    }

    Ok(metric)
}

/// One metric per consecutive pair; empty for fewer than two points.
pub fn compute_point_metrics(
    points: &[GeoPoint],
    config: &MetricsConfig,
) -> Result<Vec<PointMetric>> {
    if points.len() < 2 {
        return Ok(Vec::new());
    }
    let with_altitude = segment_has_altitude(points)?;
    points
        .windows(2)
        .map(|pair| pair_metric(&pair[0], &pair[1], with_altitude, config))
        .collect()
}

fn max_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
}

fn min_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.min(v))))
}

/// Reduce point metrics into segment statistics.
///
/// `points` are the raw points (heights are taken from them, not from deltas).
pub fn compute_global_stats(points: &[GeoPoint], metrics: &[PointMetric]) -> GlobalStats {
    let mut global = GlobalStats::default();

    if !metrics.is_empty() {
        global.min_height = min_of(points.iter().filter_map(|p| p.altitude));
        global.max_height = max_of(points.iter().filter_map(|p| p.altitude));
    }

    // Speed and pace figures only describe fully timed segments
    let fully_timed = !metrics.is_empty() && metrics.iter().all(|m| m.duration.is_some());
    if fully_timed {
        // Stationary samples (speed 0) are left out
        let moving: Vec<f64> = metrics
            .iter()
            .filter_map(|m| m.speed)
            .filter(|&s| s != 0.0)
            .collect();
        global.max_speed = max_of(moving.iter().copied());
        if !moving.is_empty() {
            global.average_speed = Some(moving.iter().sum::<f64>() / moving.len() as f64);
        }
        global.max_pace = max_of(metrics.iter().filter_map(|m| m.pace).filter(|&p| p != 0.0));
    }

    global.max_slope = max_of(metrics.iter().filter_map(|m| m.slope));

    for m in metrics {
        match m.elevation {
            Some(e) if e > 0.0 => global.positive_elevation += e,
            Some(e) if e < 0.0 => global.negative_elevation += e,
            _ => {}
        }
        global.duration += m.duration.unwrap_or(0.0);
        global.distance += m.distance;
    }

    global
}

/// Point metrics and statistics of one segment.
pub fn compute_segment_metrics(
    points: &[GeoPoint],
    config: &MetricsConfig,
) -> Result<SegmentMetrics> {
    let metrics = compute_point_metrics(points, config)?;
    let global = compute_global_stats(points, &metrics);
    Ok(SegmentMetrics {
        points: metrics,
        global,
    })
}

/// Metrics of every segment, index-aligned; fails with the error of the
/// lowest-indexed failing segment.
pub fn compute_track_metrics(
    segments: &[Segment],
    config: &MetricsConfig,
) -> Result<Vec<SegmentMetrics>> {
    // rayon short-circuits on whichever error it meets first, so results are
    // gathered in full and reduced in segment order
    #[cfg(feature = "parallel")]
    let results: Vec<Result<SegmentMetrics>> = segments
        .par_iter()
        .map(|segment| compute_segment_metrics(segment, config))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let results = segments
        .iter()
        .map(|segment| compute_segment_metrics(segment, config));

    results.into_iter().collect()
}
