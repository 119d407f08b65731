//! # Track Metrics
//!
//! Altitude normalization and kinematic metrics for recorded GPS tracks.
//!
//! This library provides:
//! - Point-to-point primitives (haversine distance, elevation delta, slope,
//!   duration, speed, pace)
//! - Pluggable elevation providers for tracks recorded without altitude
//! - A metrics pipeline producing per-point metrics and per-segment statistics
//! - A track registry and lifecycle manager with clone-and-recompute semantics
//!
//! ## Features
//!
//! - **`parallel`** - Compute segment metrics in parallel with rayon
//! - **`http`** - Enable the Open-Elevation HTTP provider
//! - **`persistence`** - Enable the SQLite track store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use track_metrics::{compute_segment_metrics, GeoPoint, MetricsConfig};
//!
//! let segment = vec![
//!     GeoPoint::new(6.8652, 45.8326).with_altitude(1035.0),
//!     GeoPoint::new(6.8660, 45.8330).with_altitude(1042.0),
//!     GeoPoint::new(6.8671, 45.8338).with_altitude(1040.0),
//! ];
//!
//! let metrics = compute_segment_metrics(&segment, &MetricsConfig::default()).unwrap();
//! assert_eq!(metrics.points.len(), 2);
//! println!("D+ {:.0}m over {:.0}m", metrics.global.positive_elevation, metrics.global.distance);
//! ```

use chrono::{DateTime, Utc};
use geo::{Coord, Point};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackError};

// Editor configuration
pub mod config;
pub use config::{EditorConfig, MarkerDefaults, TrackDefaults};

// Point-to-point primitives
pub mod kinematics;

// GeoJSON payload carried by tracks
pub mod geojson;
pub use geojson::{DataPresence, Feature, FeatureCollection, FeatureProperties, Geometry};

// Elevation providers (DEM servers)
pub mod elevation;
pub use elevation::{DemServer, ElevationProvider, ElevationProviders, ElevationSource, TerrainGrid};

// Open-Elevation HTTP provider
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{OpenElevationClient, OpenElevationConfig};

// Altitude normalization
pub mod normalizer;
pub use normalizer::{normalize_track, AltitudeAction};

// Metrics pipeline
pub mod metrics;
pub use metrics::{
    compute_segment_metrics, compute_track_metrics, GlobalStats, MetricsConfig, PointMetric,
    SegmentMetrics, TimeOrderPolicy,
};

// Track entity
pub mod track;
pub use track::{Marker, MarkerKind, MarkerRef, Markers, Track, TrackOptions, TrackOverrides};

// Active track registry and editor events
pub mod registry;
pub use registry::{ComputeTicket, EditorEvent, EventLog, EventSink, TrackRegistry};

// Persistence contract
pub mod store;
pub use store::{MemoryTrackStore, StoreKind, TrackStore};

// SQLite track store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteTrackStore;

// Track lifecycle (compute, clone, remove, settings)
pub mod lifecycle;
pub use lifecycle::{EditorContext, RemoveOutcome};

// ============================================================================
// Core Types
// ============================================================================

/// A recorded geographic point.
///
/// Longitude and latitude are in degrees, altitude in meters.
///
/// # Example
/// ```
/// use track_metrics::GeoPoint;
/// let point = GeoPoint::new(-0.1278, 51.5074).with_altitude(11.0); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl GeoPoint {
    /// Create a 2D point without time.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: None,
            timestamp: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Horizontal position as a `geo` point (x = longitude, y = latitude).
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Horizontal position as a `geo` coordinate.
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }
}

/// One continuous run of points within a track.
pub type Segment = Vec<GeoPoint>;
