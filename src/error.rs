//! Unified error handling for the track-metrics library.
//!
//! Every fallible operation returns [`Result<T>`]; failures in normalization or
//! metric computation propagate to the lifecycle caller so that no partially
//! computed track is ever published.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Unified error type for track-metrics operations.
#[derive(Debug, Clone, Error)]
pub enum TrackError {
    /// A metric step needed an altitude that normalization did not provide
    #[error("Missing altitude: {message}")]
    MissingAltitude { message: String },

    /// Timestamps within a segment go backwards
    #[error("Invalid time order: {to} is before {from}")]
    InvalidTimeOrder {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    /// Elevation provider could not answer
    #[error("Elevation provider '{provider}' unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Elevation provider answered with the wrong number of altitudes
    #[error("Elevation provider returned {actual} altitudes for {expected} coordinates")]
    ElevationCountMismatch { expected: usize, actual: usize },

    /// Title already used by another track
    #[error("Title '{title}' is already used by another track")]
    DuplicateTitle { title: String },

    /// Computation result superseded by a newer computation or a cancel
    #[error("Computation for track '{slug}' was superseded")]
    StaleResult { slug: String },

    /// No track with this slug in the registry
    #[error("Track '{slug}' not found")]
    TrackNotFound { slug: String },

    /// Raw payload is not a usable GeoJSON document
    #[error("Invalid GeoJSON: {message}")]
    InvalidGeoJson { message: String },

    /// Persistence/storage error
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for track-metrics operations.
pub type Result<T> = std::result::Result<T, TrackError>;

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for TrackError {
    fn from(e: rusqlite::Error) -> Self {
        TrackError::Persistence {
            message: e.to_string(),
        }
    }
}

/// Extension trait for converting Option to TrackError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a track-not-found error.
    fn ok_or_not_found(self, slug: &str) -> Result<T>;

    /// Convert Option to Result with a missing-altitude error.
    fn ok_or_missing_altitude(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, slug: &str) -> Result<T> {
        self.ok_or_else(|| TrackError::TrackNotFound {
            slug: slug.to_string(),
        })
    }

    fn ok_or_missing_altitude(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrackError::MissingAltitude {
            message: message.to_string(),
        })
    }
}
