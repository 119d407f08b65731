//! Editor configuration.
//!
//! Loaded from a JSON document; every field has a default so a partial (or
//! empty) document is valid.
//!
//! ```json
//! {
//!   "track": { "color": "#fcb040", "thickness": 3 },
//!   "defaultDemServer": "internal",
//!   "metrics": { "timeOrder": "clamp" },
//!   "elevationCacheCapacity": 10000
//! }
//! ```

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{DemServer, MetricsConfig, Result, TerrainGrid, TrackError};

#[cfg(feature = "http")]
use crate::OpenElevationConfig;

/// Allowed track line widths, in pixels.
pub const THICKNESS_RANGE: RangeInclusive<u8> = 1..=10;

/// Default look of a newly imported track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackDefaults {
    pub color: String,
    /// Line width in pixels (1-10)
    pub thickness: u8,
    pub markers: MarkerDefaults,
}

impl Default for TrackDefaults {
    fn default() -> Self {
        Self {
            color: "#fcb040".to_string(),
            thickness: 3,
            markers: MarkerDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerDefaults {
    pub start_color: String,
    pub stop_color: String,
}

impl Default for MarkerDefaults {
    fn default() -> Self {
        Self {
            start_color: "#00ff00".to_string(),
            stop_color: "#ff0000".to_string(),
        }
    }
}

/// Top-level configuration for the track editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    pub track: TrackDefaults,

    /// DEM server assigned to imported tracks that have no altitude.
    /// Default: none (no simulation)
    pub default_dem_server: DemServer,

    pub metrics: MetricsConfig,

    /// Maximum number of cached altitude lookups.
    /// Default: 10000
    pub elevation_cache_capacity: usize,

    /// Terrain grid backing the internal DEM server.
    pub terrain: Option<TerrainGrid>,

    #[cfg(feature = "http")]
    pub open_elevation: Option<OpenElevationConfig>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            track: TrackDefaults::default(),
            default_dem_server: DemServer::None,
            metrics: MetricsConfig::default(),
            elevation_cache_capacity: 10_000,
            terrain: None,
            #[cfg(feature = "http")]
            open_elevation: None,
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| TrackError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| TrackError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if !THICKNESS_RANGE.contains(&self.track.thickness) {
            return Err(TrackError::Config {
                message: format!("track thickness {} outside 1-10", self.track.thickness),
            });
        }
        if let Some(grid) = &self.terrain {
            grid.validate()?;
        }
        Ok(())
    }
}
