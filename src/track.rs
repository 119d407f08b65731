//! Track entity.
//!
//! A [`Track`] is a value: once published in the registry it is never edited
//! in place. Settings changes go through [`Track::clone_with`] and a full
//! recomputation (see `lifecycle`).

use serde::{Deserialize, Serialize};

use crate::{
    DemServer, FeatureCollection, MarkerDefaults, Result, Segment, SegmentMetrics, TrackDefaults,
    TrackError,
};

// ============================================================================
// Markers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub visible: bool,
    pub color: String,
}

/// Start and stop markers drawn at the track ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Markers {
    pub start: Marker,
    pub stop: Marker,
}

impl Markers {
    pub fn from_defaults(defaults: &MarkerDefaults) -> Self {
        Self {
            start: Marker {
                visible: true,
                color: defaults.start_color.clone(),
            },
            stop: Marker {
                visible: true,
                color: defaults.stop_color.clone(),
            },
        }
    }

    pub fn get(&self, kind: MarkerKind) -> &Marker {
        match kind {
            MarkerKind::Start => &self.start,
            MarkerKind::Stop => &self.stop,
        }
    }

    pub fn get_mut(&mut self, kind: MarkerKind) -> &mut Marker {
        match kind {
            MarkerKind::Start => &mut self.start,
            MarkerKind::Stop => &mut self.stop,
        }
    }
}

/// Track and marker named by a picked entity id `marker#<track>#<marker>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRef {
    pub track: String,
    pub marker: String,
}

impl MarkerRef {
    pub fn parse(entity_id: &str) -> Option<Self> {
        let parts: Vec<&str> = entity_id.split('#').collect();
        match parts.as_slice() {
            ["marker", track, marker] => Some(Self {
                track: track.to_string(),
                marker: marker.to_string(),
            }),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<MarkerKind> {
        match self.marker.as_str() {
            "start" => Some(MarkerKind::Start),
            "stop" => Some(MarkerKind::Stop),
            _ => None,
        }
    }
}

// ============================================================================
// Track
// ============================================================================

/// Optional settings when creating a track.
#[derive(Debug, Clone, Default)]
pub struct TrackOptions {
    pub slug: Option<String>,
    pub parent: Option<String>,
    pub visible: Option<bool>,
    pub description: Option<String>,
    pub dem_server: Option<DemServer>,
}

/// Identity and settings applied when cloning a track.
///
/// `None` keeps the source track's value.
#[derive(Debug, Clone, Default)]
pub struct TrackOverrides {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub markers: Option<Markers>,
    pub color: Option<String>,
    pub thickness: Option<u8>,
    pub visible: Option<bool>,
    pub dem_server: Option<DemServer>,
}

impl TrackOverrides {
    /// Overrides carrying the track's own slug, title and markers.
    pub fn keep_identity(track: &Track) -> Self {
        Self {
            slug: Some(track.slug.clone()),
            title: Some(track.title.clone()),
            markers: Some(track.markers.clone()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Unique id, stable for the track's lifetime
    pub slug: String,
    /// Unique among the active tracks
    pub title: String,
    pub color: String,
    pub thickness: u8,
    pub visible: bool,
    pub description: Option<String>,
    #[serde(rename = "geoJson")]
    pub geometry: FeatureCollection,
    /// Recorded (not simulated) altitude on every point
    pub has_altitude: bool,
    pub has_time: bool,
    #[serde(rename = "DEMServer")]
    pub dem_server: DemServer,
    /// Index-aligned with the geometry segments
    pub metrics: Vec<SegmentMetrics>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub markers: Markers,
}

/// Lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "track".to_string()
    } else {
        slug
    }
}

impl Track {
    /// Create an uncomputed track from an imported GeoJSON payload.
    ///
    /// Altitude and time presence and the description are read from the
    /// payload here, once.
    pub fn from_geojson(
        title: &str,
        geometry: FeatureCollection,
        options: TrackOptions,
        defaults: &TrackDefaults,
    ) -> Self {
        let presence = geometry.inspect();
        let description = options.description.or_else(|| geometry.description());

        Self {
            slug: options.slug.unwrap_or_else(|| slugify(title)),
            title: title.to_string(),
            color: defaults.color.clone(),
            thickness: defaults.thickness,
            visible: options.visible.unwrap_or(true),
            description,
            geometry,
            has_altitude: presence.has_altitude,
            has_time: presence.has_time,
            dem_server: options.dem_server.unwrap_or_default(),
            metrics: Vec::new(),
            parent: options.parent,
            children: Vec::new(),
            markers: Markers::from_defaults(&defaults.markers),
        }
    }

    /// A fresh, uncomputed copy with identity and settings from `overrides`.
    pub fn clone_with(&self, overrides: TrackOverrides) -> Self {
        Self {
            slug: overrides.slug.unwrap_or_else(|| self.slug.clone()),
            title: overrides.title.unwrap_or_else(|| self.title.clone()),
            color: overrides.color.unwrap_or_else(|| self.color.clone()),
            thickness: overrides.thickness.unwrap_or(self.thickness),
            visible: overrides.visible.unwrap_or(self.visible),
            description: self.description.clone(),
            geometry: self.geometry.clone(),
            has_altitude: self.has_altitude,
            has_time: self.has_time,
            dem_server: overrides.dem_server.unwrap_or(self.dem_server),
            metrics: Vec::new(),
            parent: self.parent.clone(),
            children: self.children.clone(),
            markers: overrides.markers.unwrap_or_else(|| self.markers.clone()),
        }
    }

    /// Point sequences of every segment.
    pub fn segments(&self) -> Vec<Segment> {
        self.geometry.segments()
    }

    /// Whether metrics exist for every segment.
    pub fn is_computed(&self) -> bool {
        self.metrics.len() == self.geometry.segment_count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TrackError::Persistence {
            message: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TrackError::Persistence {
            message: e.to_string(),
        })
    }
}
