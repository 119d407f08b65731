//! GeoJSON payload carried by a track.
//!
//! Only the subset produced by GPX/KML conversion is modelled: a
//! FeatureCollection of `Point`, `LineString` and `MultiLineString` features.
//! Positions are `[longitude, latitude]` or `[longitude, latitude, altitude]`,
//! and per-point times live in the `coordTimes` property, index-aligned with
//! the coordinates.
//!
//! Every line of every line feature is one segment; segment indices are
//! assigned in document order, flattening `MultiLineString` lines.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{GeoPoint, Result, Segment, TrackError};

/// `[longitude, latitude]` or `[longitude, latitude, altitude]`.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
}

/// Per-point ISO 8601 times, shaped like the geometry coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordTimes {
    Line(Vec<Option<String>>),
    MultiLine(Vec<Vec<Option<String>>>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coord_times: Option<CoordTimes>,
    /// Anything else the converter wrote; preserved untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    #[serde(default, deserialize_with = "default_on_null")]
    pub properties: FeatureProperties,
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

/// What the raw recording carries besides horizontal positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataPresence {
    pub has_altitude: bool,
    pub has_time: bool,
}

fn default_on_null<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!("[GeoJson] Ignoring unparsable time '{}': {}", raw, e);
            None
        }
    }
}

impl Feature {
    /// Lines of this feature together with their per-point times.
    fn lines_with_times(&self) -> Vec<(&Vec<Position>, Option<&Vec<Option<String>>>)> {
        let times = self.properties.coord_times.as_ref();
        match &self.geometry {
            Some(Geometry::LineString { coordinates }) => {
                let t = match times {
                    Some(CoordTimes::Line(t)) => Some(t),
                    _ => None,
                };
                vec![(coordinates, t)]
            }
            Some(Geometry::MultiLineString { coordinates }) => coordinates
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let t = match times {
                        Some(CoordTimes::MultiLine(t)) => t.get(i),
                        _ => None,
                    };
                    (line, t)
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn is_line(&self) -> bool {
        matches!(
            self.geometry,
            Some(Geometry::LineString { .. }) | Some(Geometry::MultiLineString { .. })
        )
    }
}

impl FeatureCollection {
    /// Parse a FeatureCollection, or a single Feature wrapped into one.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| TrackError::InvalidGeoJson {
            message: e.to_string(),
        })?;

        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
        let collection = match kind.as_deref() {
            Some("FeatureCollection") => serde_json::from_value::<FeatureCollection>(value),
            Some("Feature") => serde_json::from_value::<Feature>(value).map(|feature| {
                FeatureCollection {
                    features: vec![feature],
                }
            }),
            other => {
                return Err(TrackError::InvalidGeoJson {
                    message: format!("unsupported document type {:?}", other),
                })
            }
        }
        .map_err(|e| TrackError::InvalidGeoJson {
            message: e.to_string(),
        })?;

        collection.validate()?;
        Ok(collection)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TrackError::InvalidGeoJson {
            message: e.to_string(),
        })
    }

    fn validate(&self) -> Result<()> {
        for (index, line) in self.lines().into_iter().enumerate() {
            let bad = line
                .iter()
                .any(|p| p.len() < 2 || p.iter().take(3).any(|v| !v.is_finite()));
            if bad {
                return Err(TrackError::InvalidGeoJson {
                    message: format!("segment {} has a malformed position", index),
                });
            }
            if let Some(p) = line
                .iter()
                .find(|p| !GeoPoint::new(p[0], p[1]).is_valid())
            {
                return Err(TrackError::InvalidGeoJson {
                    message: format!(
                        "segment {} has an out-of-range position [{}, {}]",
                        index, p[0], p[1]
                    ),
                });
            }
        }
        Ok(())
    }

    /// Coordinate sequences of every segment, in segment order.
    pub fn lines(&self) -> Vec<&Vec<Position>> {
        self.features
            .iter()
            .flat_map(|f| f.lines_with_times())
            .map(|(line, _)| line)
            .collect()
    }

    /// Mutable coordinate sequences of every segment, in segment order.
    pub fn lines_mut(&mut self) -> Vec<&mut Vec<Position>> {
        self.features
            .iter_mut()
            .flat_map(|f| {
                match &mut f.geometry {
                    Some(Geometry::LineString { coordinates }) => vec![coordinates],
                    Some(Geometry::MultiLineString { coordinates }) => {
                        coordinates.iter_mut().collect()
                    }
                    _ => Vec::new(),
                }
            })
            .collect()
    }

    pub fn segment_count(&self) -> usize {
        self.lines().len()
    }

    /// Build the point sequences the metrics pipeline works on.
    pub fn segments(&self) -> Vec<Segment> {
        self.features
            .iter()
            .flat_map(|f| f.lines_with_times())
            .map(|(line, times)| {
                line.iter()
                    .enumerate()
                    .map(|(i, position)| GeoPoint {
                        longitude: position[0],
                        latitude: position[1],
                        altitude: position.get(2).copied(),
                        timestamp: times
                            .and_then(|t| t.get(i))
                            .and_then(|t| t.as_deref())
                            .and_then(parse_time),
                    })
                    .collect()
            })
            .collect()
    }

    /// Detect whether every segment carries altitude and time for all points.
    pub fn inspect(&self) -> DataPresence {
        let lines: Vec<_> = self
            .features
            .iter()
            .flat_map(|f| f.lines_with_times())
            .collect();
        if lines.is_empty() {
            return DataPresence::default();
        }

        let has_altitude = lines
            .iter()
            .all(|(line, _)| line.iter().all(|p| p.len() >= 3));
        let has_time = lines.iter().all(|(line, times)| match times {
            Some(t) => t.len() == line.len() && t.iter().all(Option::is_some),
            None => false,
        });

        DataPresence {
            has_altitude,
            has_time,
        }
    }

    /// Description of the first line feature, if any.
    pub fn description(&self) -> Option<String> {
        self.features
            .iter()
            .find(|f| f.is_line())
            .and_then(|f| {
                f.properties
                    .desc
                    .clone()
                    .or_else(|| f.properties.description.clone())
            })
    }

    /// Name every line feature.
    pub fn set_line_names(&mut self, name: &str) {
        for feature in self.features.iter_mut().filter(|f| f.is_line()) {
            feature.properties.name = Some(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMED_LINE: &str = r##"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {
                    "name": "Morning hike",
                    "desc": "Lac Blanc loop",
                    "coordTimes": ["2024-05-01T08:00:00Z", "2024-05-01T08:00:10Z"],
                    "color": "#ff0000"
                },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[6.86, 45.83, 1035.0], [6.861, 45.83, 1040.0]]
                }
            },
            {
                "type": "Feature",
                "properties": null,
                "geometry": { "type": "Point", "coordinates": [6.86, 45.83] }
            }
        ]
    }"##;

    #[test]
    fn test_parse_collection() {
        let collection = FeatureCollection::from_json_str(TIMED_LINE).unwrap();
        assert_eq!(collection.features.len(), 2);
        assert_eq!(collection.segment_count(), 1);
        assert_eq!(collection.description().as_deref(), Some("Lac Blanc loop"));
        assert_eq!(
            collection.features[0].properties.extra.get("color"),
            Some(&Value::String("#ff0000".to_string()))
        );

        let presence = collection.inspect();
        assert!(presence.has_altitude);
        assert!(presence.has_time);
    }

    #[test]
    fn test_segments_carry_altitude_and_time() {
        let collection = FeatureCollection::from_json_str(TIMED_LINE).unwrap();
        let segments = collection.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[0][1].altitude, Some(1040.0));
        let t0 = segments[0][0].timestamp.unwrap();
        let t1 = segments[0][1].timestamp.unwrap();
        assert_eq!((t1 - t0).num_seconds(), 10);
    }

    #[test]
    fn test_single_feature_is_wrapped() {
        let json = r#"{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "MultiLineString",
                "coordinates": [[[0.0, 0.0], [0.0, 0.001]], [[1.0, 1.0]]]
            }
        }"#;
        let collection = FeatureCollection::from_json_str(json).unwrap();
        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.segment_count(), 2);

        let presence = collection.inspect();
        assert!(!presence.has_altitude);
        assert!(!presence.has_time);
    }

    #[test]
    fn test_rejects_malformed_positions() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "LineString", "coordinates": [[0.0], [0.0, 1.0]] }
            }]
        }"#;
        assert!(matches!(
            FeatureCollection::from_json_str(json),
            Err(TrackError::InvalidGeoJson { .. })
        ));
        assert!(FeatureCollection::from_json_str(r#"{"type": "Polygon"}"#).is_err());
        assert!(FeatureCollection::from_json_str("not json").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_positions() {
        for coordinates in ["[[181.0, 45.0], [6.0, 45.0]]", "[[6.0, 45.0], [6.0, -90.5]]"] {
            let json = format!(
                r#"{{"type": "Feature", "properties": {{}},
                    "geometry": {{"type": "LineString", "coordinates": {}}}}}"#,
                coordinates
            );
            assert!(matches!(
                FeatureCollection::from_json_str(&json),
                Err(TrackError::InvalidGeoJson { .. })
            ));
        }

        // Bounds are inclusive
        let json = r#"{"type": "Feature", "properties": {},
            "geometry": {"type": "LineString", "coordinates": [[-180.0, 90.0], [180.0, -90.0]]}}"#;
        assert!(FeatureCollection::from_json_str(json).is_ok());
    }

    #[test]
    fn test_partial_altitude_is_not_altitude() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0, 5.0], [0.0, 1.0]] }
            }]
        }"#;
        let collection = FeatureCollection::from_json_str(json).unwrap();
        assert!(!collection.inspect().has_altitude);
    }

    #[test]
    fn test_set_line_names_and_serialize() {
        let mut collection = FeatureCollection::from_json_str(TIMED_LINE).unwrap();
        collection.set_line_names("Renamed");
        assert_eq!(
            collection.features[0].properties.name.as_deref(),
            Some("Renamed")
        );
        assert_eq!(collection.features[1].properties.name, None);

        let json = collection.to_json_string().unwrap();
        let back = FeatureCollection::from_json_str(&json).unwrap();
        assert_eq!(back, collection);
    }
}
