//! Altitude normalization.
//!
//! Decides, from a track's recorded altitude presence and its DEM server,
//! whether coordinates keep their altitude, lose a previously simulated one,
//! or get one from an elevation provider. Recorded altitude is never touched.

use geo::Coord;
use log::{debug, info};

use crate::geojson::Position;
use crate::{
    DemServer, EditorEvent, ElevationProviders, ElevationSource, EventSink, FeatureCollection,
    Result, Track, TrackError,
};

/// What normalization does to a track's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeAction {
    /// Recorded altitude is authoritative
    Keep,
    /// Drop any third component (no-op on 2D coordinates)
    Strip,
    /// Set the third component from a provider
    Simulate(DemServer),
}

impl AltitudeAction {
    pub fn plan(has_altitude: bool, dem_server: DemServer) -> Self {
        if has_altitude {
            AltitudeAction::Keep
        } else if dem_server == DemServer::None {
            AltitudeAction::Strip
        } else {
            AltitudeAction::Simulate(dem_server)
        }
    }
}

/// Reduce every position of a line to 2D. Returns how many were stripped.
pub fn strip_altitudes(line: &mut [Position]) -> usize {
    let mut stripped = 0;
    for position in line.iter_mut().filter(|p| p.len() > 2) {
        position.truncate(2);
        stripped += 1;
    }
    stripped
}

/// Set each position's altitude from `source`, positionally.
///
/// A previously simulated altitude is replaced, never stacked.
pub fn inject_altitudes<S: ElevationSource + ?Sized>(
    line: &mut [Position],
    source: &S,
) -> Result<()> {
    if line.is_empty() {
        return Ok(());
    }

    let coords: Vec<Coord<f64>> = line
        .iter()
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect();
    let altitudes = source.elevations(&coords)?;
    if altitudes.len() != coords.len() {
        return Err(TrackError::ElevationCountMismatch {
            expected: coords.len(),
            actual: altitudes.len(),
        });
    }

    for (position, altitude) in line.iter_mut().zip(altitudes) {
        position.truncate(2);
        position.push(altitude);
    }
    Ok(())
}

/// Strip altitude from every segment of a collection.
pub fn strip_geometry(geometry: &mut FeatureCollection) -> usize {
    geometry
        .lines_mut()
        .into_iter()
        .map(|line| strip_altitudes(line))
        .sum()
}

/// Simulate altitude for every segment of a collection, one provider call per segment.
pub fn simulate_geometry<S: ElevationSource + ?Sized>(
    geometry: &mut FeatureCollection,
    source: &S,
) -> Result<()> {
    for line in geometry.lines_mut() {
        inject_altitudes(line, source)?;
    }
    Ok(())
}

/// Produce the normalized geometry of a track.
///
/// Works on a copy: on failure the track's geometry is left as it was.
/// Emits `LongTaskStarted`/`LongTaskEnded` around provider calls.
pub fn normalize_track(
    track: &Track,
    providers: &ElevationProviders,
    events: &dyn EventSink,
) -> Result<FeatureCollection> {
    let mut geometry = track.geometry.clone();

    match AltitudeAction::plan(track.has_altitude, track.dem_server) {
        AltitudeAction::Keep => return Ok(geometry),
        AltitudeAction::Strip => {
            let stripped = strip_geometry(&mut geometry);
            if stripped > 0 {
                debug!(
                    "[Normalizer] Stripped simulated altitude from {} points of '{}'",
                    stripped, track.slug
                );
            }
        }
        AltitudeAction::Simulate(server) => {
            let source = providers.source(server)?;
            info!(
                "[Normalizer] Simulating altitude of '{}' with {}",
                track.slug, server
            );
            events.emit(EditorEvent::LongTaskStarted {
                slug: track.slug.clone(),
            });
            let result = simulate_geometry(&mut geometry, &source);
            events.emit(EditorEvent::LongTaskEnded {
                slug: track.slug.clone(),
            });
            result?;
        }
    }

    geometry.set_line_names(&track.title);
    Ok(geometry)
}
