//! # Track Lifecycle
//!
//! Every operation that changes a track runs the same cycle: clone the
//! published value with the new settings, normalize its altitude, compute its
//! metrics, publish it in the registry, and save it. Nothing is published
//! when a step fails.
//!
//! State is passed explicitly through an [`EditorContext`]:
//!
//! ```rust
//! use track_metrics::{
//!     EditorConfig, EditorContext, ElevationProviders, EventLog, MemoryTrackStore, TrackRegistry,
//! };
//!
//! let config = EditorConfig::default();
//! let providers = ElevationProviders::from_config(&config).unwrap();
//! let events = EventLog::new();
//! let mut registry = TrackRegistry::new();
//! let mut store = MemoryTrackStore::new();
//!
//! let mut ctx = EditorContext::new(&mut registry, &mut store, &events, &providers, &config);
//! let track = ctx
//!     .import_geojson(
//!         "Evening run",
//!         r#"{"type": "Feature", "properties": {},
//!             "geometry": {"type": "LineString", "coordinates": [[2.35, 48.85], [2.36, 48.85]]}}"#,
//!     )
//!     .unwrap();
//! assert_eq!(track.metrics.len(), 1);
//! ```

use log::{info, warn};

use crate::config::THICKNESS_RANGE;
use crate::normalizer::normalize_track;
use crate::track::slugify;
use crate::{
    compute_track_metrics, ComputeTicket, DemServer, EditorConfig, EditorEvent,
    ElevationProviders, EventSink, FeatureCollection, MarkerKind, MetricsConfig, OptionExt,
    Result, StoreKind, Track, TrackError, TrackOptions, TrackOverrides, TrackRegistry, TrackStore,
};

/// Where the selection went after a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The first remaining track became current
    Selected(String),
    /// No track is left
    EditingClosed,
}

/// Normalize a track's altitude and compute its metrics.
///
/// Returns a new value; `track` itself is not modified and nothing is
/// published.
pub fn compute(
    track: &Track,
    providers: &ElevationProviders,
    events: &dyn EventSink,
    config: &MetricsConfig,
) -> Result<Track> {
    let geometry = normalize_track(track, providers, events)?;
    let metrics = compute_track_metrics(&geometry.segments(), config)?;

    let mut computed = track.clone();
    computed.geometry = geometry;
    computed.metrics = metrics;
    Ok(computed)
}

/// Collaborators of the lifecycle operations.
pub struct EditorContext<'a> {
    pub registry: &'a mut TrackRegistry,
    pub store: &'a mut dyn TrackStore,
    pub events: &'a dyn EventSink,
    pub providers: &'a ElevationProviders,
    pub config: &'a EditorConfig,
}

impl<'a> EditorContext<'a> {
    pub fn new(
        registry: &'a mut TrackRegistry,
        store: &'a mut dyn TrackStore,
        events: &'a dyn EventSink,
        providers: &'a ElevationProviders,
        config: &'a EditorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            providers,
            config,
        }
    }

    // ========================================================================
    // Computation
    // ========================================================================

    /// Start a computation; results of earlier ones for `slug` become stale.
    pub fn begin_compute(&mut self, slug: &str) -> ComputeTicket {
        self.registry.begin(slug)
    }

    pub fn cancel_compute(&mut self, slug: &str) {
        self.registry.cancel(slug);
    }

    /// Publish a computed track and make it current.
    pub fn finish_compute(&mut self, ticket: ComputeTicket, track: Track) -> Result<Track> {
        let published = self.registry.commit(ticket, track)?.clone();
        self.events.emit(EditorEvent::TrackPublished {
            slug: published.slug.clone(),
        });
        self.select(&published.slug)?;
        Ok(published)
    }

    /// Normalize, compute and publish `track`.
    pub fn compute_all(&mut self, track: Track) -> Result<Track> {
        self.compute_and_publish(track, |_, _| Ok(()))
    }

    /// Compute `track`, hand the result to `persist`, then publish it.
    ///
    /// `persist` only runs once the result is known to be publishable, and
    /// nothing is published when it fails.
    fn compute_and_publish<F>(&mut self, track: Track, persist: F) -> Result<Track>
    where
        F: FnOnce(&mut dyn TrackStore, &Track) -> Result<()>,
    {
        let ticket = self.begin_compute(&track.slug);
        let computed = compute(&track, self.providers, self.events, &self.config.metrics)
            .map_err(|e| {
                warn!("[TrackEditor] Computing '{}' failed: {}", track.slug, e);
                e
            })?;
        self.registry.check_commit(&ticket, &computed)?;
        persist(&mut *self.store, &computed).map_err(|e| {
            warn!("[TrackEditor] Saving '{}' failed: {}", computed.slug, e);
            e
        })?;
        self.finish_compute(ticket, computed)
    }

    /// Recompute a copy of `track` carrying `overrides`.
    pub fn clone_with_overrides(
        &mut self,
        track: &Track,
        overrides: TrackOverrides,
    ) -> Result<Track> {
        self.compute_all(track.clone_with(overrides))
    }

    fn select(&mut self, slug: &str) -> Result<()> {
        if self.registry.current_slug() == Some(slug) {
            return Ok(());
        }
        self.registry.set_current(slug)?;
        self.events.emit(EditorEvent::SelectionChanged {
            slug: slug.to_string(),
        });
        Ok(())
    }

    /// Clone-recompute-save cycle for one published track.
    fn rebuild(&mut self, slug: &str, overrides: TrackOverrides) -> Result<Track> {
        let source = self.registry.get(slug).ok_or_not_found(slug)?;
        let track = source.clone_with(overrides);
        self.compute_and_publish(track, |store, computed| {
            store.save(StoreKind::Journey, computed)
        })
    }

    // ========================================================================
    // Import
    // ========================================================================

    /// Create, compute, save and select a track from a GeoJSON document.
    pub fn import_geojson(&mut self, title: &str, json: &str) -> Result<Track> {
        self.import_geojson_with(title, json, TrackOptions::default())
    }

    /// Like [`import_geojson`](Self::import_geojson), with explicit options.
    ///
    /// Title and slug are made unique; a track without altitude gets the
    /// configured default DEM server unless `options` names one.
    pub fn import_geojson_with(
        &mut self,
        title: &str,
        json: &str,
        options: TrackOptions,
    ) -> Result<Track> {
        let geometry = FeatureCollection::from_json_str(json)?;
        if let Some(parent) = &options.parent {
            if !self.registry.contains(parent) {
                return Err(TrackError::TrackNotFound {
                    slug: parent.clone(),
                });
            }
        }

        let title = match title.trim() {
            "" => "Track",
            trimmed => trimmed,
        };
        let title = self.registry.define_unique_title(title);
        let slug = options.slug.clone().unwrap_or_else(|| slugify(&title));
        let slug = self.registry.unique_slug(&slug);
        let options = TrackOptions {
            slug: Some(slug),
            dem_server: options.dem_server.or(Some(self.config.default_dem_server)),
            ..options
        };

        let origin = Track::from_geojson(&title, geometry, options, &self.config.track);
        info!(
            "[TrackEditor] Importing '{}' as '{}' ({} segments, altitude: {}, time: {})",
            origin.title,
            origin.slug,
            origin.geometry.segment_count(),
            origin.has_altitude,
            origin.has_time
        );

        let linked_parent = match &origin.parent {
            Some(parent) => {
                let mut parent = self.registry.get(parent).ok_or_not_found(parent)?.clone();
                parent.children.push(origin.slug.clone());
                Some(parent)
            }
            None => None,
        };

        let track = self.compute_and_publish(origin.clone(), |store, computed| {
            let saved = store
                .save(StoreKind::Origin, &origin)
                .and_then(|()| store.save(StoreKind::Journey, computed))
                .and_then(|()| match &linked_parent {
                    Some(parent) => store.save(StoreKind::Journey, parent),
                    None => Ok(()),
                });
            if saved.is_err() {
                // Drop the records of a track that will not be published
                for kind in [StoreKind::Origin, StoreKind::Journey] {
                    if let Err(e) = store.delete(&origin.slug, kind) {
                        warn!("[TrackEditor] Cleaning up '{}' ({}): {}", origin.slug, kind, e);
                    }
                }
            }
            saved
        })?;

        if let Some(parent) = linked_parent {
            self.registry.replace(parent)?;
        }
        Ok(track)
    }

    /// Publish the saved journey copy of a track again, recomputed.
    pub fn restore(&mut self, slug: &str) -> Result<Track> {
        let saved = match self.store.load(slug, StoreKind::Journey)? {
            Some(track) => track,
            None => self.store.load(slug, StoreKind::Origin)?.ok_or_not_found(slug)?,
        };
        self.compute_all(saved)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Rename a track. An empty title keeps the current one.
    pub fn set_title(&mut self, slug: &str, title: &str) -> Result<Track> {
        let title = title.trim();
        if title.is_empty() {
            return self.registry.get(slug).cloned().ok_or_not_found(slug);
        }
        let title = self.registry.unique_title_excluding(title, Some(slug));
        self.rebuild(
            slug,
            TrackOverrides {
                title: Some(title),
                ..Default::default()
            },
        )
    }

    pub fn set_color(&mut self, slug: &str, color: &str) -> Result<Track> {
        self.rebuild(
            slug,
            TrackOverrides {
                color: Some(color.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn set_thickness(&mut self, slug: &str, thickness: u8) -> Result<Track> {
        if !THICKNESS_RANGE.contains(&thickness) {
            return Err(TrackError::Config {
                message: format!("track thickness {} outside 1-10", thickness),
            });
        }
        self.rebuild(
            slug,
            TrackOverrides {
                thickness: Some(thickness),
                ..Default::default()
            },
        )
    }

    pub fn set_visibility(&mut self, slug: &str, visible: bool) -> Result<Track> {
        self.rebuild(
            slug,
            TrackOverrides {
                visible: Some(visible),
                ..Default::default()
            },
        )
    }

    pub fn set_marker_visibility(
        &mut self,
        slug: &str,
        kind: MarkerKind,
        visible: bool,
    ) -> Result<Track> {
        let mut markers = self.registry.get(slug).ok_or_not_found(slug)?.markers.clone();
        markers.get_mut(kind).visible = visible;
        self.rebuild(
            slug,
            TrackOverrides {
                markers: Some(markers),
                ..Default::default()
            },
        )
    }

    /// Change the DEM server; simulated altitude is redone or stripped.
    pub fn set_dem_server(&mut self, slug: &str, dem_server: DemServer) -> Result<Track> {
        self.rebuild(
            slug,
            TrackOverrides {
                dem_server: Some(dem_server),
                ..Default::default()
            },
        )
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Delete a track from both stores and the registry, then select the
    /// first remaining track or close editing.
    pub fn remove(&mut self, slug: &str) -> Result<RemoveOutcome> {
        let removed = self.registry.get(slug).ok_or_not_found(slug)?.clone();

        // Unlinked copies of the parent and children, saved before any
        // registry change
        let mut relinked = Vec::new();
        if let Some(parent) = removed.parent.as_deref().and_then(|p| self.registry.get(p)) {
            let mut parent = parent.clone();
            parent.children.retain(|c| c != slug);
            relinked.push(parent);
        }
        for child in removed.children.iter().filter_map(|c| self.registry.get(c)) {
            let mut child = child.clone();
            child.parent = None;
            relinked.push(child);
        }

        self.store.delete(slug, StoreKind::Origin)?;
        self.store.delete(slug, StoreKind::Journey)?;
        for track in &relinked {
            self.store.save(StoreKind::Journey, track)?;
        }

        self.registry.remove(slug);
        for track in relinked {
            self.registry.replace(track)?;
        }
        info!("[TrackEditor] Removed '{}'", slug);

        match self.registry.slugs().first().cloned() {
            Some(first) => {
                self.select(&first)?;
                Ok(RemoveOutcome::Selected(first))
            }
            None => {
                self.events.emit(EditorEvent::EditingClosed);
                Ok(RemoveOutcome::EditingClosed)
            }
        }
    }

    pub fn define_unique_title(&self, candidate: &str) -> String {
        self.registry.define_unique_title(candidate)
    }
}
