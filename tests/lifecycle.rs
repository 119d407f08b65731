//! Editor lifecycle integration tests.
//!
//! Drives the full cycle through the public API: configuration, import,
//! altitude simulation, metrics, settings changes, stale results and removal.

use track_metrics::{
    DemServer, EditorConfig, EditorContext, EditorEvent, ElevationProviders, EventLog, MarkerKind,
    MarkerRef, MemoryTrackStore, RemoveOutcome, StoreKind, TrackError, TrackRegistry, TrackStore,
};

const CONFIG: &str = r##"{
    "track": { "color": "#2266aa", "thickness": 4 },
    "defaultDemServer": "internal",
    "metrics": { "timeOrder": "reject" },
    "elevationCacheCapacity": 256,
    "terrain": {
        "originLongitude": 7.0,
        "originLatitude": 46.0,
        "cellSize": 0.01,
        "columns": 3,
        "rows": 2,
        "heights": [1000.0, 1100.0, 1050.0, 1000.0, 1100.0, 1050.0]
    }
}"##;

/// Two timed segments without altitude, 10 s between points.
const TWO_DAYS: &str = r#"{
    "type": "Feature",
    "properties": {
        "name": "Export",
        "desc": "Two days in the Valais",
        "coordTimes": [
            ["2024-07-01T09:00:00Z", "2024-07-01T09:00:10Z", "2024-07-01T09:00:20Z"],
            ["2024-07-02T09:00:00Z", "2024-07-02T09:00:10Z"]
        ]
    },
    "geometry": {
        "type": "MultiLineString",
        "coordinates": [
            [[7.0, 46.0], [7.01, 46.0], [7.02, 46.0]],
            [[7.02, 46.0], [7.01, 46.0]]
        ]
    }
}"#;

const BACKWARDS: &str = r#"{
    "type": "Feature",
    "properties": {"coordTimes": ["2024-07-01T09:00:10Z", "2024-07-01T09:00:00Z"]},
    "geometry": {"type": "LineString", "coordinates": [[7.0, 46.0, 900.0], [7.001, 46.0, 901.0]]}
}"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_full_editing_session() {
    init_logging();
    let config = EditorConfig::from_json_str(CONFIG).unwrap();
    let providers = ElevationProviders::from_config(&config).unwrap();
    let events = EventLog::new();
    let mut registry = TrackRegistry::new();
    let mut store = MemoryTrackStore::new();
    let mut ctx = EditorContext::new(&mut registry, &mut store, &events, &providers, &config);

    // Import: altitude simulated from the terrain grid
    let track = ctx.import_geojson("Valais", TWO_DAYS).unwrap();
    assert_eq!(track.slug, "valais");
    assert_eq!(track.color, "#2266aa");
    assert_eq!(track.thickness, 4);
    assert_eq!(track.description.as_deref(), Some("Two days in the Valais"));
    assert!(!track.has_altitude);
    assert!(track.has_time);
    assert_eq!(track.metrics.len(), 2);

    let day1 = &track.metrics[0];
    assert_eq!(day1.points.len(), 2);
    assert_eq!(day1.global.min_height, Some(1000.0));
    assert!((day1.global.max_height.unwrap() - 1100.0).abs() < 1e-6);
    assert!((day1.global.positive_elevation - 100.0).abs() < 1e-6);
    assert!((day1.global.negative_elevation + 50.0).abs() < 1e-6);
    assert_eq!(day1.global.duration, 20.0);
    let distance: f64 = day1.points.iter().map(|p| p.distance).sum();
    assert_eq!(day1.global.distance, distance);
    for point in &day1.points {
        assert_eq!(point.duration, Some(10.0));
        let speed = point.speed.unwrap();
        assert!((speed - point.distance / 10.0).abs() < 1e-9);
        assert!((point.pace.unwrap() * speed - 1.0).abs() < 1e-9);
    }

    let day2 = &track.metrics[1];
    assert_eq!(day2.points.len(), 1);
    assert!((day2.global.positive_elevation - 50.0).abs() < 1e-6);

    // Line features are named after the track
    assert_eq!(
        track.geometry.features[0].properties.name.as_deref(),
        Some("Valais")
    );

    let started = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, EditorEvent::LongTaskStarted { .. }))
        .count();
    assert_eq!(started, 1);

    // Settings keep slug and markers and recompute
    ctx.set_marker_visibility("valais", MarkerKind::Stop, false)
        .unwrap();
    let renamed = ctx.set_title("valais", "Valais 2024").unwrap();
    assert_eq!(renamed.slug, "valais");
    assert!(!renamed.markers.stop.visible);
    assert_eq!(renamed.metrics, track.metrics);

    // Picking a marker entity resolves to the track
    let picked = MarkerRef::parse("marker#valais#stop").unwrap();
    assert_eq!(picked.kind(), Some(MarkerKind::Stop));
    assert!(ctx.registry.get(&picked.track).is_some());

    // Switching the DEM server off strips the simulated altitude
    let flat = ctx.set_dem_server("valais", DemServer::None).unwrap();
    assert!(flat
        .geometry
        .lines()
        .iter()
        .all(|line| line.iter().all(|p| p.len() == 2)));
    assert!(flat.metrics.iter().all(|m| m.global.max_height.is_none()));
    assert_eq!(flat.metrics[0].global.max_speed, track.metrics[0].global.max_speed);

    // Back on: simulated again, not stacked
    let again = ctx.set_dem_server("valais", DemServer::Internal).unwrap();
    assert!(again
        .geometry
        .lines()
        .iter()
        .all(|line| line.iter().all(|p| p.len() == 3)));
    assert_eq!(again.metrics, track.metrics);

    // Removal of the last track closes editing
    assert_eq!(ctx.remove("valais").unwrap(), RemoveOutcome::EditingClosed);
    assert!(ctx.store.load("valais", StoreKind::Journey).unwrap().is_none());
    assert!(ctx.store.load("valais", StoreKind::Origin).unwrap().is_none());
    assert_eq!(events.drain().last(), Some(&EditorEvent::EditingClosed));
}

#[test]
fn test_time_order_policy() {
    init_logging();
    let providers = ElevationProviders::new(16);
    let events = EventLog::new();

    let strict = EditorConfig::default();
    let mut registry = TrackRegistry::new();
    let mut store = MemoryTrackStore::new();
    let mut ctx = EditorContext::new(&mut registry, &mut store, &events, &providers, &strict);
    assert!(matches!(
        ctx.import_geojson("Backwards", BACKWARDS),
        Err(TrackError::InvalidTimeOrder { .. })
    ));
    assert!(registry.is_empty());

    let lenient = EditorConfig::from_json_str(r#"{"metrics": {"timeOrder": "clamp"}}"#).unwrap();
    let mut registry = TrackRegistry::new();
    let mut store = MemoryTrackStore::new();
    let mut ctx = EditorContext::new(&mut registry, &mut store, &events, &providers, &lenient);
    let track = ctx.import_geojson("Backwards", BACKWARDS).unwrap();
    let point = &track.metrics[0].points[0];
    assert_eq!(point.duration, Some(0.0));
    assert!(point.speed.is_none());
    assert!(point.pace.is_none());
    assert!(track.metrics[0].global.average_speed.is_none());
    assert_eq!(point.elevation, Some(1.0));
}

#[cfg(feature = "persistence")]
#[test]
fn test_sqlite_store_session() {
    use tempfile::TempDir;
    use track_metrics::SqliteTrackStore;

    init_logging();
    let tmp_dir = TempDir::new().unwrap();
    let db_path = tmp_dir.path().join("tracks.db");

    let config = EditorConfig::from_json_str(CONFIG).unwrap();
    let providers = ElevationProviders::from_config(&config).unwrap();
    let events = EventLog::new();

    let imported = {
        let mut registry = TrackRegistry::new();
        let mut store = SqliteTrackStore::new(&db_path).unwrap();
        let mut ctx = EditorContext::new(&mut registry, &mut store, &events, &providers, &config);
        ctx.import_geojson("Valais", TWO_DAYS).unwrap()
    };

    // A new session restores the saved journey
    let mut registry = TrackRegistry::new();
    let mut store = SqliteTrackStore::new(&db_path).unwrap();
    let mut ctx = EditorContext::new(&mut registry, &mut store, &events, &providers, &config);
    let restored = ctx.restore("valais").unwrap();
    assert_eq!(restored, imported);
    assert_eq!(ctx.registry.current_slug(), Some("valais"));
}
