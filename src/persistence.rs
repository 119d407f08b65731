//! # SQLite Track Store
//!
//! [`TrackStore`] backed by a single SQLite table. Each record is one track
//! serialized with MessagePack, keyed by slug and [`StoreKind`]; title and
//! update time are kept alongside for inspection.

use std::path::Path;

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{Result, StoreKind, Track, TrackError, TrackStore};

fn encode(track: &Track) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(track).map_err(|e| TrackError::Persistence {
        message: format!("Failed to encode track '{}': {}", track.slug, e),
    })
}

fn decode(slug: &str, blob: &[u8]) -> Result<Track> {
    rmp_serde::from_slice(blob).map_err(|e| TrackError::Persistence {
        message: format!("Failed to decode track '{}': {}", slug, e),
    })
}

pub struct SqliteTrackStore {
    db: Connection,
}

impl SqliteTrackStore {
    /// Open (or create) the store at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db = Connection::open(db_path.as_ref())?;
        Self::init_schema(&db)?;
        info!("[TrackStore] Opened {}", db_path.as_ref().display());
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracks (
                slug TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                data BLOB NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (slug, kind)
            );
            "#,
        )?;
        Ok(())
    }

    /// Slugs stored under `kind`, sorted.
    pub fn slugs(&self, kind: StoreKind) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .prepare("SELECT slug FROM tracks WHERE kind = ? ORDER BY slug")?;
        let slugs = stmt
            .query_map(params![kind.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(slugs)
    }
}

impl TrackStore for SqliteTrackStore {
    fn save(&mut self, kind: StoreKind, track: &Track) -> Result<()> {
        let blob = encode(track)?;
        self.db.execute(
            "INSERT OR REPLACE INTO tracks (slug, kind, title, data, updated_at)
             VALUES (?, ?, ?, ?, strftime('%s', 'now'))",
            params![track.slug, kind.as_str(), track.title, blob],
        )?;
        debug!(
            "[TrackStore] Saved '{}' ({}, {} bytes)",
            track.slug,
            kind,
            blob.len()
        );
        Ok(())
    }

    fn load(&self, slug: &str, kind: StoreKind) -> Result<Option<Track>> {
        let blob: Option<Vec<u8>> = self
            .db
            .query_row(
                "SELECT data FROM tracks WHERE slug = ? AND kind = ?",
                params![slug, kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        blob.map(|blob| decode(slug, &blob)).transpose()
    }

    fn delete(&mut self, slug: &str, kind: StoreKind) -> Result<()> {
        let deleted = self.db.execute(
            "DELETE FROM tracks WHERE slug = ? AND kind = ?",
            params![slug, kind.as_str()],
        )?;
        debug!("[TrackStore] Deleted '{}' ({}): {} rows", slug, kind, deleted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compute_track_metrics, DemServer, FeatureCollection, MetricsConfig, TrackDefaults,
        TrackOptions,
    };

    fn sample_track() -> Track {
        let geometry = FeatureCollection::from_json_str(
            r#"{"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "properties": {
                    "name": "Col de Balme",
                    "coordTimes": ["2024-06-01T08:00:00Z", "2024-06-01T08:00:30Z"],
                    "source": "gps"
                },
                "geometry": {"type": "LineString", "coordinates": [[6.95, 46.02, 1800.0], [6.951, 46.02, 1806.5]]}
            }]}"#,
        )
        .unwrap();
        let mut track = Track::from_geojson(
            "Col de Balme",
            geometry,
            TrackOptions {
                dem_server: Some(DemServer::Internal),
                ..Default::default()
            },
            &TrackDefaults::default(),
        );
        track.metrics =
            compute_track_metrics(&track.segments(), &MetricsConfig::default()).unwrap();
        track
    }

    #[test]
    fn test_save_and_load() {
        let mut store = SqliteTrackStore::in_memory().unwrap();
        let track = sample_track();
        store.save(StoreKind::Journey, &track).unwrap();

        let loaded = store.load("col-de-balme", StoreKind::Journey).unwrap();
        assert_eq!(loaded, Some(track));
        assert!(store.load("col-de-balme", StoreKind::Origin).unwrap().is_none());
    }

    #[test]
    fn test_save_replaces() {
        let mut store = SqliteTrackStore::in_memory().unwrap();
        let mut track = sample_track();
        store.save(StoreKind::Journey, &track).unwrap();
        track.color = "#123456".to_string();
        store.save(StoreKind::Journey, &track).unwrap();

        assert_eq!(store.slugs(StoreKind::Journey).unwrap(), vec!["col-de-balme"]);
        let loaded = store.load("col-de-balme", StoreKind::Journey).unwrap().unwrap();
        assert_eq!(loaded.color, "#123456");
    }

    #[test]
    fn test_delete() {
        let mut store = SqliteTrackStore::in_memory().unwrap();
        let track = sample_track();
        store.save(StoreKind::Origin, &track).unwrap();
        store.save(StoreKind::Journey, &track).unwrap();

        store.delete("col-de-balme", StoreKind::Origin).unwrap();
        store.delete("col-de-balme", StoreKind::Origin).unwrap();
        assert!(store.slugs(StoreKind::Origin).unwrap().is_empty());
        assert_eq!(store.slugs(StoreKind::Journey).unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.db");
        {
            let mut store = SqliteTrackStore::new(&path).unwrap();
            store.save(StoreKind::Journey, &sample_track()).unwrap();
        }
        let store = SqliteTrackStore::new(&path).unwrap();
        assert!(store.load("col-de-balme", StoreKind::Journey).unwrap().is_some());
    }
}
