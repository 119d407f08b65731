//! Key-value persistence contract for tracks.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, Track};

/// Which copy of a track a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// The track as imported
    Origin,
    /// The track as currently edited
    Journey,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Origin => "origin",
            StoreKind::Journey => "journey",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait TrackStore {
    /// Insert or replace the record for `track.slug`.
    fn save(&mut self, kind: StoreKind, track: &Track) -> Result<()>;

    fn load(&self, slug: &str, kind: StoreKind) -> Result<Option<Track>>;

    /// Delete the record. Deleting a missing record is not an error.
    fn delete(&mut self, slug: &str, kind: StoreKind) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryTrackStore {
    records: HashMap<(StoreKind, String), Track>,
}

impl MemoryTrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, slug: &str, kind: StoreKind) -> bool {
        self.records.contains_key(&(kind, slug.to_string()))
    }
}

impl TrackStore for MemoryTrackStore {
    fn save(&mut self, kind: StoreKind, track: &Track) -> Result<()> {
        self.records
            .insert((kind, track.slug.clone()), track.clone());
        Ok(())
    }

    fn load(&self, slug: &str, kind: StoreKind) -> Result<Option<Track>> {
        Ok(self.records.get(&(kind, slug.to_string())).cloned())
    }

    fn delete(&mut self, slug: &str, kind: StoreKind) -> Result<()> {
        self.records.remove(&(kind, slug.to_string()));
        Ok(())
    }
}
