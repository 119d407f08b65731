//! Active track registry and editor events.
//!
//! The registry owns the published [`Track`] values, their display order and
//! the current selection. Computations are tagged with a [`ComputeTicket`] so
//! a result that was superseded while it ran is never published.

use std::collections::HashMap;
use std::sync::Mutex;

use log::debug;

use crate::{OptionExt, Result, Track, TrackError};

// ============================================================================
// Events
// ============================================================================

/// Notifications for the editor collaborators (UI, rendering).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// Provider calls started for a track
    LongTaskStarted { slug: String },
    LongTaskEnded { slug: String },
    /// A new current track was selected
    SelectionChanged { slug: String },
    /// The last track was removed
    EditingClosed,
    /// A computed track replaced or joined the registry
    TrackPublished { slug: String },
}

pub trait EventSink {
    fn emit(&self, event: EditorEvent);
}

impl<F> EventSink for F
where
    F: Fn(&EditorEvent),
{
    fn emit(&self, event: EditorEvent) {
        self(&event)
    }
}

/// Sink recording every event, in emission order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<EditorEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all recorded events.
    pub fn drain(&self) -> Vec<EditorEvent> {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *events)
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: EditorEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Proof that a computation was started for a slug at a given generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeTicket {
    slug: String,
    generation: u64,
}

impl ComputeTicket {
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: HashMap<String, Track>,
    /// Display order of active slugs
    order: Vec<String>,
    current: Option<String>,
    /// Per-slug computation generation; survives removal
    generations: HashMap<String, u64>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Computation Tickets
    // ========================================================================

    /// Start a computation for `slug`. Any earlier ticket becomes stale.
    pub fn begin(&mut self, slug: &str) -> ComputeTicket {
        let generation = self.bump(slug);
        ComputeTicket {
            slug: slug.to_string(),
            generation,
        }
    }

    /// Discard whatever computation is in flight for `slug`.
    pub fn cancel(&mut self, slug: &str) {
        self.bump(slug);
        debug!("[TrackRegistry] Cancelled computation of '{}'", slug);
    }

    pub fn is_stale(&self, ticket: &ComputeTicket) -> bool {
        self.generations.get(&ticket.slug).copied() != Some(ticket.generation)
    }

    fn bump(&mut self, slug: &str) -> u64 {
        let generation = self.generations.entry(slug.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Publish a computed track, replacing any previous value for its slug.
    ///
    /// Fails with `StaleResult` if the ticket was superseded, and with
    /// `DuplicateTitle` if another active track already uses the title.
    pub fn commit(&mut self, ticket: ComputeTicket, track: Track) -> Result<&Track> {
        self.check_commit(&ticket, &track)?;

        // Consume the ticket
        self.bump(&ticket.slug);
        Ok(self.insert(track))
    }

    /// Whether [`commit`](Self::commit) would accept `track` under `ticket`.
    pub fn check_commit(&self, ticket: &ComputeTicket, track: &Track) -> Result<()> {
        if ticket.slug != track.slug || self.is_stale(ticket) {
            return Err(TrackError::StaleResult {
                slug: ticket.slug.clone(),
            });
        }
        if self.title_in_use(&track.title, Some(&track.slug)) {
            return Err(TrackError::DuplicateTitle {
                title: track.title.clone(),
            });
        }
        Ok(())
    }

    /// Swap in a new value for an already published track.
    ///
    /// For changes that need no recomputation (parent/children links).
    pub fn replace(&mut self, track: Track) -> Result<Track> {
        let slot = self.tracks.get_mut(&track.slug).ok_or_not_found(&track.slug)?;
        Ok(std::mem::replace(slot, track))
    }

    fn insert(&mut self, track: Track) -> &Track {
        let slug = track.slug.clone();
        if !self.tracks.contains_key(&slug) {
            self.order.push(slug.clone());
        }
        self.tracks.insert(slug.clone(), track);
        &self.tracks[&slug]
    }

    /// Remove a track. In-flight computations for it become stale.
    pub fn remove(&mut self, slug: &str) -> Option<Track> {
        let track = self.tracks.remove(slug)?;
        self.order.retain(|s| s != slug);
        if self.current.as_deref() == Some(slug) {
            self.current = None;
        }
        self.bump(slug);
        Some(track)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, slug: &str) -> Option<&Track> {
        self.tracks.get(slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.tracks.contains_key(slug)
    }

    /// Active slugs in display order.
    pub fn slugs(&self) -> &[String] {
        &self.order
    }

    /// Active tracks in display order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().filter_map(|slug| self.tracks.get(slug))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_deref().and_then(|slug| self.tracks.get(slug))
    }

    pub fn current_slug(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn set_current(&mut self, slug: &str) -> Result<()> {
        if !self.contains(slug) {
            return Err(TrackError::TrackNotFound {
                slug: slug.to_string(),
            });
        }
        self.current = Some(slug.to_string());
        Ok(())
    }

    // ========================================================================
    // Naming
    // ========================================================================

    /// Whether an active track other than `exclude` uses `title`.
    pub fn title_in_use(&self, title: &str, exclude: Option<&str>) -> bool {
        self.tracks
            .values()
            .any(|t| t.title == title && Some(t.slug.as_str()) != exclude)
    }

    /// `candidate`, or the first free `candidate (n)` for n = 1, 2, ...
    pub fn define_unique_title(&self, candidate: &str) -> String {
        self.unique_title_excluding(candidate, None)
    }

    /// Like [`define_unique_title`](Self::define_unique_title), ignoring the
    /// track being renamed.
    pub fn unique_title_excluding(&self, candidate: &str, exclude: Option<&str>) -> String {
        if !self.title_in_use(candidate, exclude) {
            return candidate.to_string();
        }
        (1..)
            .map(|n| format!("{} ({})", candidate, n))
            .find(|title| !self.title_in_use(title, exclude))
            .unwrap_or_else(|| candidate.to_string())
    }

    /// `candidate`, or the first free `candidate-n` for n = 1, 2, ...
    ///
    /// Slugs of removed tracks stay reserved so their stale computations can
    /// never be committed under a new track.
    pub fn unique_slug(&self, candidate: &str) -> String {
        let taken =
            |slug: &str| self.tracks.contains_key(slug) || self.generations.contains_key(slug);
        if !taken(candidate) {
            return candidate.to_string();
        }
        (1..)
            .map(|n| format!("{}-{}", candidate, n))
            .find(|slug| !taken(slug))
            .unwrap_or_else(|| candidate.to_string())
    }
}
