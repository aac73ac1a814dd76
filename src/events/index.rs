//! In-memory id index over the event log.

use crate::types::Sequence;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Where a live event lives in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub offset: u64,
    pub sequence: Sequence,
}

#[derive(Default)]
struct Inner {
    /// Event id to log location.
    by_id: HashMap<String, Location>,
    /// Live event ids in insertion order.
    by_sequence: BTreeMap<Sequence, String>,
    /// Removals since the log was last rewritten.
    removed: u64,
}

/// Maps event ids to log offsets and remembers insertion order.
///
/// Rebuilt from the log on open; never persisted on its own.
#[derive(Default)]
pub struct EventIndex {
    inner: RwLock<Inner>,
}

impl EventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live event. Returns false if the id is already present.
    pub fn insert(&self, id: &str, location: Location) -> bool {
        let mut inner = self.inner.write();
        if inner.by_id.contains_key(id) {
            return false;
        }
        inner.by_id.insert(id.to_string(), location);
        inner.by_sequence.insert(location.sequence, id.to_string());
        true
    }

    /// Forget an event. Returns its former location, if it was live.
    pub fn remove(&self, id: &str) -> Option<Location> {
        let mut inner = self.inner.write();
        let location = inner.by_id.remove(id)?;
        inner.by_sequence.remove(&location.sequence);
        inner.removed += 1;
        Some(location)
    }

    pub fn get(&self, id: &str) -> Option<Location> {
        self.inner.read().by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().by_id.contains_key(id)
    }

    /// Live event ids with their locations, oldest insertion first.
    pub fn live_in_order(&self) -> Vec<(String, Location)> {
        let inner = self.inner.read();
        inner
            .by_sequence
            .values()
            .filter_map(|id| inner.by_id.get(id).map(|loc| (id.clone(), *loc)))
            .collect()
    }

    /// Point every listed event at its new offset after a log rewrite and
    /// reset the removal counter.
    pub fn relocate(&self, moved: &[(String, u64)]) {
        let mut inner = self.inner.write();
        for (id, offset) in moved {
            if let Some(location) = inner.by_id.get_mut(id) {
                location.offset = *offset;
            }
        }
        inner.removed = 0;
    }

    /// Count of live events.
    pub fn count(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn removed_count(&self) -> u64 {
        self.inner.read().removed
    }
}
