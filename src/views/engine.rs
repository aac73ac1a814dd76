//! Incrementally maintained view indices.

use super::definition::{Registration, ViewDefinition};
use super::key::IndexKey;
use crate::error::{Result, StoreError};
use crate::query::{Direction, QueryOptions};
use crate::types::{Event, Sequence};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::debug;

/// Entry position: the emitted key, then insertion sequence, then the
/// emission ordinal within the event. Equal keys therefore sort in
/// insertion order, and repeated emissions from one event stay distinct.
type EntryKey = (IndexKey, Sequence, u32);

/// One view's ordered index.
struct ViewIndex {
    definition: ViewDefinition,
    entries: BTreeMap<EntryKey, String>,
}

impl ViewIndex {
    fn new(definition: ViewDefinition) -> Self {
        Self {
            definition,
            entries: BTreeMap::new(),
        }
    }

    /// Index `event`. Returns true if it emitted at least one key.
    fn add(&mut self, event: &Event, sequence: Sequence) -> bool {
        let keys = self.definition.keys_for(event);
        let emitted = !keys.is_empty();
        for (ordinal, key) in keys.into_iter().enumerate() {
            self.entries
                .insert((key, sequence, ordinal as u32), event.id.clone());
        }
        emitted
    }

    fn remove(&mut self, event: &Event, sequence: Sequence) -> usize {
        let keys = self.definition.keys_for(event);
        keys.into_iter()
            .enumerate()
            .filter(|(ordinal, key)| {
                self.entries
                    .remove(&(key.clone(), sequence, *ordinal as u32))
                    .is_some()
            })
            .count()
    }
}

/// Maintains every registered view.
///
/// All views sit behind one lock, so the entries an insertion adds across
/// views become visible to readers together.
#[derive(Default)]
pub struct ViewEngine {
    views: RwLock<BTreeMap<&'static str, ViewIndex>>,
}

impl ViewEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view.
    ///
    /// A new view is populated from `existing`, which is only called when
    /// the view is actually created and must yield every live event in
    /// insertion order. Re-registering an identical definition is a no-op;
    /// a different revision under the same name is a conflict and the
    /// existing definition stays in place.
    pub fn register<F>(&self, definition: ViewDefinition, existing: F) -> Result<Registration>
    where
        F: FnOnce() -> Result<Vec<(Sequence, Event)>>,
    {
        if let Some(outcome) = self.check(&definition)? {
            return Ok(outcome);
        }

        let mut index = ViewIndex::new(definition);
        for (sequence, event) in existing()? {
            index.add(&event, sequence);
        }

        let mut views = self.views.write();
        // A racing registration of the same name wins if it got there first.
        if views.contains_key(definition.name) {
            drop(views);
            return self
                .check(&definition)
                .map(|outcome| outcome.unwrap_or(Registration::Unchanged));
        }
        debug!(
            view = definition.name,
            revision = definition.revision,
            entries = index.entries.len(),
            "registered view"
        );
        views.insert(definition.name, index);
        Ok(Registration::Created)
    }

    fn check(&self, definition: &ViewDefinition) -> Result<Option<Registration>> {
        match self.views.read().get(definition.name) {
            None => Ok(None),
            Some(current) if current.definition.revision == definition.revision => {
                Ok(Some(Registration::Unchanged))
            }
            Some(current) => Err(StoreError::DefinitionConflict {
                name: definition.name.to_string(),
                existing: current.definition.revision,
                proposed: definition.revision,
            }),
        }
    }

    /// Index a newly stored event in every view. Returns the names of the
    /// views that emitted at least one entry for it.
    pub fn on_insert(&self, event: &Event, sequence: Sequence) -> Vec<&'static str> {
        let mut views = self.views.write();
        views
            .iter_mut()
            .filter_map(|(name, index)| index.add(event, sequence).then_some(*name))
            .collect()
    }

    /// Drop the entries `event` contributed to `view`. Returns how many
    /// entries were removed.
    pub fn evict(&self, view: &str, event: &Event, sequence: Sequence) -> usize {
        self.views
            .write()
            .get_mut(view)
            .map(|index| index.remove(event, sequence))
            .unwrap_or(0)
    }

    /// Ids of events whose keys fall within the range, in scan order, after
    /// `skip` and capped at `limit`.
    pub fn scan(&self, view: &str, opts: &QueryOptions) -> Result<Vec<String>> {
        self.scan_live(view, opts, |_, _| true)
    }

    /// Like `scan`, but entries rejected by `is_live` are passed over before
    /// `skip` and `limit` apply.
    pub fn scan_live<F>(&self, view: &str, opts: &QueryOptions, is_live: F) -> Result<Vec<String>>
    where
        F: Fn(&str, Sequence) -> bool,
    {
        let (low, high) = opts.key_bounds()?;

        let views = self.views.read();
        let index = views
            .get(view)
            .ok_or_else(|| StoreError::UnknownView(view.to_string()))?;

        let range = index.entries.range((
            Bound::Included((low.clone(), Sequence(0), 0)),
            Bound::Included((high.clone(), Sequence(u64::MAX), u32::MAX)),
        ));
        let live = |((_, sequence, _), id): &(&EntryKey, &String)| {
            is_live(id.as_str(), *sequence)
        };

        let ids: Vec<String> = match opts.direction {
            Direction::Ascending => range
                .filter(live)
                .skip(opts.skip)
                .take(opts.take())
                .map(|(_, id)| id.clone())
                .collect(),
            Direction::Descending => range
                .rev()
                .filter(live)
                .skip(opts.skip)
                .take(opts.take())
                .map(|(_, id)| id.clone())
                .collect(),
        };
        Ok(ids)
    }

    /// Remove entries whose event is no longer live. Returns the number of
    /// entries dropped.
    pub fn purge<F>(&self, is_live: F) -> usize
    where
        F: Fn(&str, Sequence) -> bool,
    {
        let mut views = self.views.write();
        views
            .values_mut()
            .map(|index| {
                let before = index.entries.len();
                index
                    .entries
                    .retain(|(_, sequence, _), id| is_live(id.as_str(), *sequence));
                before - index.entries.len()
            })
            .sum()
    }

    /// Entries pointing at events that are no longer live.
    pub fn dangling<F>(&self, is_live: F) -> usize
    where
        F: Fn(&str, Sequence) -> bool,
    {
        self.views
            .read()
            .values()
            .map(|index| {
                index
                    .entries
                    .iter()
                    .filter(|((_, sequence, _), id)| !is_live(id.as_str(), *sequence))
                    .count()
            })
            .sum()
    }

    /// Entry count per view.
    pub fn entry_counts(&self) -> BTreeMap<String, usize> {
        self.views
            .read()
            .iter()
            .map(|(name, index)| (name.to_string(), index.entries.len()))
            .collect()
    }

    pub fn has_view(&self, view: &str) -> bool {
        self.views.read().contains_key(view)
    }

    pub fn view_names(&self) -> Vec<&'static str> {
        self.views.read().keys().copied().collect()
    }
}
