//! View definitions.

use super::key::IndexKey;
use crate::types::Event;
use std::fmt;

/// Map function of a view: pushes zero or more keys for an event.
///
/// Must be pure. The same event may emit the same key more than once; every
/// emission becomes its own index entry.
pub type MapFn = fn(&Event, &mut Vec<IndexKey>);

/// A named, statically registered index over the event log.
#[derive(Clone, Copy)]
pub struct ViewDefinition {
    pub name: &'static str,
    /// Bumped whenever `map` changes meaning. Two definitions with the same
    /// name and revision are considered identical.
    pub revision: u32,
    pub map: MapFn,
}

impl ViewDefinition {
    pub const fn new(name: &'static str, revision: u32, map: MapFn) -> Self {
        Self {
            name,
            revision,
            map,
        }
    }

    /// Keys this view emits for `event`.
    pub fn keys_for(&self, event: &Event) -> Vec<IndexKey> {
        let mut keys = Vec::new();
        (self.map)(event, &mut keys);
        keys
    }
}

impl fmt::Debug for ViewDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewDefinition")
            .field("name", &self.name)
            .field("revision", &self.revision)
            .finish()
    }
}

/// Outcome of registering a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The view was new and is now maintained.
    Created,
    /// An identical definition was already registered.
    Unchanged,
}
