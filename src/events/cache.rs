//! LRU cache of decoded events.

use crate::types::Event;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Recently read or written events, keyed by id.
pub struct EventCache {
    cache: Mutex<LruCache<String, Arc<Event>>>,
}

impl EventCache {
    /// Create a cache holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Event>> {
        self.cache.lock().get(id).cloned()
    }

    pub fn put(&self, event: Arc<Event>) {
        self.cache.lock().put(event.id.clone(), event);
    }

    pub fn evict(&self, id: &str) {
        self.cache.lock().pop(id);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}
