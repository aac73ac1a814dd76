//! Main EventStore struct tying all components together.

use crate::error::{Result, StoreError};
use crate::events::{EventCache, EventIndex, EventLog, LogEntry, LogFrame, Location};
use crate::feed::{ChangeFeed, Subscription, SubscriptionConfig, SubscriptionHandle, SubscriptionId};
use crate::profiles::resolve_latest;
use crate::query::QueryOptions;
use crate::types::{Event, Sequence, StoreStats};
use crate::views::{default_views, Registration, ViewDefinition, ViewEngine, PROFILES};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Event cache size (number of events).
    pub event_cache_size: usize,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Fsync the log every N writes.
    pub sync_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store"),
            event_cache_size: 1000,
            create_if_missing: true,
            sync_interval: EventLog::DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// What a `compact` call reclaimed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionSummary {
    /// View entries dropped because their event was removed.
    pub dangling_entries_removed: usize,
    /// Live events carried into the rewritten log.
    pub events_retained: usize,
    /// Whether the log file was rewritten.
    pub log_rewritten: bool,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"NST\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// The event store.
///
/// Provides a unified interface for:
/// - Storing, reading and removing events
/// - Maintaining the registered views on every insertion
/// - Range queries over views
/// - Live subscriptions to newly indexed events
///
/// All writes (put, remove, profile eviction, view registration, compaction)
/// go through one lock, so index updates and change notifications follow a
/// single total order. Reads never take that lock.
pub struct EventStore {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Event log.
    log: EventLog,

    /// Id to log offset.
    index: EventIndex,

    /// Recently used events.
    cache: EventCache,

    /// View indices.
    views: ViewEngine,

    /// Live subscriptions.
    feed: Arc<ChangeFeed>,

    /// Sequence of the last successful insertion.
    last_sequence: AtomicU64,

    /// Serialises every write.
    write_lock: Mutex<()>,

    /// Held for writing while the log is rewritten, so readers never follow
    /// a stale offset.
    rewrite_lock: RwLock<()>,
}

impl EventStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::load(config, lock_file)
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::load(config, lock_file)
    }

    /// Replay the log, rebuild the id index, and build the default views.
    fn load(config: StoreConfig, lock_file: File) -> Result<Self> {
        let log = EventLog::open_with_sync_interval(
            config.path.join("events.log"),
            config.sync_interval,
        )?;
        let entries = log.replay()?;
        let frames = entries.len();

        let index = EventIndex::new();
        let mut sequence = Sequence(0);
        let mut bodies: HashMap<u64, Event> = HashMap::new();

        for LogEntry { offset, frame } in entries {
            match frame {
                LogFrame::Put(event) => {
                    let next = sequence.next();
                    if index.insert(&event.id, Location { offset, sequence: next }) {
                        sequence = next;
                        bodies.insert(offset, event);
                    }
                }
                LogFrame::Remove(id) => {
                    if let Some(location) = index.remove(&id) {
                        bodies.remove(&location.offset);
                    }
                }
            }
        }

        let live: Vec<(Sequence, Event)> = index
            .live_in_order()
            .into_iter()
            .filter_map(|(_, loc)| bodies.remove(&loc.offset).map(|e| (loc.sequence, e)))
            .collect();

        let store = Self {
            cache: EventCache::new(config.event_cache_size),
            config,
            _lock_file: lock_file,
            log,
            index,
            views: ViewEngine::new(),
            feed: Arc::new(ChangeFeed::new()),
            last_sequence: AtomicU64::new(sequence.0),
            write_lock: Mutex::new(()),
            rewrite_lock: RwLock::new(()),
        };

        for definition in default_views() {
            let outcome = store.views.register(definition, || Ok(live.clone()));
            log_registration(definition, outcome);
        }

        info!(
            path = %store.config.path.display(),
            frames,
            events = live.len(),
            "opened event store"
        );
        Ok(store)
    }

    // --- Event Operations ---

    /// Store an event.
    ///
    /// Returns false, without touching anything, if an event with the same
    /// id is already stored. On insertion every view indexes the event and
    /// matching subscribers are notified before this returns.
    pub fn put(&self, event: Event) -> Result<bool> {
        let _lock = self.write_lock.lock();

        if self.index.contains(&event.id) {
            debug!(event_id = %event.id, "duplicate put ignored");
            return Ok(false);
        }

        let offset = self.log.append_put(&event)?;
        let sequence = Sequence(self.last_sequence.load(Ordering::Acquire)).next();
        self.index.insert(&event.id, Location { offset, sequence });
        self.last_sequence.store(sequence.0, Ordering::Release);

        let event = Arc::new(event);
        let views = self.views.on_insert(&event, sequence);
        self.cache.put(Arc::clone(&event));
        self.feed.broadcast(&views, sequence, &event);

        Ok(true)
    }

    /// Get an event by id.
    pub fn get(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.get_shared(id)?.map(|e| (*e).clone()))
    }

    fn get_shared(&self, id: &str) -> Result<Option<Arc<Event>>> {
        if let Some(event) = self.cache.get(id) {
            if self.index.contains(id) {
                return Ok(Some(event));
            }
        }

        let _rewrite = self.rewrite_lock.read();
        let Some(location) = self.index.get(id) else {
            return Ok(None);
        };
        let event = Arc::new(self.log.read_at(location.offset)?);
        self.cache.put(Arc::clone(&event));
        Ok(Some(event))
    }

    /// Whether an event is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Remove an event. Removing an unknown id is a no-op.
    ///
    /// View entries for the event stay until `compact` and are skipped by
    /// queries; no change notification is sent.
    pub fn remove(&self, id: &str) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.remove_locked(id).map(|_| ())
    }

    /// Whether a view entry written at `sequence` still belongs to the live
    /// copy of `id`. Entries from before a remove and re-put do not.
    fn is_live(&self, id: &str, sequence: Sequence) -> bool {
        self.index
            .get(id)
            .is_some_and(|location| location.sequence == sequence)
    }

    fn remove_locked(&self, id: &str) -> Result<Option<Location>> {
        if !self.index.contains(id) {
            return Ok(None);
        }
        self.log.append_remove(id)?;
        self.cache.evict(id);
        Ok(self.index.remove(id))
    }

    // --- Query Operations ---

    /// Events whose keys in `view` fall within the range, in scan order.
    ///
    /// Entries whose event has since been removed are passed over before
    /// `skip` and `limit` apply.
    pub fn query(&self, view: &str, opts: &QueryOptions) -> Result<Vec<Event>> {
        let ids = self.views.scan_live(view, opts, |id, seq| self.is_live(id, seq))?;
        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.get(&id)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// The newest profile of `pubkey`.
    ///
    /// When several profiles exist the newest by `created_at` wins (first
    /// stored on ties) and the others are removed from the store and from
    /// the profiles view. Runs under the write lock, so a profile stored
    /// concurrently is never lost.
    pub fn resolve_profile(&self, pubkey: &str) -> Result<Option<Event>> {
        let _lock = self.write_lock.lock();

        let ids = self.views.scan_live(
            PROFILES,
            &QueryOptions::key(pubkey).unlimited(),
            |id, seq| self.is_live(id, seq),
        )?;
        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.get(&id)? {
                candidates.push(event);
            }
        }

        let Some(resolution) = resolve_latest(candidates) else {
            return Ok(None);
        };

        for stale in &resolution.superseded {
            if let Some(location) = self.remove_locked(&stale.id)? {
                self.views.evict(PROFILES, stale, location.sequence);
                debug!(
                    pubkey,
                    event_id = %stale.id,
                    kept = %resolution.canonical.id,
                    "evicted superseded profile"
                );
            }
        }

        Ok(Some(resolution.canonical))
    }

    // --- View Operations ---

    /// Register an additional view, backfilling it from the stored events.
    ///
    /// Registering an identical definition again returns `Unchanged`. A
    /// different revision under an existing name fails with
    /// `DefinitionConflict` and leaves the existing view in place.
    pub fn register_view(&self, definition: ViewDefinition) -> Result<Registration> {
        let _lock = self.write_lock.lock();
        self.views.register(definition, || self.live_events())
    }

    /// Register several views, logging conflicts instead of failing.
    pub fn register_views<I>(&self, definitions: I)
    where
        I: IntoIterator<Item = ViewDefinition>,
    {
        for definition in definitions {
            let outcome = self.register_view(definition);
            log_registration(definition, outcome);
        }
    }

    /// Names of the registered views.
    pub fn view_names(&self) -> Vec<&'static str> {
        self.views.view_names()
    }

    fn live_events(&self) -> Result<Vec<(Sequence, Event)>> {
        self.index
            .live_in_order()
            .into_iter()
            .map(|(_, loc)| Ok((loc.sequence, self.log.read_at(loc.offset)?)))
            .collect()
    }

    // --- Subscription Operations ---

    /// Subscribe to events newly indexed by `config.view`.
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        self.ensure_view(&config.view)?;
        let _lock = self.write_lock.lock();
        Ok(self.feed.subscribe(config, self.current_sequence()))
    }

    /// Subscribe with a callback run on a dedicated delivery thread.
    pub fn subscribe_with<F>(&self, config: SubscriptionConfig, callback: F) -> Result<Subscription>
    where
        F: Fn(&Event) + Send + 'static,
    {
        self.ensure_view(&config.view)?;
        let _lock = self.write_lock.lock();
        self.feed
            .subscribe_with(config, self.current_sequence(), callback)
    }

    /// End a pull-style subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.feed.unsubscribe(id);
    }

    pub fn subscription_count(&self) -> usize {
        self.feed.subscription_count()
    }

    fn ensure_view(&self, view: &str) -> Result<()> {
        if self.views.has_view(view) {
            Ok(())
        } else {
            Err(StoreError::UnknownView(view.to_string()))
        }
    }

    // --- Store Operations ---

    /// Sequence of the most recent insertion.
    pub fn current_sequence(&self) -> Sequence {
        Sequence(self.last_sequence.load(Ordering::Acquire))
    }

    /// Reclaim space held by removed events.
    ///
    /// Drops view entries pointing at removed events and, if anything was
    /// removed since the last compaction, rewrites the log with only live
    /// events. Query results are unaffected.
    pub fn compact(&self) -> Result<CompactionSummary> {
        let _lock = self.write_lock.lock();
        let _rewrite = self.rewrite_lock.write();

        let dangling_entries_removed = self.views.purge(|id, seq| self.is_live(id, seq));
        let bytes_before = self.log.size();
        let live = self.index.live_in_order();

        let mut summary = CompactionSummary {
            dangling_entries_removed,
            events_retained: live.len(),
            log_rewritten: false,
            bytes_before,
            bytes_after: bytes_before,
        };

        if self.index.removed_count() > 0 {
            let events = live
                .iter()
                .map(|(_, loc)| self.log.read_at(loc.offset))
                .collect::<Result<Vec<_>>>()?;
            let offsets = self.log.rewrite(events.iter())?;
            let moved: Vec<(String, u64)> = live
                .into_iter()
                .map(|(id, _)| id)
                .zip(offsets)
                .collect();
            self.index.relocate(&moved);

            summary.log_rewritten = true;
            summary.bytes_after = self.log.size();
        }

        info!(
            dangling = summary.dangling_entries_removed,
            retained = summary.events_retained,
            bytes_before = summary.bytes_before,
            bytes_after = summary.bytes_after,
            "compacted event store"
        );
        Ok(summary)
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            event_count: self.index.count() as u64,
            removed_count: self.index.removed_count(),
            log_size_bytes: self.log.size(),
            view_entries: self.views.entry_counts(),
            dangling_entries: self.views.dangling(|id, seq| self.is_live(id, seq)),
        }
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        self.feed.close();
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

fn log_registration(definition: ViewDefinition, outcome: Result<Registration>) {
    match outcome {
        Ok(Registration::Created) => {
            debug!(view = definition.name, "view created");
        }
        Ok(Registration::Unchanged) => {}
        Err(e) => {
            warn!(view = definition.name, error = %e, "view registration failed; keeping existing definition");
        }
    }
}
