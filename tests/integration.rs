//! Integration tests for the event store.

use notestore::{
    Event, EventStore, IndexKey, QueryOptions, Registration, StoreConfig, StoreError, Tag,
    ViewDefinition, HOMEFEED, KIND_ENCRYPTED_DM, KIND_METADATA, KIND_TEXT_NOTE, MENTIONS,
    PROFILES,
};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("store"),
        event_cache_size: 100,
        create_if_missing: true,
        sync_interval: 1,
    }
}

fn test_store(dir: &TempDir) -> EventStore {
    EventStore::create(test_config(dir)).unwrap()
}

fn note(author: &str, at: u64, content: &str) -> Event {
    Event::new(author, at, KIND_TEXT_NOTE, vec![], content)
}

fn mention(author: &str, target: &str, at: u64) -> Event {
    Event::new(author, at, KIND_TEXT_NOTE, vec![Tag::pubkey(target)], format!("hey {target}"))
}

fn dm(from: &str, to: &str, at: u64) -> Event {
    Event::new(from, at, KIND_ENCRYPTED_DM, vec![Tag::pubkey(to)], format!("ciphertext-{at}"))
}

fn profile(author: &str, at: u64, name: &str) -> Event {
    Event::new(author, at, KIND_METADATA, vec![], format!("{{\"name\":\"{name}\"}}"))
}

fn times(events: &[Event]) -> Vec<u64> {
    events.iter().map(|e| e.created_at).collect()
}

// --- Basic Operations ---

#[test]
fn test_put_and_get() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let event = note("alice", 100, "hello");
    assert!(store.put(event.clone()).unwrap());

    assert_eq!(store.get(&event.id).unwrap(), Some(event.clone()));
    assert!(store.contains(&event.id));
    assert!(store.get("missing").unwrap().is_none());
}

#[test]
fn test_duplicate_put_is_ignored() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let event = note("alice", 100, "hello");
    assert!(store.put(event.clone()).unwrap());
    let size = store.stats().log_size_bytes;

    assert!(!store.put(event.clone()).unwrap());
    assert_eq!(store.stats().log_size_bytes, size);
    assert_eq!(store.stats().event_count, 1);
    assert_eq!(store.home_feed(None, Some(1_000)).unwrap().len(), 1);
}

#[test]
fn test_remove() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let event = note("alice", 100, "hello");
    store.put(event.clone()).unwrap();
    store.remove(&event.id).unwrap();

    assert!(store.get(&event.id).unwrap().is_none());
    assert!(!store.contains(&event.id));
    assert!(store.home_feed(None, Some(1_000)).unwrap().is_empty());

    // Removing again, or removing something never stored, is a no-op.
    store.remove(&event.id).unwrap();
    store.remove("never-stored").unwrap();
    assert_eq!(store.stats().removed_count, 1);
}

#[test]
fn test_put_after_remove_reinserts() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let event = note("alice", 100, "hello");
    store.put(event.clone()).unwrap();
    store.remove(&event.id).unwrap();
    assert!(store.put(event.clone()).unwrap());

    let feed = store.home_feed(None, Some(1_000)).unwrap();
    assert_eq!(feed, vec![event]);
}

// --- Timeline Presets ---

#[test]
fn test_home_feed_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    for at in [300, 100, 500, 200, 400] {
        store.put(note("alice", at, &format!("n{at}"))).unwrap();
    }
    // Non-notes never show up in the home feed.
    store.put(profile("alice", 250, "alice")).unwrap();
    store.put(dm("alice", "bob", 350)).unwrap();

    let feed = store.home_feed(None, Some(1_000)).unwrap();
    assert_eq!(times(&feed), vec![500, 400, 300, 200, 100]);
}

#[test]
fn test_home_feed_since_and_limit() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    for at in (1..=10).map(|i| i * 100) {
        store.put(note("alice", at, &format!("n{at}"))).unwrap();
    }

    let page = store.home_feed(Some(3), Some(650)).unwrap();
    assert_eq!(times(&page), vec![600, 500, 400]);

    // `since` is inclusive.
    let page = store.home_feed(Some(2), Some(400)).unwrap();
    assert_eq!(times(&page), vec![400, 300]);
}

#[test]
fn test_home_feed_defaults_to_now() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.put(note("alice", 1_000, "past")).unwrap();
    store.put(note("alice", u64::MAX / 2, "far future")).unwrap();

    let feed = store.home_feed(None, None).unwrap();
    assert_eq!(times(&feed), vec![1_000]);
}

#[test]
fn test_home_feed_since_before_everything_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.put(note("alice", 500, "later")).unwrap();
    assert!(store.home_feed(None, Some(100)).unwrap().is_empty());
}

#[test]
fn test_equal_timestamps_keep_insertion_order() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let first = note("alice", 100, "first");
    let second = note("bob", 100, "second");
    store.put(first.clone()).unwrap();
    store.put(second.clone()).unwrap();

    let asc = store
        .query(HOMEFEED, &QueryOptions::key(100u64))
        .unwrap();
    assert_eq!(asc, vec![first.clone(), second.clone()]);

    let desc = store
        .query(HOMEFEED, &QueryOptions::key(100u64).descending())
        .unwrap();
    assert_eq!(desc, vec![second, first]);
}

#[test]
fn test_mentions_pagination() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    for at in [10, 20, 30, 40, 50] {
        store.put(mention("carol", "bob", at)).unwrap();
    }
    store.put(mention("carol", "dave", 35)).unwrap();
    store.put(note("carol", 45, "no tags")).unwrap();

    let first = store.mentions("bob", Some(2), 0).unwrap();
    assert_eq!(times(&first), vec![50, 40]);

    let second = store.mentions("bob", Some(2), 2).unwrap();
    assert_eq!(times(&second), vec![30, 20]);

    let rest = store.mentions("bob", None, 4).unwrap();
    assert_eq!(times(&rest), vec![10]);

    assert!(store.mentions("nobody", None, 0).unwrap().is_empty());
}

#[test]
fn test_mentions_include_event_references() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let original = note("alice", 10, "root");
    store.put(original.clone()).unwrap();
    let reply = Event::new(
        "bob",
        20,
        KIND_TEXT_NOTE,
        vec![Tag::event(&original.id), Tag::pubkey("alice")],
        "reply",
    );
    store.put(reply.clone()).unwrap();

    assert_eq!(store.mentions(&original.id, None, 0).unwrap(), vec![reply.clone()]);
    assert_eq!(store.mentions("alice", None, 0).unwrap(), vec![reply]);
}

#[test]
fn test_messages_grouped_into_clusters() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.put(dm("alice", "bob", 1_000)).unwrap();
    store.put(dm("alice", "bob", 1_030)).unwrap();
    store.put(dm("alice", "bob", 1_300)).unwrap();

    let clusters = store.messages_with("bob", None, Some(2_000)).unwrap();
    assert_eq!(clusters.len(), 2);

    assert!(clusters[0].is_combined());
    assert_eq!(times(clusters[0].messages()), vec![1_000, 1_030]);
    assert_eq!(clusters[0].event.created_at, 1_000);

    assert!(!clusters[1].is_combined());
    assert_eq!(clusters[1].event.created_at, 1_300);
}

#[test]
fn test_messages_cover_both_directions() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.put(dm("alice", "bob", 100)).unwrap();
    store.put(dm("bob", "alice", 110)).unwrap();
    store.put(dm("carol", "dave", 120)).unwrap();

    let clusters = store.messages_with("bob", None, Some(1_000)).unwrap();
    let authors: Vec<&str> = clusters.iter().map(|c| c.event.pubkey.as_str()).collect();
    assert_eq!(authors, vec!["alice", "bob"]);
}

#[test]
fn test_messages_page_is_latest_window() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    // Spaced beyond the grouping window so each message is its own cluster.
    for at in (1..=5).map(|i| i * 1_000) {
        store.put(dm("alice", "bob", at)).unwrap();
    }

    let clusters = store.messages_with("bob", Some(3), Some(10_000)).unwrap();
    let at: Vec<u64> = clusters.iter().map(|c| c.event.created_at).collect();
    assert_eq!(at, vec![3_000, 4_000, 5_000]);
}

// --- Profiles ---

#[test]
fn test_profile_resolution_evicts_older_copies() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let old = profile("alice", 100, "old");
    let new = profile("alice", 200, "new");
    let mid = profile("alice", 150, "mid");
    let other = profile("bob", 50, "bob");
    for event in [&old, &new, &mid, &other] {
        store.put(event.clone()).unwrap();
    }

    let resolved = store.resolve_profile("alice").unwrap().unwrap();
    assert_eq!(resolved, new);

    assert!(store.get(&old.id).unwrap().is_none());
    assert!(store.get(&mid.id).unwrap().is_none());
    assert!(store.get(&other.id).unwrap().is_some());

    let indexed = store
        .query(PROFILES, &QueryOptions::key("alice"))
        .unwrap();
    assert_eq!(indexed, vec![new.clone()]);
    assert_eq!(store.stats().view_entries[PROFILES], 2);

    // Resolving again is stable.
    assert_eq!(store.resolve_profile("alice").unwrap(), Some(new));
}

#[test]
fn test_profile_tie_keeps_first_stored() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let first = profile("alice", 100, "first");
    let second = profile("alice", 100, "second");
    store.put(first.clone()).unwrap();
    store.put(second.clone()).unwrap();

    assert_eq!(store.resolve_profile("alice").unwrap(), Some(first));
    assert!(store.get(&second.id).unwrap().is_none());
}

#[test]
fn test_unknown_profile() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    assert!(store.resolve_profile("nobody").unwrap().is_none());
}

// --- Views ---

fn map_long_notes(event: &Event, emit: &mut Vec<IndexKey>) {
    if event.kind == KIND_TEXT_NOTE && event.content.len() > 10 {
        emit.push(IndexKey::pair(&event.pubkey, event.created_at));
    }
}

const LONG_NOTES: ViewDefinition = ViewDefinition::new("long_notes", 1, map_long_notes);

#[test]
fn test_register_view_backfills() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.put(note("alice", 1, "short")).unwrap();
    store.put(note("alice", 2, "this one is long")).unwrap();

    assert_eq!(store.register_view(LONG_NOTES).unwrap(), Registration::Created);
    store.put(note("alice", 3, "another long note")).unwrap();

    let got = store
        .query(
            "long_notes",
            &QueryOptions::range(IndexKey::tuple(["alice"]), IndexKey::pair("alice", IndexKey::Max)),
        )
        .unwrap();
    assert_eq!(times(&got), vec![2, 3]);

    assert_eq!(store.register_view(LONG_NOTES).unwrap(), Registration::Unchanged);
}

#[test]
fn test_register_view_conflict() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let replacement = ViewDefinition::new(HOMEFEED, 2, map_long_notes);
    let result = store.register_view(replacement);
    assert!(matches!(
        result,
        Err(StoreError::DefinitionConflict { existing: 1, proposed: 2, .. })
    ));

    // The existing definition is still in use.
    store.put(note("alice", 5, "short")).unwrap();
    assert_eq!(store.home_feed(None, Some(10)).unwrap().len(), 1);
}

#[test]
fn test_default_views_registered() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let mut names = store.view_names();
    names.sort_unstable();
    assert_eq!(names, vec![HOMEFEED, MENTIONS, "messages", PROFILES]);
}

// --- Persistence ---

#[test]
fn test_reopen_rebuilds_views() {
    let dir = TempDir::new().unwrap();
    let removed;
    {
        let store = test_store(&dir);
        store.put(note("alice", 100, "one")).unwrap();
        store.put(note("alice", 200, "two")).unwrap();
        store.put(mention("bob", "alice", 300)).unwrap();
        store.put(dm("alice", "bob", 400)).unwrap();
        removed = note("alice", 250, "gone");
        store.put(removed.clone()).unwrap();
        store.remove(&removed.id).unwrap();
    }

    let store = EventStore::open(test_config(&dir)).unwrap();
    assert_eq!(store.stats().event_count, 4);
    assert!(store.get(&removed.id).unwrap().is_none());

    let feed = store.home_feed(None, Some(1_000)).unwrap();
    assert_eq!(times(&feed), vec![300, 200, 100]);
    assert_eq!(store.mentions("alice", None, 0).unwrap().len(), 1);
    assert_eq!(store.messages_with("alice", None, Some(1_000)).unwrap().len(), 1);

    // Indices are rebuilt without the removed event's entries.
    assert_eq!(store.stats().dangling_entries, 0);
}

#[test]
fn test_reopen_preserves_equal_timestamp_order() {
    let dir = TempDir::new().unwrap();
    let ids: Vec<String>;
    {
        let store = test_store(&dir);
        ids = (0..5)
            .map(|i| {
                let event = note(&format!("author{i}"), 100, "same time");
                store.put(event.clone()).unwrap();
                event.id
            })
            .collect();
    }

    let store = EventStore::open(test_config(&dir)).unwrap();
    let got: Vec<String> = store
        .query(HOMEFEED, &QueryOptions::key(100u64))
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(got, ids);
}

#[test]
fn test_profile_resolution_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let new = profile("alice", 200, "new");
    {
        let store = test_store(&dir);
        store.put(profile("alice", 100, "old")).unwrap();
        store.put(new.clone()).unwrap();
        store.resolve_profile("alice").unwrap();
    }

    let store = EventStore::open(test_config(&dir)).unwrap();
    let indexed = store.query(PROFILES, &QueryOptions::key("alice")).unwrap();
    assert_eq!(indexed, vec![new]);
}

// --- Compaction ---

#[test]
fn test_compact_drops_dangling_entries() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let notes: Vec<Event> = (1..=10).map(|i| note("alice", i * 10, &format!("n{i}"))).collect();
    for event in &notes {
        store.put(event.clone()).unwrap();
    }
    for event in notes.iter().take(3) {
        store.remove(&event.id).unwrap();
    }

    let before = store.home_feed(None, Some(1_000)).unwrap();
    assert_eq!(store.stats().dangling_entries, 3);

    let summary = store.compact().unwrap();
    assert_eq!(summary.dangling_entries_removed, 3);
    assert_eq!(summary.events_retained, 7);
    assert!(summary.log_rewritten);
    assert!(summary.bytes_after < summary.bytes_before);

    let stats = store.stats();
    assert_eq!(stats.dangling_entries, 0);
    assert_eq!(stats.removed_count, 0);
    assert_eq!(stats.view_entries[HOMEFEED], 7);

    assert_eq!(store.home_feed(None, Some(1_000)).unwrap(), before);

    // Writes after compaction land in the rewritten log.
    store.put(note("alice", 999, "after")).unwrap();
    drop(store);

    let store = EventStore::open(test_config(&dir)).unwrap();
    let feed = store.home_feed(None, Some(1_000)).unwrap();
    assert_eq!(feed.len(), 8);
    assert_eq!(feed[0].created_at, 999);
}

#[test]
fn test_compact_without_removals_keeps_log() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.put(note("alice", 1, "kept")).unwrap();
    let summary = store.compact().unwrap();

    assert!(!summary.log_rewritten);
    assert_eq!(summary.dangling_entries_removed, 0);
    assert_eq!(summary.bytes_before, summary.bytes_after);
}

// --- Stats ---

#[test]
fn test_stats() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.put(note("alice", 1, "plain")).unwrap();
    store.put(mention("alice", "bob", 2)).unwrap();
    store.put(dm("alice", "bob", 3)).unwrap();
    store.put(profile("alice", 4, "alice")).unwrap();

    let stats = store.stats();
    assert_eq!(stats.event_count, 4);
    assert_eq!(stats.removed_count, 0);
    assert!(stats.log_size_bytes > 0);
    assert_eq!(stats.view_entries[HOMEFEED], 2);
    assert_eq!(stats.view_entries[MENTIONS], 1);
    // One entry for the recipient, one for the sender.
    assert_eq!(stats.view_entries["messages"], 2);
    assert_eq!(stats.view_entries[PROFILES], 1);
}

#[test]
fn test_wire_json_round_trip_through_store() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let event = mention("alice", "bob", 42);
    let wire = event.to_json().unwrap();
    store.put(Event::from_json(&wire).unwrap()).unwrap();

    let stored = store.get(&event.id).unwrap().unwrap();
    assert_eq!(stored.to_json().unwrap(), wire);
}
