//! Core types for the event store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Profile metadata.
pub const KIND_METADATA: u32 = 0;

/// Public text note.
pub const KIND_TEXT_NOTE: u32 = 1;

/// Encrypted direct message.
pub const KIND_ENCRYPTED_DM: u32 = 4;

/// Tag name referencing a pubkey.
pub const TAG_PUBKEY: &str = "p";

/// Tag name referencing another event.
pub const TAG_EVENT: &str = "e";

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Position of an insertion in the store's single writer stream.
///
/// Assigned on every successful `put`; strictly increasing for the lifetime
/// of a store instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// A tag attached to an event: `["p", "<pubkey>", ...]`.
///
/// The first element names the tag, the rest is tag-specific data. Tags are
/// kept verbatim so unknown tag names survive a round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(parts.into_iter().map(Into::into).collect())
    }

    /// Shorthand for a `["p", pubkey]` tag.
    pub fn pubkey(pubkey: impl Into<String>) -> Self {
        Tag(vec![TAG_PUBKEY.to_string(), pubkey.into()])
    }

    /// Shorthand for an `["e", event_id]` tag.
    pub fn event(id: impl Into<String>) -> Self {
        Tag(vec![TAG_EVENT.to_string(), id.into()])
    }

    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The first data element (the referenced pubkey or id).
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// An immutable signed event.
///
/// ```json
/// {
///   "id": "5c83...",
///   "pubkey": "79be...",
///   "created_at": 1700000000,
///   "kind": 1,
///   "tags": [["p", "a1b2..."], ["e", "ff00..."]],
///   "content": "hello",
///   "sig": "9e2c..."
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Content-derived identifier (hex SHA-256).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Author-supplied Unix timestamp in seconds.
    pub created_at: u64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
    /// Opaque here; verification happens before events reach the store.
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Build an unsigned event with its id computed from the content.
    pub fn new(
        pubkey: impl Into<String>,
        created_at: u64,
        kind: u32,
        tags: Vec<Tag>,
        content: impl Into<String>,
    ) -> Self {
        let mut event = Event {
            id: String::new(),
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags,
            content: content.into(),
            sig: String::new(),
        };
        event.id = event.compute_id();
        event
    }

    /// Compute the canonical id: hex SHA-256 over
    /// `[0, pubkey, created_at, kind, tags, content]` serialized compactly.
    pub fn compute_id(&self) -> String {
        let canonical = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        hex::encode(digest)
    }

    /// Parse an event from its wire JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Values of every tag named `name`, in tag order. Tags without a value
    /// are skipped.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.name() == Some(name))
            .filter_map(Tag::value)
    }

    /// Whether a `p` tag points at `pubkey`.
    pub fn references_pubkey(&self, pubkey: &str) -> bool {
        self.tag_values(TAG_PUBKEY).any(|v| v == pubkey)
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    /// Live events.
    pub event_count: u64,
    /// Events removed since the log was last compacted.
    pub removed_count: u64,
    pub log_size_bytes: u64,
    /// Index entries per view, including dangling ones.
    pub view_entries: BTreeMap<String, usize>,
    /// View entries pointing at removed events.
    pub dangling_entries: usize,
}
