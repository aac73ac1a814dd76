//! # Notestore
//!
//! A local store for signed social events (notes, profiles, direct
//! messages) with incrementally maintained secondary views, ordered range
//! queries, and a live change feed.
//!
//! ## Core Concepts
//!
//! - **Events**: Immutable records identified by their id, appended to a
//!   checksummed log
//! - **Views**: Named map functions from an event to index keys, kept up to
//!   date on every insertion
//! - **Queries**: Key-range scans over one view, ascending or descending,
//!   with skip and limit
//! - **Change feed**: Per-view subscriptions that see each new event once,
//!   in insertion order
//!
//! ## Example
//!
//! ```ignore
//! use notestore::{Event, EventStore, StoreConfig, KIND_TEXT_NOTE};
//!
//! let store = EventStore::open_or_create(StoreConfig {
//!     path: "./my-store".into(),
//!     ..Default::default()
//! })?;
//!
//! store.put(Event::new("alice", 1_700_000_000, KIND_TEXT_NOTE, vec![], "hello"))?;
//!
//! let feed = store.home_feed(None, None)?;
//! let _watch = store.watch_home_feed(|note| println!("{}", note.content))?;
//! ```

pub mod error;
pub mod events;
pub mod feed;
pub mod messages;
pub mod profiles;
pub mod query;
pub mod store;
pub mod timeline;
pub mod types;
pub mod views;

// Re-exports
pub use error::{Result, StoreError};
pub use events::{EventCache, EventIndex, EventLog};
pub use feed::{
    ChangeFeed, DropReason, EventPredicate, FeedEvent, Subscription, SubscriptionConfig,
    SubscriptionHandle, SubscriptionId,
};
pub use messages::{group_messages, group_messages_within, MessageCluster, MESSAGE_GROUP_WINDOW_SECS};
pub use profiles::{resolve_latest, Resolution};
pub use query::{Direction, QueryOptions, DEFAULT_QUERY_LIMIT};
pub use store::{CompactionSummary, EventStore, StoreConfig};
pub use timeline::{DEFAULT_FEED_LIMIT, DEFAULT_MENTIONS_LIMIT, DEFAULT_MESSAGES_LIMIT};
pub use types::*;
pub use views::{
    default_views, IndexKey, MapFn, Registration, ViewDefinition, ViewEngine, HOMEFEED, MENTIONS,
    MESSAGES, PROFILES,
};
