//! Live change feed.
//!
//! Subscribers register interest in one view and receive every event stored
//! afterwards that the view indexes, optionally narrowed by a predicate.
//! Each subscriber gets its own channel, so a slow or panicking subscriber
//! never holds up the writer or anyone else. Channels are unbounded unless
//! the subscriber opts into a cap, in which case overflowing drops it.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig::view(HOMEFEED))?;
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::Inserted { event, .. }) => println!("new note {}", event.id),
//!         Ok(FeedEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::{ChangeFeed, Subscription};
pub use types::{
    DropReason, EventPredicate, FeedEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
