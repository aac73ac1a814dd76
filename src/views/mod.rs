//! Secondary indices over the event log.
//!
//! A view is a pure map function from an event to zero or more index keys.
//! The engine keeps one ordered index per view and updates every index
//! synchronously as each event is stored; nothing is rebuilt in the
//! background. Entries point back at the event by id, and the event itself
//! is re-read from the log when a query needs it.
//!
//! # Example
//!
//! ```ignore
//! let engine = ViewEngine::new();
//! for def in default_views() {
//!     engine.register(def, || Ok(Vec::new()))?;
//! }
//! engine.on_insert(&event, Sequence(1));
//!
//! let newest = engine.scan(HOMEFEED, &QueryOptions::range(now, IndexKey::Min).descending())?;
//! ```

mod builtin;
mod definition;
mod engine;
mod key;

pub use builtin::{default_views, HOMEFEED, MENTIONS, MESSAGES, PROFILES};
pub use definition::{MapFn, Registration, ViewDefinition};
pub use engine::ViewEngine;
pub use key::IndexKey;
