//! Durable event storage.
//!
//! Events are appended to a checksummed log and located through an
//! in-memory id index that is rebuilt by replaying the log on open.

mod cache;
mod index;
mod log;

pub use cache::EventCache;
pub use index::{EventIndex, Location};
pub use log::{EventLog, LogEntry, LogFrame};
