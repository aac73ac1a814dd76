//! Change feed types.

use crate::types::{Event, Sequence};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Extra condition an event must meet to be delivered.
pub type EventPredicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Configuration for a subscription.
#[derive(Clone)]
pub struct SubscriptionConfig {
    /// View whose newly indexed events are delivered.
    pub view: String,

    /// Max undelivered events before the subscriber is dropped.
    /// `None` (the default) queues without bound and never drops.
    pub buffer_size: Option<usize>,

    /// Narrows delivery to events the predicate accepts. Evaluated on the
    /// receiving side, never on the writer.
    pub predicate: Option<EventPredicate>,
}

impl SubscriptionConfig {
    /// Subscribe to everything `view` indexes.
    pub fn view(view: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            buffer_size: None,
            predicate: None,
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Cap the queue at `buffer_size` events. A subscriber that falls that
    /// far behind is dropped with `DropReason::BufferOverflow`.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }
}

impl fmt::Debug for SubscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionConfig")
            .field("view", &self.view)
            .field("buffer_size", &self.buffer_size)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Events delivered to subscribers.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    /// An event was stored and indexed by the subscribed view.
    Inserted {
        sequence: Sequence,
        event: Arc<Event>,
    },

    /// The subscription ended; nothing follows.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The store shut down.
    Closed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pull-style handle to a subscription.
///
/// Receive methods silently skip events the predicate rejects.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Store sequence when the subscription was made; every delivered
    /// event has a greater sequence.
    pub since: Sequence,
    pub(crate) receiver: Receiver<FeedEvent>,
    pub(crate) predicate: Option<EventPredicate>,
}

impl SubscriptionHandle {
    fn accepts(&self, feed_event: &FeedEvent) -> bool {
        let (FeedEvent::Inserted { event, .. }, Some(predicate)) = (feed_event, &self.predicate)
        else {
            return true;
        };
        match catch_unwind(AssertUnwindSafe(|| predicate(&**event))) {
            Ok(accepted) => accepted,
            Err(_) => {
                warn!(subscription = %self.id, event_id = %event.id, "subscription predicate panicked");
                false
            }
        }
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<FeedEvent, RecvError> {
        loop {
            let event = self.receiver.recv()?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<FeedEvent, TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<FeedEvent, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            let event = self.receiver.recv_deadline(deadline)?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Drain everything currently buffered that passes the predicate.
    pub fn drain(&self) -> Vec<FeedEvent> {
        std::iter::from_fn(|| self.try_recv().ok()).collect()
    }
}
