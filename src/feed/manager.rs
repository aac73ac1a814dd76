//! Change feed: routes newly indexed events to subscribers.

use crate::error::Result;
use crate::types::{Event, Sequence};
use crossbeam_channel::{bounded, unbounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, warn};

use super::types::{
    DropReason, FeedEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Registered {
    view: String,
    sender: Sender<FeedEvent>,
}

/// Fans stored events out to per-subscriber channels.
///
/// `broadcast` never blocks: each subscriber has its own queue. Queues are
/// unbounded by default; a subscriber that asked for a capped queue and
/// falls too far behind is dropped instead of stalling the writer.
pub struct ChangeFeed {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Registered>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a pull-style subscription. Only events broadcast after this
    /// call are delivered; `since` is recorded on the handle.
    pub fn subscribe(&self, config: SubscriptionConfig, since: Sequence) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = match config.buffer_size {
            Some(cap) => bounded(cap.max(1)),
            None => unbounded(),
        };

        self.subscriptions.write().insert(
            id,
            Registered {
                view: config.view,
                sender,
            },
        );

        SubscriptionHandle {
            id,
            since,
            receiver,
            predicate: config.predicate,
        }
    }

    /// Register a push-style subscription.
    ///
    /// `callback` runs on a dedicated delivery thread, once per accepted event
    /// and in insertion order. A panic inside the callback is caught and
    /// logged; the subscription stays active.
    pub fn subscribe_with<F>(
        self: &Arc<Self>,
        config: SubscriptionConfig,
        since: Sequence,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(&Event) + Send + 'static,
    {
        let handle = self.subscribe(config, since);
        let id = handle.id;
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_cancelled = Arc::clone(&cancelled);

        let spawned = thread::Builder::new()
            .name(format!("feed-{id}"))
            .spawn(move || deliver(handle, worker_cancelled, callback));

        if let Err(e) = spawned {
            self.unsubscribe(id);
            return Err(e.into());
        }

        Ok(Subscription {
            id,
            since,
            cancelled,
            feed: Arc::downgrade(self),
        })
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort; the receiver may already be gone.
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver `event` to every subscriber of one of `views`.
    ///
    /// Called by the writer, in insertion order, so each subscriber observes
    /// events in the order they were stored.
    pub fn broadcast(&self, views: &[&str], sequence: Sequence, event: &Arc<Event>) {
        if views.is_empty() {
            return;
        }

        let mut overflowed = Vec::new();
        let mut disconnected = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !views.contains(&sub.view.as_str()) {
                    continue;
                }
                let message = FeedEvent::Inserted {
                    sequence,
                    event: Arc::clone(event),
                };
                match sub.sender.try_send(message) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => overflowed.push(*id),
                    Err(TrySendError::Disconnected(_)) => disconnected.push(*id),
                }
            }
        }

        if overflowed.is_empty() && disconnected.is_empty() {
            return;
        }

        let mut subs = self.subscriptions.write();
        for id in disconnected {
            subs.remove(&id);
            debug!(subscription = %id, "removed subscription with no receiver");
        }
        for id in overflowed {
            if let Some(sub) = subs.remove(&id) {
                warn!(subscription = %id, view = %sub.view, "dropping slow subscriber");
                // The buffer is full, so this usually fails; the closed
                // channel still tells the receiver it is done.
                let _ = sub.sender.try_send(FeedEvent::Dropped {
                    reason: DropReason::BufferOverflow,
                });
            }
        }
    }

    /// End every subscription.
    pub fn close(&self) {
        let mut subs = self.subscriptions.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Closed,
            });
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery loop of a push-style subscription.
fn deliver<F>(handle: SubscriptionHandle, cancelled: Arc<AtomicBool>, callback: F)
where
    F: Fn(&Event),
{
    while let Ok(message) = handle.recv() {
        if cancelled.load(Ordering::Acquire) {
            break;
        }
        match message {
            FeedEvent::Inserted { event, .. } => {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                    warn!(
                        subscription = %handle.id,
                        event_id = %event.id,
                        reason = panic_message(panic.as_ref()),
                        "subscriber callback panicked"
                    );
                }
            }
            FeedEvent::Dropped { reason } => {
                debug!(subscription = %handle.id, ?reason, "subscription ended");
                break;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// A live push-style subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    since: Sequence,
    cancelled: Arc<AtomicBool>,
    feed: Weak<ChangeFeed>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Store sequence when the subscription was made.
    pub fn since(&self) -> Sequence {
        self.since
    }

    /// Stop delivery. Events already handed to the delivery thread may still
    /// reach the callback once.
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
            && self
                .feed
                .upgrade()
                .map(|feed| feed.subscriptions.read().contains_key(&self.id))
                .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(feed) = self.feed.upgrade() {
            feed.unsubscribe(self.id);
        }
    }
}
