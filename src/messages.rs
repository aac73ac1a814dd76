//! Grouping of direct messages into display clusters.
//!
//! Consecutive messages from the same author that start within
//! [`MESSAGE_GROUP_WINDOW_SECS`] of the first message of the current cluster
//! are shown together. The window is measured from the cluster's first
//! message, not from the previous one.

use crate::types::Event;

/// Grouping window in seconds.
pub const MESSAGE_GROUP_WINDOW_SECS: u64 = 120;

/// A run of messages rendered as one group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCluster {
    /// First message of the run.
    pub event: Event,
    /// Empty for a standalone message. Otherwise the whole run in order,
    /// starting with `event` itself.
    pub combination: Vec<Event>,
}

impl MessageCluster {
    fn single(event: Event) -> Self {
        Self {
            event,
            combination: Vec::new(),
        }
    }

    pub fn is_combined(&self) -> bool {
        !self.combination.is_empty()
    }

    /// Every message in the cluster, oldest first.
    pub fn messages(&self) -> &[Event] {
        if self.combination.is_empty() {
            std::slice::from_ref(&self.event)
        } else {
            &self.combination
        }
    }

    fn absorbs(&self, next: &Event, window: u64) -> bool {
        self.event.pubkey == next.pubkey
            && self.event.created_at.saturating_add(window) >= next.created_at
    }

    fn push(&mut self, next: Event) {
        if self.combination.is_empty() {
            self.combination.push(self.event.clone());
        }
        self.combination.push(next);
    }
}

/// Group time-ascending messages using the default window.
pub fn group_messages<I>(messages: I) -> Vec<MessageCluster>
where
    I: IntoIterator<Item = Event>,
{
    group_messages_within(messages, MESSAGE_GROUP_WINDOW_SECS)
}

/// Group time-ascending messages with a custom window.
pub fn group_messages_within<I>(messages: I, window: u64) -> Vec<MessageCluster>
where
    I: IntoIterator<Item = Event>,
{
    messages
        .into_iter()
        .fold(Vec::new(), |mut clusters: Vec<MessageCluster>, event| {
            match clusters.last_mut() {
                Some(last) if last.absorbs(&event, window) => last.push(event),
                _ => clusters.push(MessageCluster::single(event)),
            }
            clusters
        })
}
