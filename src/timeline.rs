//! Query presets used by the client: the home feed, conversations, and
//! mentions, plus their live counterparts.

use crate::error::Result;
use crate::feed::{Subscription, SubscriptionConfig};
use crate::messages::{group_messages, MessageCluster};
use crate::query::QueryOptions;
use crate::store::EventStore;
use crate::types::{unix_now, Event};
use crate::views::{IndexKey, HOMEFEED, MENTIONS, MESSAGES};

/// Page size of the home feed.
pub const DEFAULT_FEED_LIMIT: usize = 50;

/// Messages fetched per conversation page.
pub const DEFAULT_MESSAGES_LIMIT: usize = 50;

/// Page size of the mentions list.
pub const DEFAULT_MENTIONS_LIMIT: usize = 20;

impl EventStore {
    /// Text notes created at or before `since` (default: now), newest first.
    pub fn home_feed(&self, limit: Option<usize>, since: Option<u64>) -> Result<Vec<Event>> {
        let since = since.unwrap_or_else(unix_now);
        let opts = QueryOptions::range(since, IndexKey::Min)
            .descending()
            .limit(limit.unwrap_or(DEFAULT_FEED_LIMIT));
        self.query(HOMEFEED, &opts)
    }

    /// Call `callback` for every text note stored from now on.
    pub fn watch_home_feed<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&Event) + Send + 'static,
    {
        self.subscribe_with(SubscriptionConfig::view(HOMEFEED), callback)
    }

    /// The latest page of direct messages sent by or to `peer` at or before
    /// `since` (default: now), grouped into clusters, oldest first.
    pub fn messages_with(
        &self,
        peer: &str,
        limit: Option<usize>,
        since: Option<u64>,
    ) -> Result<Vec<MessageCluster>> {
        let since = since.unwrap_or_else(unix_now);
        let opts = QueryOptions::range(IndexKey::pair(peer, since), IndexKey::pair(peer, 0u64))
            .descending()
            .limit(limit.unwrap_or(DEFAULT_MESSAGES_LIMIT));

        let mut page = self.query(MESSAGES, &opts)?;
        page.reverse();
        Ok(group_messages(page))
    }

    /// Call `callback` for every direct message authored by or addressed to
    /// `peer` stored from now on.
    pub fn watch_messages<F>(&self, peer: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(&Event) + Send + 'static,
    {
        let peer = peer.to_string();
        let config = SubscriptionConfig::view(MESSAGES)
            .with_predicate(move |e: &Event| e.pubkey == peer || e.references_pubkey(&peer));
        self.subscribe_with(config, callback)
    }

    /// Events that tag `user`, newest first, skipping the first `skip`.
    pub fn mentions(&self, user: &str, limit: Option<usize>, skip: usize) -> Result<Vec<Event>> {
        let opts = QueryOptions::range(
            IndexKey::pair(user, IndexKey::Max),
            IndexKey::tuple([user]),
        )
        .descending()
        .limit(limit.unwrap_or(DEFAULT_MENTIONS_LIMIT))
        .skip(skip);
        self.query(MENTIONS, &opts)
    }
}
