//! Client/feed subscription table.
//!
//! Subscription state is indexed twice, client → feed → state and
//! feed → client → state, so that both "all feeds of a client" and "all
//! clients of a feed" are direct lookups. Both indices change only
//! through [`FeedTable::set`], [`FeedTable::terminate`] and
//! [`FeedTable::remove_client`], and always hold the same triples.
//!
//! A missing entry means the feed is closed for that client. Feeds with no
//! subscribers are not stored.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::identifiers::ClientId;
use crate::protocol::{Feed, FeedKey};

use super::timer::Timer;

// ============================================================================
// FeedState
// ============================================================================

/// Subscription state of one (client, feed) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// Open requested, waiting on the application.
    Opening,
    /// Open; receives revelations.
    Open,
    /// Close requested, waiting on the application.
    Closing,
    /// Terminated by the server; forgotten on close or timer.
    Terminated,
}

// ============================================================================
// FeedTable
// ============================================================================

#[derive(Default)]
pub(crate) struct FeedTable {
    client_feeds: FxHashMap<ClientId, FxHashMap<FeedKey, FeedState>>,
    feed_clients: FxHashMap<FeedKey, FxHashMap<ClientId, FeedState>>,
    /// Name and arguments behind each stored key.
    feeds: FxHashMap<FeedKey, Feed>,
    /// One per terminated entry at most.
    termination_timers: FxHashMap<(ClientId, FeedKey), Timer>,
}

impl FeedTable {
    /// Returns the state of a (client, feed) pair, `None` when closed.
    pub(crate) fn state(&self, client_id: ClientId, key: &FeedKey) -> Option<FeedState> {
        self.client_feeds
            .get(&client_id)
            .and_then(|feeds| feeds.get(key))
            .copied()
    }

    /// Returns the feed stored under `key`.
    pub(crate) fn feed(&self, key: &FeedKey) -> Option<&Feed> {
        self.feeds.get(key)
    }

    /// Sets or clears the state of a (client, feed) pair in both indices.
    ///
    /// Any termination timer on the pair is canceled.
    pub(crate) fn set(&mut self, client_id: ClientId, feed: &Feed, state: Option<FeedState>) {
        let key = feed.key();

        if let Some(timer) = self.termination_timers.remove(&(client_id, key.clone())) {
            timer.cancel();
        }

        match state {
            Some(state) => {
                self.client_feeds
                    .entry(client_id)
                    .or_default()
                    .insert(key.clone(), state);
                self.feed_clients
                    .entry(key.clone())
                    .or_default()
                    .insert(client_id, state);
                self.feeds
                    .entry(key.clone())
                    .or_insert_with(|| feed.clone());
            }

            None => self.remove_entry(client_id, key),
        }
    }

    /// Marks an entry terminated, optionally owning a forget timer.
    pub(crate) fn terminate(&mut self, client_id: ClientId, feed: &Feed, timer: Option<Timer>) {
        self.set(client_id, feed, Some(FeedState::Terminated));
        if let Some(timer) = timer {
            self.termination_timers
                .insert((client_id, feed.key().clone()), timer);
        }
    }

    /// Deletes a terminated entry if its timer token still matches.
    ///
    /// Returns `true` if the entry was forgotten.
    pub(crate) fn forget_terminated(&mut self, client_id: ClientId, key: &FeedKey, token: u64) -> bool {
        let timer_key = (client_id, key.clone());
        if self.termination_timers.get(&timer_key).map(Timer::token) != Some(token) {
            return false;
        }

        self.termination_timers.remove(&timer_key);
        if self.state(client_id, key) == Some(FeedState::Terminated) {
            self.remove_entry(client_id, key);
        }
        true
    }

    /// Removes every entry of a client and cancels its timers.
    ///
    /// Returns the feeds the client held.
    pub(crate) fn remove_client(&mut self, client_id: ClientId) -> Vec<FeedKey> {
        let Some(feeds) = self.client_feeds.remove(&client_id) else {
            return Vec::new();
        };

        let keys: Vec<FeedKey> = feeds.into_keys().collect();
        for key in &keys {
            if let Some(timer) = self.termination_timers.remove(&(client_id, key.clone())) {
                timer.cancel();
            }
            self.remove_feed_side(client_id, key);
        }
        keys
    }

    /// Returns the feeds a client holds, with state.
    pub(crate) fn feeds_of(&self, client_id: ClientId) -> Vec<(FeedKey, FeedState)> {
        self.client_feeds
            .get(&client_id)
            .map(|feeds| feeds.iter().map(|(k, s)| (k.clone(), *s)).collect())
            .unwrap_or_default()
    }

    /// Returns the clients subscribed to a feed, with state.
    pub(crate) fn clients_of(&self, key: &FeedKey) -> Vec<(ClientId, FeedState)> {
        self.feed_clients
            .get(key)
            .map(|clients| clients.iter().map(|(c, s)| (*c, *s)).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if a termination timer is running for the pair.
    pub(crate) fn has_timer(&self, client_id: ClientId, key: &FeedKey) -> bool {
        self.termination_timers
            .contains_key(&(client_id, key.clone()))
    }

    /// Returns `true` if the client appears in any index.
    pub(crate) fn has_client(&self, client_id: ClientId) -> bool {
        self.client_feeds.contains_key(&client_id)
            || self
                .feed_clients
                .values()
                .any(|clients| clients.contains_key(&client_id))
            || self.termination_timers.keys().any(|(c, _)| *c == client_id)
    }

    /// Checks that both indices hold identical triples and no empty rows.
    pub(crate) fn is_consistent(&self) -> bool {
        let forward: usize = self.client_feeds.values().map(FxHashMap::len).sum();
        let backward: usize = self.feed_clients.values().map(FxHashMap::len).sum();

        forward == backward
            && self.client_feeds.values().all(|feeds| !feeds.is_empty())
            && self.feed_clients.values().all(|clients| !clients.is_empty())
            && self.feeds.len() == self.feed_clients.len()
            && self.client_feeds.iter().all(|(client_id, feeds)| {
                feeds.iter().all(|(key, state)| {
                    self.feed_clients
                        .get(key)
                        .and_then(|clients| clients.get(client_id))
                        == Some(state)
                })
            })
            && self
                .termination_timers
                .keys()
                .all(|(client_id, key)| self.state(*client_id, key) == Some(FeedState::Terminated))
    }

    fn remove_entry(&mut self, client_id: ClientId, key: &FeedKey) {
        if let Some(feeds) = self.client_feeds.get_mut(&client_id) {
            feeds.remove(key);
            if feeds.is_empty() {
                self.client_feeds.remove(&client_id);
            }
        }
        self.remove_feed_side(client_id, key);
    }

    fn remove_feed_side(&mut self, client_id: ClientId, key: &FeedKey) {
        if let Some(clients) = self.feed_clients.get_mut(key) {
            clients.remove(&client_id);
            if clients.is_empty() {
                self.feed_clients.remove(key);
                self.feeds.remove(key);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
