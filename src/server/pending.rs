//! Outstanding request bookkeeping.
//!
//! Every request that waits on the application (handshake, action, feed
//! open, feed close) gets an entry here plus a shared [`PendingFlags`]
//! record. The responder handed to the application holds the same flags.
//!
//! Two guards make late or repeated resolutions harmless:
//!
//! - `responded` is claimed once; later calls are no-ops.
//! - `neutralized` is set when the owning client leaves or the request is
//!   superseded; any call after that is a no-op.
//!
//! Resolution also requires the registry entry to still carry the same
//! flags, which closes the gap between a successful claim and the engine
//! taking its lock.

// ============================================================================
// Imports
// ============================================================================

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;

use crate::identifiers::{CallbackId, ClientId};
use crate::protocol::FeedKey;

// ============================================================================
// PendingFlags
// ============================================================================

/// Shared resolution guard for one outstanding request.
#[derive(Debug, Default)]
pub(crate) struct PendingFlags {
    responded: AtomicBool,
    neutralized: AtomicBool,
}

impl PendingFlags {
    /// Claims the right to resolve. Returns `false` if already resolved or neutralized.
    pub(crate) fn claim(&self) -> bool {
        if self.neutralized.load(Ordering::Acquire) {
            return false;
        }
        self.responded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Makes every future resolution a no-op.
    pub(crate) fn neutralize(&self) {
        self.neutralized.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_neutralized(&self) -> bool {
        self.neutralized.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn has_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }
}

// ============================================================================
// PendingKey
// ============================================================================

/// Key of a pending request; always scoped to one client.
pub(crate) trait PendingKey: Clone + Eq + Hash {
    /// Client that owns the request.
    fn client_id(&self) -> ClientId;
}

impl PendingKey for ClientId {
    fn client_id(&self) -> ClientId {
        *self
    }
}

impl PendingKey for (ClientId, CallbackId) {
    fn client_id(&self) -> ClientId {
        self.0
    }
}

impl PendingKey for (ClientId, FeedKey) {
    fn client_id(&self) -> ClientId {
        self.0
    }
}

// ============================================================================
// PendingRegistry
// ============================================================================

struct PendingEntry<R> {
    request: R,
    flags: Arc<PendingFlags>,
}

/// Outstanding requests of one kind, grouped by client.
pub(crate) struct PendingRegistry<K, R> {
    by_client: FxHashMap<ClientId, FxHashMap<K, PendingEntry<R>>>,
}

impl<K, R> Default for PendingRegistry<K, R> {
    fn default() -> Self {
        Self {
            by_client: FxHashMap::default(),
        }
    }
}

impl<K: PendingKey, R> PendingRegistry<K, R> {
    /// Records a new outstanding request and returns its flags.
    ///
    /// An entry already under `key` is neutralized and replaced.
    pub(crate) fn insert(&mut self, key: K, request: R) -> Arc<PendingFlags> {
        let flags = Arc::new(PendingFlags::default());
        let entry = PendingEntry {
            request,
            flags: Arc::clone(&flags),
        };

        let previous = self
            .by_client
            .entry(key.client_id())
            .or_default()
            .insert(key, entry);

        if let Some(previous) = previous {
            previous.flags.neutralize();
        }

        flags
    }

    /// Returns `true` if a request is outstanding under `key`.
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.by_client
            .get(&key.client_id())
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Removes the entry if it still belongs to `flags`.
    pub(crate) fn take(&mut self, key: &K, flags: &Arc<PendingFlags>) -> Option<R> {
        let client_id = key.client_id();
        let entries = self.by_client.get_mut(&client_id)?;

        if !entries
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.flags, flags))
        {
            return None;
        }

        let entry = entries.remove(key)?;
        if entries.is_empty() {
            self.by_client.remove(&client_id);
        }
        Some(entry.request)
    }

    /// Neutralizes and removes the entry under `key`.
    pub(crate) fn neutralize(&mut self, key: &K) -> Option<R> {
        let client_id = key.client_id();
        let entries = self.by_client.get_mut(&client_id)?;
        let entry = entries.remove(key)?;
        if entries.is_empty() {
            self.by_client.remove(&client_id);
        }

        entry.flags.neutralize();
        Some(entry.request)
    }

    /// Neutralizes and removes every entry owned by `client_id`.
    ///
    /// Returns the number of entries neutralized.
    pub(crate) fn neutralize_client(&mut self, client_id: ClientId) -> usize {
        let Some(entries) = self.by_client.remove(&client_id) else {
            return 0;
        };

        for entry in entries.values() {
            entry.flags.neutralize();
        }
        entries.len()
    }

    /// Returns `true` if `client_id` owns any entry.
    pub(crate) fn has_client(&self, client_id: ClientId) -> bool {
        self.by_client.contains_key(&client_id)
    }

    /// Returns the total number of outstanding requests.
    pub(crate) fn len(&self) -> usize {
        self.by_client.values().map(FxHashMap::len).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    type Actions = PendingRegistry<(ClientId, CallbackId), &'static str>;

    #[test]
    fn test_claim_once() {
        let flags = PendingFlags::default();
        assert!(flags.claim());
        assert!(!flags.claim());
        assert!(flags.has_responded());
    }

    #[test]
    fn test_claim_after_neutralize_fails() {
        let flags = PendingFlags::default();
        flags.neutralize();
        assert!(!flags.claim());
        assert!(!flags.has_responded());
        assert!(flags.is_neutralized());
    }

    #[test]
    fn test_insert_and_take() {
        let mut registry = Actions::default();
        let client = ClientId::generate();
        let key = (client, "123".to_string());

        let flags = registry.insert(key.clone(), "req");
        assert!(registry.contains(&key));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.take(&key, &flags), Some("req"));
        assert!(!registry.contains(&key));
        assert!(!registry.has_client(client));
    }

    #[test]
    fn test_take_with_stale_flags() {
        let mut registry = Actions::default();
        let key = (ClientId::generate(), "1".to_string());

        let stale = registry.insert(key.clone(), "first");
        registry.neutralize(&key);
        let _fresh = registry.insert(key.clone(), "second");

        assert_eq!(registry.take(&key, &stale), None);
        assert!(registry.contains(&key));
    }

    #[test]
    fn test_insert_replaces_and_neutralizes() {
        let mut registry = Actions::default();
        let key = (ClientId::generate(), "1".to_string());

        let first = registry.insert(key.clone(), "first");
        let _second = registry.insert(key, "second");
        assert!(first.is_neutralized());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_neutralize_client() {
        let mut registry = Actions::default();
        let client = ClientId::generate();
        let other = ClientId::generate();

        let a = registry.insert((client, "123".to_string()), "a");
        let b = registry.insert((client, "456".to_string()), "b");
        let c = registry.insert((other, "123".to_string()), "c");

        assert_eq!(registry.neutralize_client(client), 2);
        assert!(a.is_neutralized());
        assert!(b.is_neutralized());
        assert!(!c.is_neutralized());
        assert!(!registry.has_client(client));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.neutralize_client(client), 0);
    }
}
