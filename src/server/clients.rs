//! Connected client registry.
//!
//! Maps transport connections to server-generated client IDs and tracks
//! each client's handshake progress and handshake timer.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::identifiers::{ClientId, TransportClientId};

use super::timer::Timer;

// ============================================================================
// HandshakeStatus
// ============================================================================

/// Handshake progress of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeStatus {
    /// Connected, no accepted handshake yet.
    Waiting,
    /// Handshake accepted, waiting on the application.
    Processing,
    /// Handshake complete; actions and feeds allowed.
    Complete,
}

// ============================================================================
// ClientRegistry
// ============================================================================

#[derive(Debug)]
pub(crate) struct ClientEntry {
    pub transport_id: TransportClientId,
    pub handshake: HandshakeStatus,
    pub handshake_timer: Option<Timer>,
}

#[derive(Debug, Default)]
pub(crate) struct ClientRegistry {
    clients: FxHashMap<ClientId, ClientEntry>,
    by_transport: FxHashMap<TransportClientId, ClientId>,
}

impl ClientRegistry {
    /// Registers a new connection and returns its client ID.
    pub(crate) fn insert(&mut self, transport_id: TransportClientId) -> ClientId {
        let client_id = ClientId::generate();
        self.clients.insert(
            client_id,
            ClientEntry {
                transport_id,
                handshake: HandshakeStatus::Waiting,
                handshake_timer: None,
            },
        );
        self.by_transport.insert(transport_id, client_id);
        client_id
    }

    /// Removes a client by transport ID, canceling its handshake timer.
    pub(crate) fn remove_by_transport(&mut self, transport_id: TransportClientId) -> Option<ClientId> {
        let client_id = self.by_transport.remove(&transport_id)?;
        self.remove_entry(client_id);
        Some(client_id)
    }

    /// Removes a client by client ID, canceling its handshake timer.
    pub(crate) fn remove(&mut self, client_id: ClientId) -> Option<TransportClientId> {
        let transport_id = self.remove_entry(client_id)?;
        self.by_transport.remove(&transport_id);
        Some(transport_id)
    }

    #[inline]
    pub(crate) fn client_id(&self, transport_id: TransportClientId) -> Option<ClientId> {
        self.by_transport.get(&transport_id).copied()
    }

    #[inline]
    pub(crate) fn transport_id(&self, client_id: ClientId) -> Option<TransportClientId> {
        self.clients.get(&client_id).map(|entry| entry.transport_id)
    }

    #[inline]
    pub(crate) fn status(&self, client_id: ClientId) -> Option<HandshakeStatus> {
        self.clients.get(&client_id).map(|entry| entry.handshake)
    }

    pub(crate) fn set_status(&mut self, client_id: ClientId, status: HandshakeStatus) {
        if let Some(entry) = self.clients.get_mut(&client_id) {
            entry.handshake = status;
        }
    }

    pub(crate) fn set_handshake_timer(&mut self, client_id: ClientId, timer: Timer) {
        if let Some(entry) = self.clients.get_mut(&client_id)
            && let Some(previous) = entry.handshake_timer.replace(timer)
        {
            previous.cancel();
        }
    }

    pub(crate) fn cancel_handshake_timer(&mut self, client_id: ClientId) {
        if let Some(timer) = self
            .clients
            .get_mut(&client_id)
            .and_then(|entry| entry.handshake_timer.take())
        {
            timer.cancel();
        }
    }

    /// Clears the handshake timer if its token matches.
    ///
    /// Returns the transport ID of the client whose timer expired.
    pub(crate) fn expire_handshake_timer(
        &mut self,
        client_id: ClientId,
        token: u64,
    ) -> Option<TransportClientId> {
        let entry = self.clients.get_mut(&client_id)?;
        if entry.handshake_timer.as_ref().map(Timer::token) != Some(token) {
            return None;
        }
        entry.handshake_timer = None;
        Some(entry.transport_id)
    }

    pub(crate) fn has_handshake_timer(&self, client_id: ClientId) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(|entry| entry.handshake_timer.is_some())
    }

    pub(crate) fn contains(&self, client_id: ClientId) -> bool {
        self.clients.contains_key(&client_id)
    }

    pub(crate) fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }

    fn remove_entry(&mut self, client_id: ClientId) -> Option<TransportClientId> {
        let entry = self.clients.remove(&client_id)?;
        if let Some(timer) = entry.handshake_timer {
            timer.cancel();
        }
        Some(entry.transport_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
