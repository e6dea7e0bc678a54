//! Type-safe identifier wrappers.
//!
//! Newtypes prevent mixing the engine's client IDs with the connection
//! IDs handed out by a transport.
//!
//! | Type | Issued by | Wire form |
//! |------|-----------|-----------|
//! | [`ClientId`] | Server, on connect | UUID string in `HandshakeResponse.ClientId` |
//! | [`TransportClientId`] | Transport, per connection | never sent |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ClientId
// ============================================================================

/// Server-generated client identifier.
///
/// Unique for the lifetime of the process. Sent to the client once the
/// handshake completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a new random client ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ClientId {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// TransportClientId
// ============================================================================

/// Connection identifier issued by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportClientId(u64);

impl TransportClientId {
    /// Creates a transport client ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl From<u64> for TransportClientId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// CallbackId
// ============================================================================

/// Client-chosen action correlation ID (`Action.CallbackId`).
pub type CallbackId = String;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_client_id_display_is_uuid() {
        let id = ClientId::generate();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(Uuid::parse_str(&text).ok(), Some(*id.as_uuid()));
    }

    #[test]
    fn test_client_id_serializes_as_string() {
        let id = ClientId::generate();
        let json = serde_json::to_value(id).expect("serialize");
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn test_transport_client_id() {
        let id = TransportClientId::new(7);
        assert_eq!(id.as_u64(), 7);
        assert_eq!(id.to_string(), "conn-7");
        assert_eq!(TransportClientId::from(7), id);
    }
}
