//! Outbound message delivery.

// ============================================================================
// Imports
// ============================================================================

use tracing::{trace, warn};

use crate::identifiers::TransportClientId;
use crate::protocol::ServerMessage;
use crate::transport::Transport;

// ============================================================================
// Notifier
// ============================================================================

/// Serializes server messages and hands them to the transport.
///
/// Send failures are logged, not returned. A failed send means the
/// connection is going away, and its `Disconnect` event cleans up.
pub(crate) struct Notifier<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Notifier<'a> {
    pub(crate) fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Sends one message. Returns `true` if the transport accepted it.
    pub(crate) fn send(&self, client: TransportClientId, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.send_text(client, text),
            Err(e) => {
                warn!(client = %client, error = %e, "Failed to serialize message");
                false
            }
        }
    }

    /// Sends the same message to several clients, serializing it once.
    ///
    /// Returns the number of clients the transport accepted it for.
    pub(crate) fn broadcast<I>(&self, clients: I, message: &ServerMessage) -> usize
    where
        I: IntoIterator<Item = TransportClientId>,
    {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };

        clients
            .into_iter()
            .filter(|client| self.send_text(*client, text.clone()))
            .count()
    }

    fn send_text(&self, client: TransportClientId, text: String) -> bool {
        trace!(client = %client, text = %text, "Sending frame");
        match self.transport.send(client, text) {
            Ok(()) => true,
            Err(e) => {
                warn!(client = %client, error = %e, "Transport send failed");
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
