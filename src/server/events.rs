//! Server notifications and application handler types.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::Error;
use crate::identifiers::ClientId;

use super::responders::{
    ActionRequest, ActionResponder, FeedCloseRequest, FeedCloseResponder, FeedOpenRequest,
    FeedOpenResponder, HandshakeRequest, HandshakeResponder,
};

// ============================================================================
// ServerEvent
// ============================================================================

/// Notification emitted by the server.
///
/// Requests that need an application decision are not events; they are
/// delivered to the handlers registered with `Server::on_*`.
#[derive(Debug)]
pub enum ServerEvent {
    /// Transport is starting.
    Starting,
    /// Transport is accepting connections.
    Start,
    /// Transport is stopping. All clients have been disconnected.
    Stopping {
        /// Cause of an involuntary stop.
        error: Option<Error>,
    },
    /// Transport stopped.
    Stop {
        /// Cause of an involuntary stop.
        error: Option<Error>,
    },
    /// A client connected.
    Connect {
        /// New client.
        client_id: ClientId,
    },
    /// A client disconnected.
    Disconnect {
        /// Departed client.
        client_id: ClientId,
        /// Reason, if any.
        error: Option<Error>,
    },
    /// A client sent an invalid or out-of-sequence message.
    BadClientMessage {
        /// Offending client.
        client_id: ClientId,
        /// Diagnostic.
        error: Error,
    },
    /// The transport reported a non-fatal failure.
    TransportError {
        /// The failure.
        error: Error,
    },
}

impl ServerEvent {
    /// Returns the event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Start => "start",
            Self::Stopping { .. } => "stopping",
            Self::Stop { .. } => "stop",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::BadClientMessage { .. } => "badClientMessage",
            Self::TransportError { .. } => "transportError",
        }
    }

    /// Returns the client the event concerns, if any.
    #[must_use]
    pub const fn client_id(&self) -> Option<ClientId> {
        match self {
            Self::Connect { client_id }
            | Self::Disconnect { client_id, .. }
            | Self::BadClientMessage { client_id, .. } => Some(*client_id),
            _ => None,
        }
    }
}

// ============================================================================
// Handler Types
// ============================================================================

/// Handler for [`ServerEvent`]s.
pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Handler for handshake requests.
pub type HandshakeHandler = Arc<dyn Fn(HandshakeRequest, HandshakeResponder) + Send + Sync>;

/// Handler for action requests.
pub type ActionHandler = Arc<dyn Fn(ActionRequest, ActionResponder) + Send + Sync>;

/// Handler for feed open requests.
pub type FeedOpenHandler = Arc<dyn Fn(FeedOpenRequest, FeedOpenResponder) + Send + Sync>;

/// Handler for feed close requests.
pub type FeedCloseHandler = Arc<dyn Fn(FeedCloseRequest, FeedCloseResponder) + Send + Sync>;

/// Registered application handlers.
#[derive(Default, Clone)]
pub(crate) struct Handlers {
    pub event: Option<EventHandler>,
    pub handshake: Option<HandshakeHandler>,
    pub action: Option<ActionHandler>,
    pub feed_open: Option<FeedOpenHandler>,
    pub feed_close: Option<FeedCloseHandler>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let client_id = ClientId::generate();
        assert_eq!(ServerEvent::Starting.name(), "starting");
        assert_eq!(ServerEvent::Stop { error: None }.name(), "stop");
        assert_eq!(
            ServerEvent::BadClientMessage {
                client_id,
                error: Error::unexpected_message("Handshake required.")
            }
            .name(),
            "badClientMessage"
        );
        assert_eq!(
            ServerEvent::TransportError {
                error: Error::transport("boom")
            }
            .name(),
            "transportError"
        );
    }

    #[test]
    fn test_event_client_id() {
        let client_id = ClientId::generate();
        assert_eq!(ServerEvent::Connect { client_id }.client_id(), Some(client_id));
        assert_eq!(
            ServerEvent::Disconnect {
                client_id,
                error: None
            }
            .client_id(),
            Some(client_id)
        );
        assert_eq!(ServerEvent::Start.client_id(), None);
    }
}
