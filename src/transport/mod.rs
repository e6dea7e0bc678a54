//! Transport abstraction.
//!
//! The engine never touches sockets. It talks to a [`Transport`] through
//! commands and receives [`TransportEvent`]s over a channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   send / disconnect    ┌─────────────────┐
//! │                 │───────────────────────►│                 │
//! │     Server      │                        │    Transport    │◄──── clients
//! │    (engine)     │◄───────────────────────│                 │
//! └─────────────────┘   TransportEvent (mpsc)└─────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! `stopped → starting → started → stopping → stopped`. Every transition is
//! reported as an event. A transport reports `disconnect` for each connected
//! client before it reports `stopping`'s completion (`stop`).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process transport for tests and embedding |
//! | `websocket` | WebSocket server transport |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::identifiers::TransportClientId;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport.
pub mod memory;

/// WebSocket server transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemoryTransport;
pub use websocket::WsTransport;

// ============================================================================
// Types
// ============================================================================

/// Receiving side of a transport's event stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending side of a transport's event stream.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

// ============================================================================
// TransportState
// ============================================================================

/// Transport lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Not accepting connections.
    Stopped,
    /// Start requested, not yet listening.
    Starting,
    /// Accepting connections.
    Started,
    /// Stop requested, tearing down.
    Stopping,
}

impl TransportState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Event reported by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// Transport began starting.
    Starting,
    /// Transport is accepting connections.
    Start,
    /// Transport began stopping, with the failure that caused it, if any.
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
        /// Connection ID.
        client: TransportClientId,
    },
    /// A client disconnected.
    Disconnect {
        /// Connection ID.
        client: TransportClientId,
        /// Reason, if the disconnect was not requested without one.
        error: Option<Error>,
    },
    /// A client sent a text frame.
    Message {
        /// Connection ID.
        client: TransportClientId,
        /// Raw frame.
        text: String,
    },
    /// Non-fatal transport failure.
    Error {
        /// The failure.
        error: Error,
    },
}

// ============================================================================
// Transport
// ============================================================================

/// Commands the engine issues to a transport.
///
/// Implementations must be non-blocking and must never call back into the
/// server synchronously; all feedback goes through the event channel.
pub trait Transport: Send + Sync {
    /// Returns the current lifecycle state.
    fn state(&self) -> TransportState;

    /// Begins starting. Valid only when stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if not stopped.
    fn start(&self) -> Result<()>;

    /// Begins stopping. Valid only when started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if not started.
    fn stop(&self) -> Result<()>;

    /// Queues a text frame for a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the client is not connected.
    fn send(&self, client: TransportClientId, text: String) -> Result<()>;

    /// Disconnects a client. A `Disconnect` event follows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the client is not connected.
    fn disconnect(&self, client: TransportClientId, error: Option<Error>) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(TransportState::Stopped.to_string(), "stopped");
        assert_eq!(TransportState::Starting.to_string(), "starting");
        assert_eq!(TransportState::Started.as_str(), "started");
        assert_eq!(
            serde_json::to_value(TransportState::Stopping).expect("serialize"),
            serde_json::json!("stopping")
        );
    }
}
