//! Feedme Server - protocol engine for the Feedme pub/sub protocol.
//!
//! Clients perform a version handshake, then invoke request/response
//! actions and open named, argument-parameterized feeds. The application
//! broadcasts feed changes as action revelations and may terminate feeds
//! at any time.
//!
//! # Architecture
//!
//! The engine never touches sockets. It is driven by a [`Transport`]:
//!
//! - **Transport**: Accepts connections, reports events, sends frames
//! - **Server**: Owns protocol state, validates messages, calls handlers
//! - **Application**: Decides handshakes, actions and feed opens
//!
//! Key design principles:
//!
//! - One lock over all protocol state; each event runs to completion
//! - Subscription state is indexed by client and by feed, kept in lockstep
//! - Every deferred request resolves at most once, and never after its
//!   client has left
//!
//! # Quick Start
//!
//! ```no_run
//! use feedme_server::{Feed, Result, Revelation, Server, WsTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (transport, events) = WsTransport::with_port(8080);
//!     let server = Server::builder()
//!         .transport(transport)
//!         .events(events)
//!         .build()?;
//!
//!     server.on_feed_open(|request, responder| {
//!         tracing::info!(feed = %request.feed, "Feed requested");
//!         responder.success(serde_json::Map::new());
//!     });
//!
//!     server.start()?;
//!
//!     // Later: push a change to every client with the feed open
//!     let feed = Feed::with_args("chat", [("room", "lobby")]);
//!     server.action_revelation(Revelation::new("message_posted", feed))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`server`] | Protocol engine: [`Server`], builder, handlers |
//! | [`transport`] | Transport trait plus memory and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for clients and connections.
pub mod identifiers;

/// Wire protocol message types.
///
/// Client and server messages, feed deltas, feed keys and content hashing.
pub mod protocol;

/// Protocol engine.
///
/// Use [`Server::builder()`] to create a configured server.
pub mod server;

/// Transport layer.
///
/// The [`Transport`] trait plus in-memory and WebSocket implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Server types
pub use server::{
    ActionRequest, ActionResponder, FeedCloseRequest, FeedCloseResponder, FeedOpenRequest,
    FeedOpenResponder, FeedState, HandshakeRequest, HandshakeResponder, HandshakeStatus,
    Revelation, Server, ServerBuilder, ServerEvent, ServerOptions, Termination, TerminationTarget,
};

// Protocol types
pub use protocol::{Feed, FeedArgs, FeedDelta, FeedKey, JsonObject, PathSegment};

// Transport types
pub use transport::{
    MemoryTransport, Transport, TransportEvent, TransportEvents, TransportState, WsTransport,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallbackId, ClientId, TransportClientId};
