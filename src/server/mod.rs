//! Protocol engine.
//!
//! The [`Server`] sits between a [`Transport`](crate::transport::Transport)
//! and the application. It runs the handshake, tracks feed subscriptions,
//! hands requests to application handlers and delivers their outcomes.
//!
//! # Architecture
//!
//! ```text
//!                   ┌──────────────────────────── Server ────────────────────────────┐
//! TransportEvent ──►│ dispatch ──► clients / feeds / pending ──► notifier ──► send() │
//!                   │     │                                                          │
//!                   │     └──► Followup (after unlock) ──► on_* handlers / events    │
//!                   └────────────────────────────────────────────────────────────────┘
//!                                         ▲
//!                       responders ───────┘ (resolve under the lock)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ServerBuilder`] |
//! | `clients` | Client registry and handshake status |
//! | `commands` | [`Revelation`] and [`Termination`] |
//! | `core` | [`Server`] and the engine |
//! | `dispatch` | Inbound message handling |
//! | `events` | [`ServerEvent`] and handler types |
//! | `feeds` | Dual-indexed subscription table |
//! | `notifier` | Outbound delivery |
//! | `options` | [`ServerOptions`] |
//! | `pending` | Outstanding request registry |
//! | `responders` | Requests and one-shot responders |
//! | `timer` | Cancelable timers |

// ============================================================================
// Submodules
// ============================================================================

pub mod builder;

mod clients;

pub mod commands;

pub mod core;

mod dispatch;

pub mod events;

mod feeds;

mod notifier;

pub mod options;

mod pending;

pub mod responders;

mod timer;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Server;
pub use builder::ServerBuilder;
pub use clients::HandshakeStatus;
pub use commands::{Revelation, Termination, TerminationTarget};
pub use events::{
    ActionHandler, EventHandler, FeedCloseHandler, FeedOpenHandler, HandshakeHandler, ServerEvent,
};
pub use feeds::FeedState;
pub use options::ServerOptions;
pub use responders::{
    ActionRequest, ActionResponder, FeedCloseRequest, FeedCloseResponder, FeedOpenRequest,
    FeedOpenResponder, HandshakeRequest, HandshakeResponder,
};
