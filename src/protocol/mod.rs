//! Feedme wire protocol message types.
//!
//! This module defines the JSON frames exchanged between clients and the
//! server, plus the feed identity and hashing helpers they rely on.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Handshake` | Client → Server | Version negotiation |
//! | `Action` | Client → Server | RPC request |
//! | `FeedOpen` / `FeedClose` | Client → Server | Subscription control |
//! | `*Response` | Server → Client | Request outcomes |
//! | `FeedTermination` | Server → Client | Forced feed closure |
//! | `ActionRevelation` | Server → Client | Feed change broadcast |
//! | `ViolationResponse` | Server → Client | Protocol violation report |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Inbound messages and parsing |
//! | `delta` | Feed delta operations |
//! | `feed` | Feed keys and content hashing |
//! | `server` | Outbound messages |

// ============================================================================
// Submodules
// ============================================================================

/// Client-to-server messages.
pub mod client;

/// Feed delta operations.
pub mod delta;

/// Feed identity and hashing.
pub mod feed;

/// Server-to-client messages.
pub mod server;

// ============================================================================
// Constants
// ============================================================================

/// Protocol versions this server speaks, most preferred first.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1"];

/// Error code sent when no application handler is registered.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

// ============================================================================
// Re-exports
// ============================================================================

pub use client::ClientMessage;
pub use delta::{DeltaPath, FeedDelta, PathSegment};
pub use feed::{Feed, FeedArgs, FeedKey, JsonObject, feed_md5, is_md5_hex};
pub use server::ServerMessage;
