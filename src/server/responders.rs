//! Application requests and their one-shot responders.
//!
//! Each request that needs an application decision is delivered as an
//! immutable request value plus a responder. A responder resolves at most
//! once. Calls after the first resolution, after the owning client
//! disconnected, or after the server was dropped are silently ignored.
//!
//! # Example
//!
//! ```ignore
//! server.on_action(|request, responder| {
//!     if request.action_name == "ping" {
//!         responder.success(serde_json::Map::new());
//!     } else {
//!         let _ = responder.failure("UNKNOWN_ACTION", serde_json::Map::new());
//!     }
//! });
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, ClientId};
use crate::protocol::{Feed, FeedKey, JsonObject};

use super::core::ServerInner;
use super::pending::PendingFlags;

// ============================================================================
// Requests
// ============================================================================

/// A client handshake awaiting approval.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeRequest {
    /// Requesting client.
    pub client_id: ClientId,
    /// Versions the client offered.
    pub versions: Vec<String>,
    /// Version selected by the server.
    pub version: String,
}

/// A client action awaiting a result.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// Requesting client.
    pub client_id: ClientId,
    /// Action name.
    pub action_name: String,
    /// Action arguments.
    pub action_args: JsonObject,
    /// Client-chosen correlation ID.
    pub callback_id: CallbackId,
}

/// A client feed open awaiting a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedOpenRequest {
    /// Requesting client.
    pub client_id: ClientId,
    /// Requested feed.
    pub feed: Feed,
}

/// A client feed close awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedCloseRequest {
    /// Requesting client.
    pub client_id: ClientId,
    /// Feed being closed.
    pub feed: Feed,
}

// ============================================================================
// Outcome
// ============================================================================

/// Application decision for an action or feed open.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Success(JsonObject),
    Failure { code: String, data: JsonObject },
}

impl Outcome {
    fn failure(code: impl Into<String>, data: JsonObject) -> Result<Self> {
        let code = code.into();
        if code.is_empty() {
            return Err(Error::invalid_argument("Error code must not be empty"));
        }
        Ok(Self::Failure { code, data })
    }
}

// ============================================================================
// Responder Core
// ============================================================================

/// State shared by every responder kind.
#[derive(Clone)]
struct Resolver<K> {
    inner: Weak<ServerInner>,
    flags: Arc<PendingFlags>,
    key: K,
}

impl<K> Resolver<K> {
    /// Claims the single resolution and returns the live server.
    fn claim(&self) -> Option<Arc<ServerInner>> {
        let inner = self.inner.upgrade()?;
        self.flags.claim().then_some(inner)
    }
}

impl<K: fmt::Debug> fmt::Debug for Resolver<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("key", &self.key)
            .field("responded", &self.flags.has_responded())
            .field("neutralized", &self.flags.is_neutralized())
            .finish()
    }
}

macro_rules! responder_status {
    ($name:ident) => {
        impl $name {
            /// Returns `true` if the request can no longer be resolved
            /// because its client left or it was superseded.
            #[must_use]
            pub fn is_neutralized(&self) -> bool {
                self.resolver.flags.is_neutralized()
            }

            /// Returns `true` once the request has been resolved.
            #[must_use]
            pub fn has_responded(&self) -> bool {
                self.resolver.flags.has_responded()
            }
        }
    };
}

// ============================================================================
// HandshakeResponder
// ============================================================================

/// Resolves a [`HandshakeRequest`].
#[derive(Debug, Clone)]
pub struct HandshakeResponder {
    resolver: Resolver<ClientId>,
}

impl HandshakeResponder {
    pub(crate) fn new(inner: Weak<ServerInner>, flags: Arc<PendingFlags>, client_id: ClientId) -> Self {
        Self {
            resolver: Resolver {
                inner,
                flags,
                key: client_id,
            },
        }
    }

    /// Completes the handshake.
    pub fn success(&self) {
        if let Some(inner) = self.resolver.claim() {
            inner.resolve_handshake(self.resolver.key, &self.resolver.flags);
        }
    }
}

responder_status!(HandshakeResponder);

// ============================================================================
// ActionResponder
// ============================================================================

/// Resolves an [`ActionRequest`].
#[derive(Debug, Clone)]
pub struct ActionResponder {
    resolver: Resolver<(ClientId, CallbackId)>,
}

impl ActionResponder {
    pub(crate) fn new(
        inner: Weak<ServerInner>,
        flags: Arc<PendingFlags>,
        key: (ClientId, CallbackId),
    ) -> Self {
        Self {
            resolver: Resolver { inner, flags, key },
        }
    }

    /// Returns action data to the client.
    pub fn success(&self, action_data: JsonObject) {
        self.resolve(Outcome::Success(action_data));
    }

    /// Returns an action failure to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `error_code` is empty.
    pub fn failure(&self, error_code: impl Into<String>, error_data: JsonObject) -> Result<()> {
        let outcome = Outcome::failure(error_code, error_data)?;
        self.resolve(outcome);
        Ok(())
    }

    fn resolve(&self, outcome: Outcome) {
        if let Some(inner) = self.resolver.claim() {
            inner.resolve_action(&self.resolver.key, &self.resolver.flags, outcome);
        }
    }
}

responder_status!(ActionResponder);

// ============================================================================
// FeedOpenResponder
// ============================================================================

/// Resolves a [`FeedOpenRequest`].
#[derive(Debug, Clone)]
pub struct FeedOpenResponder {
    resolver: Resolver<(ClientId, FeedKey)>,
}

impl FeedOpenResponder {
    pub(crate) fn new(
        inner: Weak<ServerInner>,
        flags: Arc<PendingFlags>,
        key: (ClientId, FeedKey),
    ) -> Self {
        Self {
            resolver: Resolver { inner, flags, key },
        }
    }

    /// Opens the feed with its initial data.
    pub fn success(&self, feed_data: JsonObject) {
        self.resolve(Outcome::Success(feed_data));
    }

    /// Rejects the feed open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `error_code` is empty.
    pub fn failure(&self, error_code: impl Into<String>, error_data: JsonObject) -> Result<()> {
        let outcome = Outcome::failure(error_code, error_data)?;
        self.resolve(outcome);
        Ok(())
    }

    fn resolve(&self, outcome: Outcome) {
        if let Some(inner) = self.resolver.claim() {
            inner.resolve_feed_open(&self.resolver.key, &self.resolver.flags, outcome);
        }
    }
}

responder_status!(FeedOpenResponder);

// ============================================================================
// FeedCloseResponder
// ============================================================================

/// Resolves a [`FeedCloseRequest`].
#[derive(Debug, Clone)]
pub struct FeedCloseResponder {
    resolver: Resolver<(ClientId, FeedKey)>,
}

impl FeedCloseResponder {
    pub(crate) fn new(
        inner: Weak<ServerInner>,
        flags: Arc<PendingFlags>,
        key: (ClientId, FeedKey),
    ) -> Self {
        Self {
            resolver: Resolver { inner, flags, key },
        }
    }

    /// Acknowledges the close.
    pub fn success(&self) {
        if let Some(inner) = self.resolver.claim() {
            inner.resolve_feed_close(&self.resolver.key, &self.resolver.flags);
        }
    }
}

responder_status!(FeedCloseResponder);

// ============================================================================
// Tests
// ============================================================================
