//! Client-to-server messages.
//!
//! Inbound frames are parsed in two steps: JSON syntax, then the typed
//! message schema. Failures become [`Error::InvalidMessage`] carrying the
//! problem text reported back in a `ViolationResponse`.
//!
//! | Message | Fields |
//! |---------|--------|
//! | `Handshake` | `Versions` |
//! | `Action` | `ActionName`, `ActionArgs`, `CallbackId` |
//! | `FeedOpen` | `FeedName`, `FeedArgs` |
//! | `FeedClose` | `FeedName`, `FeedArgs` |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CallbackId;

use super::feed::{Feed, FeedArgs, JsonObject};

// ============================================================================
// Constants
// ============================================================================

/// Problem reported for frames that are not JSON.
pub const PROBLEM_INVALID_JSON: &str = "Invalid JSON.";

/// Problem reported for frames that do not match a message schema.
pub const PROBLEM_SCHEMA_VIOLATION: &str = "Schema violation.";

/// Problem reported for a `Handshake` after one was accepted.
pub const PROBLEM_UNEXPECTED_HANDSHAKE: &str = "Unexpected Handshake message.";

/// Problem reported for actions and feed messages before the handshake completes.
pub const PROBLEM_HANDSHAKE_REQUIRED: &str = "Handshake required.";

/// Problem reported for an `Action` whose `CallbackId` is still outstanding.
pub const PROBLEM_REUSED_CALLBACK_ID: &str = "Action message reused an outstanding CallbackId.";

/// Problem reported for a `FeedOpen` on a feed that is not closed.
pub const PROBLEM_UNEXPECTED_FEED_OPEN: &str = "Unexpected FeedOpen message.";

/// Problem reported for a `FeedClose` on a feed that is not open.
pub const PROBLEM_UNEXPECTED_FEED_CLOSE: &str = "Unexpected FeedClose message.";

// ============================================================================
// ClientMessage
// ============================================================================

/// A validated message from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "MessageType")]
pub enum ClientMessage {
    /// Version negotiation.
    Handshake(Handshake),
    /// Request/response RPC.
    Action(Action),
    /// Feed subscription request.
    FeedOpen(FeedOpen),
    /// Feed unsubscription request.
    FeedClose(FeedClose),
}

/// `Handshake` message body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Handshake {
    /// Protocol versions the client supports.
    pub versions: Vec<String>,
}

/// `Action` message body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Action {
    /// Action name.
    pub action_name: String,
    /// Action arguments.
    pub action_args: JsonObject,
    /// Client-chosen correlation ID.
    pub callback_id: CallbackId,
}

/// `FeedOpen` message body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FeedOpen {
    /// Feed name.
    pub feed_name: String,
    /// Feed arguments.
    pub feed_args: FeedArgs,
}

/// `FeedClose` message body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FeedClose {
    /// Feed name.
    pub feed_name: String,
    /// Feed arguments.
    pub feed_args: FeedArgs,
}

impl FeedOpen {
    /// Returns the feed this message addresses.
    #[must_use]
    pub fn feed(&self) -> Feed {
        Feed::new(self.feed_name.clone(), self.feed_args.clone())
    }
}

impl FeedClose {
    /// Returns the feed this message addresses.
    #[must_use]
    pub fn feed(&self) -> Feed {
        Feed::new(self.feed_name.clone(), self.feed_args.clone())
    }
}

// ============================================================================
// Parsing
// ============================================================================

impl ClientMessage {
    /// Parses and validates a raw frame.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMessage`] with problem `"Invalid JSON."` if the frame
    ///   is not JSON
    /// - [`Error::InvalidMessage`] with problem `"Schema violation."` if the
    ///   frame is JSON but not a valid client message
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::invalid_message(PROBLEM_INVALID_JSON, e.to_string()))?;

        let message: Self = serde_json::from_value(value)
            .map_err(|e| Error::invalid_message(PROBLEM_SCHEMA_VIOLATION, e.to_string()))?;

        message.validate()?;
        Ok(message)
    }

    /// Returns the `MessageType` of this message.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "Handshake",
            Self::Action(_) => "Action",
            Self::FeedOpen(_) => "FeedOpen",
            Self::FeedClose(_) => "FeedClose",
        }
    }

    /// Checks the constraints serde cannot express.
    fn validate(&self) -> Result<()> {
        match self {
            Self::Handshake(handshake) => {
                if handshake.versions.is_empty() {
                    return Err(schema_violation("Versions must not be empty"));
                }

                let mut seen = FxHashSet::default();
                for version in &handshake.versions {
                    if version.is_empty() {
                        return Err(schema_violation("Versions must be non-empty strings"));
                    }
                    if !seen.insert(version.as_str()) {
                        return Err(schema_violation("Versions must be unique"));
                    }
                }
            }

            Self::Action(action) => {
                if action.action_name.is_empty() {
                    return Err(schema_violation("ActionName must not be empty"));
                }
            }

            Self::FeedOpen(FeedOpen { feed_name, .. })
            | Self::FeedClose(FeedClose { feed_name, .. }) => {
                if feed_name.is_empty() {
                    return Err(schema_violation("FeedName must not be empty"));
                }
            }
        }

        Ok(())
    }
}

fn schema_violation(detail: &str) -> Error {
    Error::invalid_message(PROBLEM_SCHEMA_VIOLATION, detail)
}

// ============================================================================
// Tests
// ============================================================================
