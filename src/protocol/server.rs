//! Server-to-client messages.
//!
//! Every message serializes as a JSON object tagged with `MessageType`.
//! Optional fields are omitted rather than sent as `null`.
//!
//! | Message | Sent when |
//! |---------|-----------|
//! | `HandshakeResponse` | Handshake resolved or version mismatch |
//! | `ActionResponse` | Action resolved |
//! | `FeedOpenResponse` | Feed open resolved or open terminated |
//! | `FeedCloseResponse` | Feed close resolved |
//! | `FeedTermination` | Open feed terminated by the server |
//! | `ActionRevelation` | Feed data changed |
//! | `ViolationResponse` | Client broke the protocol |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use crate::identifiers::{CallbackId, ClientId};

use super::delta::FeedDelta;
use super::feed::{Feed, FeedArgs, JsonObject};

// ============================================================================
// ServerMessage
// ============================================================================

/// A message from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "MessageType")]
pub enum ServerMessage {
    /// Handshake outcome.
    HandshakeResponse(HandshakeResponse),
    /// Action outcome.
    ActionResponse(ActionResponse),
    /// Feed open outcome.
    FeedOpenResponse(FeedOpenResponse),
    /// Feed close outcome.
    FeedCloseResponse(FeedCloseResponse),
    /// Server-initiated feed closure.
    FeedTermination(FeedTermination),
    /// Feed change broadcast.
    ActionRevelation(ActionRevelation),
    /// Protocol violation report.
    ViolationResponse(ViolationResponse),
}

// ============================================================================
// Message Bodies
// ============================================================================

/// `HandshakeResponse` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HandshakeResponse {
    /// Whether a version was agreed.
    pub success: bool,
    /// Negotiated version (success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Assigned client ID (success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

/// `ActionResponse` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionResponse {
    /// Whether the action succeeded.
    pub success: bool,
    /// Correlation ID from the `Action` message.
    pub callback_id: CallbackId,
    /// Result data (success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_data: Option<JsonObject>,
    /// Error code (failure only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Error data (failure only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_data: Option<JsonObject>,
}

/// `FeedOpenResponse` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedOpenResponse {
    /// Whether the feed is now open.
    pub success: bool,
    /// Feed name.
    pub feed_name: String,
    /// Feed arguments.
    pub feed_args: FeedArgs,
    /// Initial feed data (success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_data: Option<JsonObject>,
    /// Error code (failure only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Error data (failure only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_data: Option<JsonObject>,
}

/// `FeedCloseResponse` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedCloseResponse {
    /// Feed name.
    pub feed_name: String,
    /// Feed arguments.
    pub feed_args: FeedArgs,
}

/// `FeedTermination` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedTermination {
    /// Feed name.
    pub feed_name: String,
    /// Feed arguments.
    pub feed_args: FeedArgs,
    /// Reason code.
    pub error_code: String,
    /// Reason data.
    pub error_data: JsonObject,
}

/// `ActionRevelation` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionRevelation {
    /// Action that caused the change.
    pub action_name: String,
    /// Action data.
    pub action_data: JsonObject,
    /// Feed name.
    pub feed_name: String,
    /// Feed arguments.
    pub feed_args: FeedArgs,
    /// Changes to apply.
    pub feed_deltas: Vec<FeedDelta>,
    /// Hash of the feed data after the deltas, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_md5: Option<String>,
}

/// `ViolationResponse` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViolationResponse {
    /// What went wrong.
    pub diagnostics: Diagnostics,
}

/// Violation details.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Diagnostics {
    /// Problem description.
    pub problem: String,
    /// The offending frame, verbatim.
    pub message: String,
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerMessage {
    /// Successful handshake.
    #[must_use]
    pub fn handshake_success(version: impl Into<String>, client_id: ClientId) -> Self {
        Self::HandshakeResponse(HandshakeResponse {
            success: true,
            version: Some(version.into()),
            client_id: Some(client_id),
        })
    }

    /// Failed handshake (no common version).
    #[must_use]
    pub fn handshake_failure() -> Self {
        Self::HandshakeResponse(HandshakeResponse {
            success: false,
            version: None,
            client_id: None,
        })
    }

    /// Successful action.
    #[must_use]
    pub fn action_success(callback_id: CallbackId, action_data: JsonObject) -> Self {
        Self::ActionResponse(ActionResponse {
            success: true,
            callback_id,
            action_data: Some(action_data),
            error_code: None,
            error_data: None,
        })
    }

    /// Failed action.
    #[must_use]
    pub fn action_failure(
        callback_id: CallbackId,
        error_code: impl Into<String>,
        error_data: JsonObject,
    ) -> Self {
        Self::ActionResponse(ActionResponse {
            success: false,
            callback_id,
            action_data: None,
            error_code: Some(error_code.into()),
            error_data: Some(error_data),
        })
    }

    /// Successful feed open.
    #[must_use]
    pub fn feed_open_success(feed: &Feed, feed_data: JsonObject) -> Self {
        Self::FeedOpenResponse(FeedOpenResponse {
            success: true,
            feed_name: feed.name().to_string(),
            feed_args: feed.args().clone(),
            feed_data: Some(feed_data),
            error_code: None,
            error_data: None,
        })
    }

    /// Failed feed open.
    #[must_use]
    pub fn feed_open_failure(
        feed: &Feed,
        error_code: impl Into<String>,
        error_data: JsonObject,
    ) -> Self {
        Self::FeedOpenResponse(FeedOpenResponse {
            success: false,
            feed_name: feed.name().to_string(),
            feed_args: feed.args().clone(),
            feed_data: None,
            error_code: Some(error_code.into()),
            error_data: Some(error_data),
        })
    }

    /// Feed closed.
    #[must_use]
    pub fn feed_close(feed: &Feed) -> Self {
        Self::FeedCloseResponse(FeedCloseResponse {
            feed_name: feed.name().to_string(),
            feed_args: feed.args().clone(),
        })
    }

    /// Feed terminated.
    #[must_use]
    pub fn feed_termination(
        feed: &Feed,
        error_code: impl Into<String>,
        error_data: JsonObject,
    ) -> Self {
        Self::FeedTermination(FeedTermination {
            feed_name: feed.name().to_string(),
            feed_args: feed.args().clone(),
            error_code: error_code.into(),
            error_data,
        })
    }

    /// Feed data changed.
    #[must_use]
    pub fn action_revelation(
        action_name: impl Into<String>,
        action_data: JsonObject,
        feed: &Feed,
        feed_deltas: Vec<FeedDelta>,
        feed_md5: Option<String>,
    ) -> Self {
        Self::ActionRevelation(ActionRevelation {
            action_name: action_name.into(),
            action_data,
            feed_name: feed.name().to_string(),
            feed_args: feed.args().clone(),
            feed_deltas,
            feed_md5,
        })
    }

    /// Protocol violation.
    #[must_use]
    pub fn violation(problem: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ViolationResponse(ViolationResponse {
            diagnostics: Diagnostics {
                problem: problem.into(),
                message: raw.into(),
            },
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
