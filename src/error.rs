//! Error types for the Feedme server.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use feedme_server::{Result, Server};
//!
//! fn launch(server: &Server) -> Result<()> {
//!     server.start()?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | API misuse | [`Error::InvalidArgument`], [`Error::InvalidState`], [`Error::Config`] |
//! | Client violations | [`Error::InvalidMessage`], [`Error::UnexpectedMessage`] |
//! | Timeouts | [`Error::HandshakeTimeout`] |
//! | Transport | [`Error::Transport`], [`Error::TransportStopping`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant maps to a stable error code, see [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // API Misuse
    // ========================================================================
    /// Invalid argument passed to an application-facing call.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Call made while the server or transport is in the wrong state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the state conflict.
        message: String,
    },

    /// Configuration error.
    ///
    /// Returned when the server builder is missing required pieces.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Client Violations
    // ========================================================================
    /// Client sent a frame that is not valid JSON or violates the schema.
    #[error("Invalid message: {problem} ({detail})")]
    InvalidMessage {
        /// Problem reported to the client in the violation response.
        problem: String,
        /// Parser or validator diagnostic.
        detail: String,
    },

    /// Client sent a well-formed message out of sequence.
    #[error("Unexpected message: {problem}")]
    UnexpectedMessage {
        /// Problem reported to the client in the violation response.
        problem: String,
    },

    // ========================================================================
    // Timeouts
    // ========================================================================
    /// Client did not complete a handshake in time.
    #[error("Handshake timeout after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Client dropped because the transport is stopping.
    #[error("Transport stopping")]
    TransportStopping,

    /// Connection closed by the remote end.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid message error.
    #[inline]
    pub fn invalid_message(problem: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidMessage {
            problem: problem.into(),
            detail: detail.into(),
        }
    }

    /// Creates an unexpected message error.
    #[inline]
    pub fn unexpected_message(problem: impl Into<String>) -> Self {
        Self::UnexpectedMessage {
            problem: problem.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Codes & Predicates
// ============================================================================

impl Error {
    /// Returns the stable error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Config { .. } => "CONFIG",
            Self::InvalidMessage { .. } => "INVALID_MESSAGE",
            Self::UnexpectedMessage { .. } => "UNEXPECTED_MESSAGE",
            Self::HandshakeTimeout { .. } => "HANDSHAKE_TIMEOUT",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::TransportStopping => "TRANSPORT_STOPPING",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::Io(_) => "IO",
            Self::Json(_) => "JSON",
            Self::WebSocket(_) => "WEBSOCKET",
        }
    }

    /// Returns the problem text sent to the client, if this is a client violation.
    #[must_use]
    pub fn problem(&self) -> Option<&str> {
        match self {
            Self::InvalidMessage { problem, .. } | Self::UnexpectedMessage { problem } => {
                Some(problem)
            }
            _ => None,
        }
    }

    /// Returns `true` if this error was caused by a misbehaving client.
    #[inline]
    #[must_use]
    pub fn is_client_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMessage { .. } | Self::UnexpectedMessage { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. })
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::TransportStopping
                | Self::ConnectionClosed
                | Self::Io(_)
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_argument("empty feed name");
        assert_eq!(err.to_string(), "Invalid argument: empty feed name");

        let err = Error::handshake_timeout(500);
        assert_eq!(err.to_string(), "Handshake timeout after 500ms");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::invalid_argument("x").code(), "INVALID_ARGUMENT");
        assert_eq!(Error::invalid_state("x").code(), "INVALID_STATE");
        assert_eq!(Error::handshake_timeout(1).code(), "HANDSHAKE_TIMEOUT");
        assert_eq!(Error::TransportStopping.code(), "TRANSPORT_STOPPING");
        assert_eq!(
            Error::unexpected_message("Handshake required.").code(),
            "UNEXPECTED_MESSAGE"
        );
    }

    #[test]
    fn test_problem_only_for_violations() {
        let err = Error::invalid_message("Invalid JSON.", "expected value at line 1");
        assert_eq!(err.problem(), Some("Invalid JSON."));
        assert!(err.is_client_violation());

        let err = Error::transport("gone");
        assert_eq!(err.problem(), None);
        assert!(!err.is_client_violation());
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::handshake_timeout(10).is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::AddrInUse, "address in use");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
