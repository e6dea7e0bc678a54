//! Server timing options.
//!
//! # Example
//!
//! ```
//! use feedme_server::ServerOptions;
//!
//! let options: ServerOptions = serde_json::from_str(r#"{"handshakeMs": 5000}"#).unwrap();
//! assert_eq!(options.handshake_ms, 5000);
//! assert_eq!(options.termination_ms, 30_000);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default handshake timeout in milliseconds.
pub const DEFAULT_HANDSHAKE_MS: u64 = 30_000;

/// Default delay before a terminated feed is forgotten, in milliseconds.
pub const DEFAULT_TERMINATION_MS: u64 = 30_000;

// ============================================================================
// ServerOptions
// ============================================================================

/// Server timing configuration. A value of 0 disables the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerOptions {
    /// Time a client has to complete a handshake before it is disconnected.
    pub handshake_ms: u64,

    /// Time a terminated feed stays remembered for a client.
    ///
    /// While remembered, the client's `FeedClose` is acknowledged without
    /// involving the application.
    pub termination_ms: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            handshake_ms: DEFAULT_HANDSHAKE_MS,
            termination_ms: DEFAULT_TERMINATION_MS,
        }
    }
}

impl ServerOptions {
    /// Creates options with the default timeouts.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_ms(mut self, ms: u64) -> Self {
        self.handshake_ms = ms;
        self
    }

    /// Sets the termination forget delay.
    #[inline]
    #[must_use]
    pub fn with_termination_ms(mut self, ms: u64) -> Self {
        self.termination_ms = ms;
        self
    }

    /// Returns the handshake timeout, `None` when disabled.
    #[must_use]
    pub fn handshake_timeout(&self) -> Option<Duration> {
        (self.handshake_ms > 0).then(|| Duration::from_millis(self.handshake_ms))
    }

    /// Returns the termination forget delay, `None` when disabled.
    #[must_use]
    pub fn termination_timeout(&self) -> Option<Duration> {
        (self.termination_ms > 0).then(|| Duration::from_millis(self.termination_ms))
    }

    /// Returns `true` if any timer is enabled.
    #[inline]
    #[must_use]
    pub fn uses_timers(&self) -> bool {
        self.handshake_ms > 0 || self.termination_ms > 0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.handshake_ms, 30_000);
        assert_eq!(options.termination_ms, 30_000);
        assert!(options.uses_timers());
    }

    #[test]
    fn test_zero_disables() {
        let options = ServerOptions::new()
            .with_handshake_ms(0)
            .with_termination_ms(0);
        assert_eq!(options.handshake_timeout(), None);
        assert_eq!(options.termination_timeout(), None);
        assert!(!options.uses_timers());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let options: ServerOptions =
            serde_json::from_str(r#"{"handshakeMs": 0, "terminationMs": 123}"#).expect("parse");
        assert_eq!(options.handshake_ms, 0);
        assert_eq!(
            options.termination_timeout(),
            Some(Duration::from_millis(123))
        );
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let options: ServerOptions = serde_json::from_str("{}").expect("parse");
        assert_eq!(options, ServerOptions::default());
    }

    #[test]
    fn test_negative_rejected() {
        assert!(serde_json::from_str::<ServerOptions>(r#"{"handshakeMs": -1}"#).is_err());
    }
}
