//! Application-issued feed commands: revelations and terminations.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::protocol::{Feed, FeedDelta, JsonObject, feed_md5, is_md5_hex};

// ============================================================================
// Revelation
// ============================================================================

/// An action result broadcast to every client with a feed open.
///
/// # Example
///
/// ```
/// use feedme_server::{Feed, FeedDelta, Revelation};
///
/// let revelation = Revelation::new("chat_message", Feed::with_args("chat", [("room", "lobby")]))
///     .action_data(serde_json::Map::new())
///     .delta(FeedDelta::Append {
///         path: vec!["log".into()],
///         value: "hello".to_string(),
///     });
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Revelation {
    action_name: String,
    action_data: JsonObject,
    feed: Feed,
    feed_deltas: Vec<FeedDelta>,
    feed_md5: Option<String>,
    feed_data: Option<JsonObject>,
}

impl Revelation {
    /// Creates a revelation with no data and no deltas.
    #[must_use]
    pub fn new(action_name: impl Into<String>, feed: Feed) -> Self {
        Self {
            action_name: action_name.into(),
            action_data: JsonObject::new(),
            feed,
            feed_deltas: Vec::new(),
            feed_md5: None,
            feed_data: None,
        }
    }

    /// Sets the action data.
    #[must_use]
    pub fn action_data(mut self, data: JsonObject) -> Self {
        self.action_data = data;
        self
    }

    /// Appends one delta.
    #[must_use]
    pub fn delta(mut self, delta: FeedDelta) -> Self {
        self.feed_deltas.push(delta);
        self
    }

    /// Replaces the delta list.
    #[must_use]
    pub fn deltas(mut self, deltas: Vec<FeedDelta>) -> Self {
        self.feed_deltas = deltas;
        self
    }

    /// Sets the hash of the post-delta feed data.
    #[must_use]
    pub fn feed_md5(mut self, md5: impl Into<String>) -> Self {
        self.feed_md5 = Some(md5.into());
        self
    }

    /// Sets the post-delta feed data; its hash is sent to clients.
    #[must_use]
    pub fn feed_data(mut self, data: JsonObject) -> Self {
        self.feed_data = Some(data);
        self
    }

    #[inline]
    pub(crate) fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Validates the revelation and resolves the hash to send.
    pub(crate) fn validate(&self) -> Result<Option<String>> {
        if self.action_name.is_empty() {
            return Err(Error::invalid_argument("Action name must not be empty"));
        }
        if self.feed.name().is_empty() {
            return Err(Error::invalid_argument("Feed name must not be empty"));
        }
        if let Some(delta) = self.feed_deltas.iter().find(|d| !d.is_json_representable()) {
            return Err(Error::invalid_argument(format!(
                "Feed delta is not JSON-representable: {delta:?}"
            )));
        }

        match (&self.feed_md5, &self.feed_data) {
            (Some(_), Some(_)) => Err(Error::invalid_argument(
                "Only one of feed MD5 and feed data may be given",
            )),
            (Some(md5), None) if !is_md5_hex(md5) => Err(Error::invalid_argument(format!(
                "Feed MD5 must be 32 hex characters: {md5}"
            ))),
            (Some(md5), None) => Ok(Some(md5.to_ascii_lowercase())),
            (None, Some(data)) => feed_md5(data).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Splits into the parts of an `ActionRevelation` message.
    pub(crate) fn into_parts(self) -> (String, JsonObject, Vec<FeedDelta>) {
        (self.action_name, self.action_data, self.feed_deltas)
    }
}

// ============================================================================
// Termination
// ============================================================================

/// What a [`Termination`] applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationTarget {
    /// One feed of one client.
    ClientFeed(ClientId, Feed),
    /// Every feed of one client.
    Client(ClientId),
    /// One feed for every client.
    Feed(Feed),
}

/// A server-initiated feed termination.
#[derive(Debug, Clone, PartialEq)]
pub struct Termination {
    /// Targeted subscriptions.
    pub target: TerminationTarget,
    /// Error code sent to clients.
    pub error_code: String,
    /// Error data sent to clients.
    pub error_data: JsonObject,
}

impl Termination {
    /// Terminates one feed for one client.
    #[must_use]
    pub fn client_feed(
        client_id: ClientId,
        feed: Feed,
        error_code: impl Into<String>,
        error_data: JsonObject,
    ) -> Self {
        Self::with_target(TerminationTarget::ClientFeed(client_id, feed), error_code, error_data)
    }

    /// Terminates every feed of one client.
    #[must_use]
    pub fn client(client_id: ClientId, error_code: impl Into<String>, error_data: JsonObject) -> Self {
        Self::with_target(TerminationTarget::Client(client_id), error_code, error_data)
    }

    /// Terminates one feed for every client.
    #[must_use]
    pub fn feed(feed: Feed, error_code: impl Into<String>, error_data: JsonObject) -> Self {
        Self::with_target(TerminationTarget::Feed(feed), error_code, error_data)
    }

    fn with_target(
        target: TerminationTarget,
        error_code: impl Into<String>,
        error_data: JsonObject,
    ) -> Self {
        Self {
            target,
            error_code: error_code.into(),
            error_data,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.error_code.is_empty() {
            return Err(Error::invalid_argument("Error code must not be empty"));
        }
        match &self.target {
            TerminationTarget::ClientFeed(_, feed) | TerminationTarget::Feed(feed)
                if feed.name().is_empty() =>
            {
                Err(Error::invalid_argument("Feed name must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
