//! Feed identity and content hashing.
//!
//! A feed is addressed by name plus an argument object. The pair is
//! reduced to a canonical [`FeedKey`] so that argument order never
//! matters when indexing subscriptions.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use md5::{Digest, Md5};
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// JSON object payload (`ActionArgs`, `ActionData`, `FeedData`, `ErrorData`).
pub type JsonObject = Map<String, Value>;

/// Feed arguments. Keys are kept sorted, values are strings on the wire.
pub type FeedArgs = BTreeMap<String, String>;

/// Length of a hex-encoded MD5 digest.
const MD5_HEX_LEN: usize = 32;

// ============================================================================
// FeedKey
// ============================================================================

/// Canonical serialization of a feed name and its arguments.
///
/// Format is the JSON text of `[FeedName, FeedArgs]` with argument keys
/// sorted, e.g. `["some_feed",{"a":"1","b":"2"}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedKey(String);

impl FeedKey {
    /// Serializes a feed name and arguments into a key.
    #[must_use]
    pub fn serialize(name: &str, args: &FeedArgs) -> Self {
        let args = args
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<JsonObject>();
        let serial = Value::Array(vec![Value::String(name.to_string()), Value::Object(args)]);
        Self(serial.to_string())
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Feed
// ============================================================================

/// A named, argument-parameterized feed.
///
/// Equality and hashing go through the canonical [`FeedKey`].
#[derive(Debug, Clone)]
pub struct Feed {
    name: String,
    args: FeedArgs,
    key: FeedKey,
}

impl Feed {
    /// Creates a feed from a name and argument map.
    #[must_use]
    pub fn new(name: impl Into<String>, args: FeedArgs) -> Self {
        let name = name.into();
        let key = FeedKey::serialize(&name, &args);
        Self { name, args, key }
    }

    /// Creates a feed from any iterator of argument pairs.
    ///
    /// # Example
    ///
    /// ```
    /// use feedme_server::Feed;
    ///
    /// let a = Feed::with_args("scores", [("league", "nhl"), ("season", "2024")]);
    /// let b = Feed::with_args("scores", [("season", "2024"), ("league", "nhl")]);
    /// assert_eq!(a.key(), b.key());
    /// ```
    #[must_use]
    pub fn with_args<I, K, V>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let args = args
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(name, args)
    }

    /// Returns the feed name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the feed arguments.
    #[inline]
    #[must_use]
    pub fn args(&self) -> &FeedArgs {
        &self.args
    }

    /// Returns the canonical feed key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &FeedKey {
        &self.key
    }
}

impl PartialEq for Feed {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Feed {}

impl Hash for Feed {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}

// ============================================================================
// Content Hash
// ============================================================================

/// Computes the `FeedMd5` hash of feed data.
///
/// Hex-encoded MD5 of the compact JSON text. `serde_json::Map` keeps keys
/// sorted (the `preserve_order` feature must stay off), so the text is
/// canonical.
///
/// # Errors
///
/// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
pub fn feed_md5(data: &JsonObject) -> Result<String> {
    let text = serde_json::to_vec(data)?;
    Ok(hex::encode(Md5::digest(&text)))
}

/// Returns `true` if `value` looks like a hex-encoded MD5 digest.
#[must_use]
pub fn is_md5_hex(value: &str) -> bool {
    value.len() == MD5_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

// ============================================================================
// Tests
// ============================================================================
