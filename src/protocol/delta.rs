//! Feed delta operations.
//!
//! Deltas travel in `ActionRevelation.FeedDeltas` and describe how a
//! client should mutate its copy of the feed data.
//!
//! # Format
//!
//! ```json
//! { "Operation": "Set", "Path": ["scores", 0], "Value": 3 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Path
// ============================================================================

/// One step of a delta path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index.
    Index(u64),
    /// Object key.
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<u64> for PathSegment {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

/// Location inside the feed data. Empty path is the root object.
pub type DeltaPath = Vec<PathSegment>;

// ============================================================================
// FeedDelta
// ============================================================================

/// A single feed delta operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Operation", deny_unknown_fields)]
pub enum FeedDelta {
    /// Writes `Value` at `Path`.
    #[serde(rename_all = "PascalCase")]
    Set {
        /// Target location.
        path: DeltaPath,
        /// New value.
        value: Value,
    },

    /// Removes the member or element at `Path`.
    #[serde(rename_all = "PascalCase")]
    Delete {
        /// Target location.
        path: DeltaPath,
    },

    /// Removes every element equal to `Value` from the array at `Path`.
    #[serde(rename_all = "PascalCase")]
    DeleteValue {
        /// Target array.
        path: DeltaPath,
        /// Value to remove.
        value: Value,
    },

    /// Prepends a string to the string at `Path`.
    #[serde(rename_all = "PascalCase")]
    Prepend {
        /// Target string.
        path: DeltaPath,
        /// Text to prepend.
        value: String,
    },

    /// Appends a string to the string at `Path`.
    #[serde(rename_all = "PascalCase")]
    Append {
        /// Target string.
        path: DeltaPath,
        /// Text to append.
        value: String,
    },

    /// Adds `Value` to the number at `Path`.
    #[serde(rename_all = "PascalCase")]
    Increment {
        /// Target number.
        path: DeltaPath,
        /// Amount.
        value: f64,
    },

    /// Subtracts `Value` from the number at `Path`.
    #[serde(rename_all = "PascalCase")]
    Decrement {
        /// Target number.
        path: DeltaPath,
        /// Amount.
        value: f64,
    },

    /// Flips the boolean at `Path`.
    #[serde(rename_all = "PascalCase")]
    Toggle {
        /// Target boolean.
        path: DeltaPath,
    },

    /// Inserts `Value` at the start of the array at `Path`.
    #[serde(rename_all = "PascalCase")]
    InsertFirst {
        /// Target array.
        path: DeltaPath,
        /// Inserted element.
        value: Value,
    },

    /// Inserts `Value` at the end of the array at `Path`.
    #[serde(rename_all = "PascalCase")]
    InsertLast {
        /// Target array.
        path: DeltaPath,
        /// Inserted element.
        value: Value,
    },

    /// Inserts `Value` before position `Index` of the array at `Path`.
    #[serde(rename_all = "PascalCase")]
    InsertBefore {
        /// Target array.
        path: DeltaPath,
        /// Position.
        index: u64,
        /// Inserted element.
        value: Value,
    },

    /// Inserts `Value` after position `Index` of the array at `Path`.
    #[serde(rename_all = "PascalCase")]
    InsertAfter {
        /// Target array.
        path: DeltaPath,
        /// Position.
        index: u64,
        /// Inserted element.
        value: Value,
    },

    /// Removes the first element of the array at `Path`.
    #[serde(rename_all = "PascalCase")]
    DeleteFirst {
        /// Target array.
        path: DeltaPath,
    },

    /// Removes the last element of the array at `Path`.
    #[serde(rename_all = "PascalCase")]
    DeleteLast {
        /// Target array.
        path: DeltaPath,
    },
}

impl FeedDelta {
    /// Returns the path this delta targets.
    #[must_use]
    pub fn path(&self) -> &DeltaPath {
        match self {
            Self::Set { path, .. }
            | Self::Delete { path }
            | Self::DeleteValue { path, .. }
            | Self::Prepend { path, .. }
            | Self::Append { path, .. }
            | Self::Increment { path, .. }
            | Self::Decrement { path, .. }
            | Self::Toggle { path }
            | Self::InsertFirst { path, .. }
            | Self::InsertLast { path, .. }
            | Self::InsertBefore { path, .. }
            | Self::InsertAfter { path, .. }
            | Self::DeleteFirst { path }
            | Self::DeleteLast { path } => path,
        }
    }

    /// Returns `true` if the delta can be represented as JSON.
    ///
    /// Non-finite increments cannot be encoded.
    #[must_use]
    pub fn is_json_representable(&self) -> bool {
        match self {
            Self::Increment { value, .. } | Self::Decrement { value, .. } => value.is_finite(),
            _ => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_set_serialization() {
        let delta = FeedDelta::Set {
            path: vec!["scores".into(), 0u64.into()],
            value: json!(3),
        };
        let json = serde_json::to_value(&delta).expect("serialize");
        assert_eq!(
            json,
            json!({"Operation": "Set", "Path": ["scores", 0], "Value": 3})
        );
    }

    #[test]
    fn test_insert_after_parse() {
        let delta: FeedDelta = serde_json::from_value(json!({
            "Operation": "InsertAfter",
            "Path": ["list"],
            "Index": 2,
            "Value": "x"
        }))
        .expect("parse");

        assert_eq!(
            delta,
            FeedDelta::InsertAfter {
                path: vec!["list".into()],
                index: 2,
                value: json!("x"),
            }
        );
        assert_eq!(delta.path(), &vec![PathSegment::Key("list".to_string())]);
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let result = serde_json::from_value::<FeedDelta>(json!({
            "Operation": "Explode",
            "Path": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_append_requires_string() {
        let result = serde_json::from_value::<FeedDelta>(json!({
            "Operation": "Append",
            "Path": ["name"],
            "Value": 5
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_non_finite_increment_not_representable() {
        let delta = FeedDelta::Increment {
            path: vec![],
            value: f64::NAN,
        };
        assert!(!delta.is_json_representable());

        let delta = FeedDelta::Toggle { path: vec![] };
        assert!(delta.is_json_representable());
    }
}
