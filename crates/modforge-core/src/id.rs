use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an entry in a category's enumeration space. Cheap to copy and compare.
///
/// Built-in entries occupy indices below the reserved offset; entries
/// contributed by packages are allocated at or above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentIdx(pub u32);

impl ContentIdx {
    /// The index as it is written into a content object's `idx` field.
    pub fn as_json(self) -> serde_json::Value {
        serde_json::Value::from(self.0)
    }
}

impl fmt::Display for ContentIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value of the `idx` field that requests a freshly allocated index.
pub const SENTINEL_IDX: i64 = -1;

/// Name of the field carrying a content object's index.
pub const IDX_FIELD: &str = "idx";
