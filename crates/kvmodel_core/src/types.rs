//! Core type definitions for kvmodel.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a record within its namespace.
///
/// Ids are strings. When the caller does not supply one, the persist
/// protocol allocates the next value of the namespace's sequence, so
/// generated ids are decimal integers starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<str> for RecordId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RecordId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A record's stored attributes, ordered by name.
pub type Attributes = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_conversions() {
        assert_eq!(RecordId::from(7i64).as_str(), "7");
        assert_eq!(RecordId::from("abc"), "abc");
        assert_eq!(RecordId::new("x").into_string(), "x");
    }

    #[test]
    fn record_id_display() {
        let id = RecordId::from(42i64);
        assert_eq!(format!("{id}"), "42");
    }

    #[test]
    fn record_id_serializes_as_string() {
        let json = serde_json::to_string(&RecordId::from("12")).unwrap();
        assert_eq!(json, "\"12\"");
    }
}
