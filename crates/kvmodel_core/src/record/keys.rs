//! Key layout for records and their indices.
//!
//! | key                            | type   | content                       |
//! |--------------------------------|--------|-------------------------------|
//! | `{ns}:id`                      | string | id sequence                   |
//! | `{ns}:all`                     | set    | live ids                      |
//! | `{ns}:{id}`                    | hash   | attributes                    |
//! | `{ns}:indices:{field}:{value}` | set    | ids                           |
//! | `{ns}:uniques:{field}`         | hash   | value -> id                   |
//! | `{ns}:{id}:_indices`           | set    | index keys referencing the id |
//! | `{ns}:{id}:_uniques`           | hash   | unique key -> value           |
//! | `{ns}:{id}:counters`           | hash   | counter name -> integer       |
//! | `{ns}:{id}:{name}`             | any    | caller-declared ancillary key |

use crate::types::RecordId;

/// Separator between key segments.
pub const SEPARATOR: char = ':';

/// Ids that would collide with namespace-level keys.
pub const RESERVED_IDS: [&str; 4] = ["id", "all", "indices", "uniques"];

/// Builds the keys of one namespace.
#[derive(Debug, Clone, Copy)]
pub struct Keys<'a> {
    namespace: &'a str,
}

impl<'a> Keys<'a> {
    /// Creates the key builder for `namespace`.
    #[must_use]
    pub fn new(namespace: &'a str) -> Self {
        Self { namespace }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &'a str {
        self.namespace
    }

    /// The id sequence.
    #[must_use]
    pub fn sequence(&self) -> String {
        format!("{}:id", self.namespace)
    }

    /// The set of live ids.
    #[must_use]
    pub fn all(&self) -> String {
        format!("{}:all", self.namespace)
    }

    /// The attribute hash of a record.
    #[must_use]
    pub fn record(&self, id: &RecordId) -> String {
        format!("{}:{}", self.namespace, id)
    }

    /// The id set for one indexed (field, value).
    #[must_use]
    pub fn index(&self, field: &str, value: &str) -> String {
        format!("{}:indices:{}:{}", self.namespace, field, value)
    }

    /// The value -> id hash of a unique field.
    #[must_use]
    pub fn unique(&self, field: &str) -> String {
        format!("{}:uniques:{}", self.namespace, field)
    }

    /// Index keys currently referencing a record.
    #[must_use]
    pub fn tracked_indices(&self, id: &RecordId) -> String {
        format!("{}:{}:_indices", self.namespace, id)
    }

    /// Unique keys (with their values) currently referencing a record.
    #[must_use]
    pub fn tracked_uniques(&self, id: &RecordId) -> String {
        format!("{}:{}:_uniques", self.namespace, id)
    }

    /// Counters of a record.
    #[must_use]
    pub fn counters(&self, id: &RecordId) -> String {
        format!("{}:{}:counters", self.namespace, id)
    }

    /// A key sharing the record's lifecycle.
    #[must_use]
    pub fn ancillary(&self, id: &RecordId, name: &str) -> String {
        format!("{}:{}:{}", self.namespace, id, name)
    }
}
