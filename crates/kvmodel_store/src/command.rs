//! The closed set of commands a store understands, and their replies.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// A single store command.
///
/// Every operation the core performs against a store is one of these
/// variants. Stores never see free-form command names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Reads a string value.
    Get {
        /// Key to read.
        key: String,
    },
    /// Writes a string value, replacing whatever the key held.
    Set {
        /// Key to write.
        key: String,
        /// New value.
        value: String,
    },
    /// Deletes keys. Replies with the number of keys removed.
    Del {
        /// Keys to delete.
        keys: Vec<String>,
    },
    /// Replies 1 if the key exists, 0 otherwise.
    Exists {
        /// Key to check.
        key: String,
    },
    /// Adds `by` to an integer string value, creating it at 0 first.
    IncrBy {
        /// Counter key.
        key: String,
        /// Increment (may be negative).
        by: i64,
    },
    /// Reads one hash field.
    HGet {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
    },
    /// Writes hash fields. Replies with the number of new fields.
    HSet {
        /// Hash key.
        key: String,
        /// Field/value pairs.
        pairs: Vec<(String, String)>,
    },
    /// Removes hash fields. Replies with the number removed.
    HDel {
        /// Hash key.
        key: String,
        /// Fields to remove.
        fields: Vec<String>,
    },
    /// Reads every field/value pair of a hash, ordered by field.
    HGetAll {
        /// Hash key.
        key: String,
    },
    /// Reads every field name of a hash, ordered.
    HKeys {
        /// Hash key.
        key: String,
    },
    /// Adds `by` to an integer hash field.
    HIncrBy {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
        /// Increment (may be negative).
        by: i64,
    },
    /// Adds set members. Replies with the number newly added.
    SAdd {
        /// Set key.
        key: String,
        /// Members to add.
        members: Vec<String>,
    },
    /// Removes set members. Replies with the number removed.
    SRem {
        /// Set key.
        key: String,
        /// Members to remove.
        members: Vec<String>,
    },
    /// Reads every member of a set, ordered.
    SMembers {
        /// Set key.
        key: String,
    },
    /// Replies 1 if `member` is in the set, 0 otherwise.
    SIsMember {
        /// Set key.
        key: String,
        /// Member to check.
        member: String,
    },
    /// Replies with the cardinality of a set.
    SCard {
        /// Set key.
        key: String,
    },
    /// Intersects sets, replying with the ordered common members.
    SInter {
        /// Set keys.
        keys: Vec<String>,
    },
}

impl Command {
    /// Returns the command name, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::Set { .. } => "SET",
            Self::Del { .. } => "DEL",
            Self::Exists { .. } => "EXISTS",
            Self::IncrBy { .. } => "INCRBY",
            Self::HGet { .. } => "HGET",
            Self::HSet { .. } => "HSET",
            Self::HDel { .. } => "HDEL",
            Self::HGetAll { .. } => "HGETALL",
            Self::HKeys { .. } => "HKEYS",
            Self::HIncrBy { .. } => "HINCRBY",
            Self::SAdd { .. } => "SADD",
            Self::SRem { .. } => "SREM",
            Self::SMembers { .. } => "SMEMBERS",
            Self::SIsMember { .. } => "SISMEMBER",
            Self::SCard { .. } => "SCARD",
            Self::SInter { .. } => "SINTER",
        }
    }

    /// Returns true if the command can modify the keyspace.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Set { .. }
                | Self::Del { .. }
                | Self::IncrBy { .. }
                | Self::HSet { .. }
                | Self::HDel { .. }
                | Self::HIncrBy { .. }
                | Self::SAdd { .. }
                | Self::SRem { .. }
        )
    }
}

/// The reply to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// No value.
    Nil,
    /// Acknowledgement without a value.
    Ok,
    /// An integer.
    Integer(i64),
    /// A single string.
    Bulk(String),
    /// An ordered list of strings.
    Array(Vec<String>),
    /// Ordered field/value pairs.
    Pairs(Vec<(String, String)>),
}

impl Reply {
    /// Returns the reply shape, for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Ok => "ok",
            Self::Integer(_) => "integer",
            Self::Bulk(_) => "bulk",
            Self::Array(_) => "array",
            Self::Pairs(_) => "pairs",
        }
    }

    fn unexpected(&self, expected: &'static str) -> StoreError {
        StoreError::UnexpectedReply {
            expected,
            got: self.kind(),
        }
    }

    /// Converts an `Ok` reply.
    pub fn into_ok(self) -> StoreResult<()> {
        match self {
            Self::Ok => Ok(()),
            other => Err(other.unexpected("ok")),
        }
    }

    /// Converts an integer reply.
    pub fn into_integer(self) -> StoreResult<i64> {
        match self {
            Self::Integer(n) => Ok(n),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Converts a bulk-or-nil reply.
    pub fn into_optional_string(self) -> StoreResult<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Bulk(s) => Ok(Some(s)),
            other => Err(other.unexpected("bulk or nil")),
        }
    }

    /// Converts an array reply.
    pub fn into_strings(self) -> StoreResult<Vec<String>> {
        match self {
            Self::Array(items) => Ok(items),
            other => Err(other.unexpected("array")),
        }
    }

    /// Converts a pairs reply.
    pub fn into_pairs(self) -> StoreResult<Vec<(String, String)>> {
        match self {
            Self::Pairs(pairs) => Ok(pairs),
            other => Err(other.unexpected("pairs")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_conversions() {
        assert_eq!(Reply::Integer(3).into_integer().unwrap(), 3);
        assert_eq!(Reply::Nil.into_optional_string().unwrap(), None);
        assert_eq!(
            Reply::Bulk("x".into()).into_optional_string().unwrap(),
            Some("x".to_string())
        );
        assert!(Reply::Ok.into_ok().is_ok());
    }

    #[test]
    fn reply_shape_mismatch_is_reported() {
        let err = Reply::Bulk("x".into()).into_integer().unwrap_err();
        assert_eq!(
            err,
            StoreError::UnexpectedReply {
                expected: "integer",
                got: "bulk"
            }
        );
    }

    #[test]
    fn write_commands_are_classified() {
        assert!(Command::SAdd {
            key: "k".into(),
            members: vec![]
        }
        .is_write());
        assert!(!Command::SMembers { key: "k".into() }.is_write());
        assert_eq!(Command::HGetAll { key: "k".into() }.name(), "HGETALL");
    }
}
