//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store handle has been closed.
    #[error("store is closed")]
    Closed,

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A command was applied to a key holding a different kind of value.
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType {
        /// The key that was accessed.
        key: String,
        /// The kind of value the command operates on.
        expected: &'static str,
    },

    /// A counter command found a value that is not an integer.
    #[error("value at {key} is not an integer")]
    NotAnInteger {
        /// The key (or key/field) that was accessed.
        key: String,
    },

    /// A reply did not have the shape the caller asked for.
    #[error("unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply {
        /// The expected reply shape.
        expected: &'static str,
        /// The reply shape that was received.
        got: &'static str,
    },

    /// A batch closure asked the store to discard its staged writes.
    #[error("batch aborted")]
    BatchAborted,
}

impl StoreError {
    /// Creates a wrong-type error.
    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.into(),
            expected,
        }
    }

    /// Creates a not-an-integer error.
    pub fn not_an_integer(key: impl Into<String>) -> Self {
        Self::NotAnInteger { key: key.into() }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if the error is about reaching the store rather than
    /// about the data in it.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Closed | Self::Unavailable(_))
    }
}
