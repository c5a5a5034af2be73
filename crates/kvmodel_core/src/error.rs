//! Error types for kvmodel core.

use kvmodel_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in kvmodel core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error, passed through unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Another record already owns a unique value.
    ///
    /// Nothing was written. The caller has to change the value before
    /// trying again.
    #[error("UniqueIndexViolation: {field}")]
    UniqueIndexViolation {
        /// The unique field whose value is taken.
        field: String,
    },

    /// Watched keys kept changing until the retry policy gave up.
    #[error("contention exhausted after {attempts} attempts")]
    ContentionExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// A transaction step misused the per-attempt scratch store.
    ///
    /// Never retried.
    #[error("programming error: {message}")]
    Programming {
        /// What went wrong.
        message: String,
    },

    /// A persist or delete request is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },

    /// A hook or step aborted the transaction.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a unique index violation error.
    pub fn unique_violation(field: impl Into<String>) -> Self {
        Self::UniqueIndexViolation {
            field: field.into(),
        }
    }

    /// Creates a programming error.
    pub fn programming(message: impl Into<String>) -> Self {
        Self::Programming {
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Returns the violating field if this is a uniqueness rejection.
    #[must_use]
    pub fn violated_field(&self) -> Option<&str> {
        match self {
            Self::UniqueIndexViolation { field } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_names_field() {
        let err = CoreError::unique_violation("email");
        assert_eq!(err.violated_field(), Some("email"));
        assert_eq!(err.to_string(), "UniqueIndexViolation: email");
    }

    #[test]
    fn store_errors_convert() {
        let err: CoreError = StoreError::Closed.into();
        assert!(matches!(err, CoreError::Store(StoreError::Closed)));
        assert_eq!(err.violated_field(), None);
    }
}
