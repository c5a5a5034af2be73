//! Store trait definition.

use crate::command::{Command, Reply};
use crate::error::StoreResult;
use crate::keyspace::Keyspace;

/// A version snapshot of a set of watched keys.
///
/// Produced by [`Store::watch`] and consumed by [`Store::multi`]: the batch
/// only applies if none of these keys were modified in between.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watch {
    versions: Vec<(String, u64)>,
}

impl Watch {
    /// A watch over no keys. A batch under it always applies.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a watch from observed key versions.
    #[must_use]
    pub fn from_versions(versions: Vec<(String, u64)>) -> Self {
        Self { versions }
    }

    /// Returns the watched keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|(k, _)| k.as_str())
    }

    /// Returns the observed versions.
    #[must_use]
    pub fn versions(&self) -> &[(String, u64)] {
        &self.versions
    }

    /// Returns true if no keys are watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Outcome of a conditional batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Every staged write was applied.
    Committed,
    /// A watched key changed; nothing was applied.
    Conflict,
}

impl ExecOutcome {
    /// Returns true if the batch was applied.
    #[must_use]
    pub fn is_committed(self) -> bool {
        self == Self::Committed
    }
}

/// A batch of commands run inside [`Store::multi`].
pub type Batch<'a> = dyn FnMut(&mut dyn Keyspace) -> StoreResult<()> + 'a;

/// A key-value store offering watch plus conditional atomic batches.
///
/// This is the only thing the core requires of a backing store: single
/// commands, a way to snapshot key versions, and a way to apply a batch of
/// commands indivisibly if none of the snapshotted keys changed.
///
/// # Invariants
///
/// - Every command that modifies a key advances that key's version.
/// - A batch passed to `multi` either applies completely or not at all.
/// - No other client observes a partially applied batch.
/// - Implementations must be `Send + Sync` for concurrent access.
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - thread-safe, in-process store
pub trait Store: Send + Sync {
    /// Executes a single command and commits it immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the command fails.
    fn execute(&self, command: Command) -> StoreResult<Reply>;

    /// Snapshots the current version of each key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or unreachable.
    fn watch(&self, keys: &[String]) -> StoreResult<Watch>;

    /// Runs `batch` against a staged view of the keyspace and applies its
    /// writes atomically.
    ///
    /// If any key in `watch` changed since it was snapshotted, the batch is
    /// not applied and [`ExecOutcome::Conflict`] is returned. If `batch`
    /// returns an error, every staged write is discarded and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed, or whatever `batch` failed
    /// with.
    fn multi(&self, watch: &Watch, batch: &mut Batch<'_>) -> StoreResult<ExecOutcome>;

    /// Closes the store handle. Later calls fail with `StoreError::Closed`.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails.
    fn close(&self) -> StoreResult<()>;

    /// Returns true until [`Store::close`] is called.
    fn is_open(&self) -> bool;
}
