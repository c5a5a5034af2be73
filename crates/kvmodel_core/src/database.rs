//! Database facade.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::record::{query, DeleteRequest, PersistRequest};
use crate::transaction::{CommitReport, Transaction, TransactionManager, TransactionStats};
use crate::types::{Attributes, RecordId};
use kvmodel_store::{InMemoryStore, Store};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// The main database handle.
///
/// `Database` owns a store handle and a retry policy. It provides:
/// - Persist and delete of single records
/// - Composed transactions over any number of records
/// - Reads of attributes, indices, uniques and counters
///
/// The handle is `Send + Sync`; share it between threads behind an `Arc`.
/// Every guarantee comes from the store's watch/multi primitive, so any
/// number of handles (in this process or elsewhere) may use the same store.
///
/// # Example
///
/// ```rust
/// use kvmodel_core::{Database, PersistRequest};
///
/// let db = Database::open_in_memory();
/// let id = db
///     .persist(
///         PersistRequest::new("User")
///             .attribute("name", "Alice")
///             .index("name", ["Alice"])
///             .unique("email", "a@x.com"),
///     )
///     .unwrap();
/// assert_eq!(id, "1");
/// assert!(db.find("User", "name", "Alice").unwrap().contains(&id));
/// ```
pub struct Database {
    /// Configuration.
    config: Config,
    /// Commits transactions against the store.
    txn_manager: TransactionManager,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens a database over `store`.
    pub fn open(store: Arc<dyn Store>, config: Config) -> Self {
        debug!(max_attempts = config.retry.max_attempts, "opening database");
        Self {
            txn_manager: TransactionManager::new(store, config.retry.clone()),
            config,
            is_open: RwLock::new(true),
        }
    }

    /// Opens a database over a fresh [`InMemoryStore`].
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open(Arc::new(InMemoryStore::new()), Config::default())
    }

    /// Returns the store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        self.txn_manager.store()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns commit totals since the database was opened.
    #[must_use]
    pub fn stats(&self) -> TransactionStats {
        self.txn_manager.stats()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Creates or updates one record, returning its id.
    ///
    /// # Errors
    ///
    /// Returns `UniqueIndexViolation` naming the conflicting field (nothing
    /// is written), `InvalidRequest`, `ContentionExhausted`, or a store
    /// error.
    pub fn persist(&self, request: PersistRequest) -> CoreResult<RecordId> {
        self.ensure_open()?;
        let mut txn = Transaction::new();
        let handle = txn.persist(request);
        self.txn_manager.commit(&txn)?;
        handle
            .id()
            .ok_or_else(|| CoreError::programming("committed persist published no id"))
    }

    /// Deletes one record and everything tracked for it.
    ///
    /// Returns whether the record existed; deleting a missing record is a
    /// successful no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `ContentionExhausted`, or a store error.
    pub fn delete(&self, request: DeleteRequest) -> CoreResult<bool> {
        self.ensure_open()?;
        let mut txn = Transaction::new();
        let handle = txn.delete(request);
        self.txn_manager.commit(&txn)?;
        handle
            .existed()
            .ok_or_else(|| CoreError::programming("committed delete published no outcome"))
    }

    /// Commits a transaction with the configured retry policy.
    ///
    /// # Errors
    ///
    /// See [`Transaction::commit_with`].
    pub fn commit(&self, txn: &Transaction) -> CoreResult<CommitReport> {
        self.ensure_open()?;
        self.txn_manager.commit(txn)
    }

    /// Builds a transaction with `f` and commits it.
    ///
    /// If `f` returns `Err`, nothing is committed.
    ///
    /// # Errors
    ///
    /// Returns the error of `f` or of the commit.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<T>,
    {
        self.ensure_open()?;
        let mut txn = Transaction::new();
        let value = f(&mut txn)?;
        self.txn_manager.commit(&txn)?;
        Ok(value)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns true if `id` is a live record of `namespace`.
    pub fn exists(&self, namespace: &str, id: &RecordId) -> CoreResult<bool> {
        self.ensure_open()?;
        query::exists(self.store().as_ref(), namespace, id)
    }

    /// Loads a record's attributes.
    pub fn load(&self, namespace: &str, id: &RecordId) -> CoreResult<Option<Attributes>> {
        self.ensure_open()?;
        query::load(self.store().as_ref(), namespace, id)
    }

    /// Returns every live id of `namespace`.
    pub fn all_ids(&self, namespace: &str) -> CoreResult<BTreeSet<RecordId>> {
        self.ensure_open()?;
        query::all_ids(self.store().as_ref(), namespace)
    }

    /// Returns the number of live records in `namespace`.
    pub fn count(&self, namespace: &str) -> CoreResult<u64> {
        self.ensure_open()?;
        query::count(self.store().as_ref(), namespace)
    }

    /// Returns the ids indexed under (field, value).
    pub fn find(&self, namespace: &str, field: &str, value: &str) -> CoreResult<BTreeSet<RecordId>> {
        self.ensure_open()?;
        query::find(self.store().as_ref(), namespace, field, value)
    }

    /// Returns the ids matching every (field, value) filter.
    pub fn find_all(
        &self,
        namespace: &str,
        filters: &[(&str, &str)],
    ) -> CoreResult<BTreeSet<RecordId>> {
        self.ensure_open()?;
        query::find_all(self.store().as_ref(), namespace, filters)
    }

    /// Returns the owner of a unique value.
    pub fn with_unique(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> CoreResult<Option<RecordId>> {
        self.ensure_open()?;
        query::with_unique(self.store().as_ref(), namespace, field, value)
    }

    /// Adds `by` to a record counter, returning the new value.
    pub fn incr_counter(
        &self,
        namespace: &str,
        id: &RecordId,
        name: &str,
        by: i64,
    ) -> CoreResult<i64> {
        self.ensure_open()?;
        query::incr_counter(self.store().as_ref(), namespace, id, name, by)
    }

    /// Reads a record counter.
    pub fn counter(&self, namespace: &str, id: &RecordId, name: &str) -> CoreResult<i64> {
        self.ensure_open()?;
        query::counter(self.store().as_ref(), namespace, id, name)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes the database and its store handle.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        self.store().close()?;
        *is_open = false;
        debug!("database closed");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Ensures the database is open.
    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
