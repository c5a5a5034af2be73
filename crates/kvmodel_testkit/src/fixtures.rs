//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use kvmodel_core::{Config, Database, RetryPolicy};
use kvmodel_store::{InMemoryStore, Store, StoredValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A test database over an in-memory store the test can inspect.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The store behind `db`.
    pub store: Arc<InMemoryStore>,
}

impl TestDatabase {
    /// Creates a new in-memory test database with the default config.
    pub fn memory() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new in-memory test database with `config`.
    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let db = Database::open(Arc::clone(&store) as Arc<dyn Store>, config);
        Self { db, store }
    }

    /// Creates a test database whose commits retry forever without delay.
    pub fn unbounded() -> Self {
        Self::with_config(Config::new().retry(RetryPolicy::unbounded()))
    }

    /// Returns a copy of every key in the store.
    pub fn snapshot(&self) -> BTreeMap<String, StoredValue> {
        self.store.snapshot()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use kvmodel_core::PersistRequest;
/// use kvmodel_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     let id = db.persist(PersistRequest::new("User")).unwrap();
///     assert_eq!(id, "1");
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use kvmodel_core::{PersistRequest, RecordId};

    /// The request saving a user the way a schema layer would flatten it:
    /// `name` is indexed, `email` is unique.
    pub fn user(name: &str, email: &str) -> PersistRequest {
        PersistRequest::new("User")
            .attribute("name", name)
            .attribute("email", email)
            .index("name", [name])
            .unique("email", email)
    }

    /// The request saving a task with a single indexed status.
    pub fn task(status: &str) -> PersistRequest {
        PersistRequest::new("Task")
            .attribute("status", status)
            .index("status", [status])
    }

    /// Creates a database holding `count` users `user0..`, each with email
    /// `user{i}@example.com`.
    pub fn populated_database(count: usize) -> (TestDatabase, Vec<RecordId>) {
        let test_db = TestDatabase::memory();
        let ids = (0..count)
            .map(|i| {
                test_db
                    .persist(user(&format!("user{i}"), &format!("user{i}@example.com")))
                    .expect("Failed to persist user")
            })
            .collect();
        (test_db, ids)
    }
}
