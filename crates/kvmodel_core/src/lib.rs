//! # kvmodel Core
//!
//! Record persistence over a watch/multi key-value store.
//!
//! This crate provides:
//! - Optimistic transactions with composable phases and bounded retry
//! - The persist protocol (unique check, id allocation, attribute replace,
//!   index and unique rebuild) as one atomic batch
//! - The delete protocol, idempotent and atomic
//! - Per-record membership tracking, so cleanup never needs a schema
//! - Index, unique and counter reads
//!
//! ## Example
//!
//! ```rust
//! use kvmodel_core::{Database, DeleteRequest, PersistRequest};
//!
//! let db = Database::open_in_memory();
//! let id = db
//!     .persist(PersistRequest::new("Task").index("status", ["pending"]))
//!     .unwrap();
//! db.persist(
//!     PersistRequest::new("Task")
//!         .with_id(id.clone())
//!         .index("status", ["done"]),
//! )
//! .unwrap();
//! assert!(db.find("Task", "status", "pending").unwrap().is_empty());
//!
//! db.delete(DeleteRequest::new("Task", id)).unwrap();
//! assert_eq!(db.count("Task").unwrap(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
pub mod record;
pub mod transaction;
mod types;

pub use config::{Config, RetryPolicy};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use record::{DeleteRequest, Keys, PersistRequest};
pub use transaction::{
    CommitReport, DeleteHandle, PersistHandle, Phase, Scratch, Transaction, TransactionManager,
    TransactionStats,
};
pub use types::{Attributes, RecordId};

pub use kvmodel_store::{InMemoryStore, Keyspace, KeyspaceExt, Store, StoreError};
