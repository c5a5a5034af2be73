//! # kvmodel Store
//!
//! Store client contract and implementations for kvmodel.
//!
//! This crate provides the lowest-level store abstraction for kvmodel.
//! Stores are **plain key-value servers** - they know nothing about
//! records, indices or uniqueness.
//!
//! ## Design Principles
//!
//! - A closed set of commands ([`Command`]) and reply shapes ([`Reply`])
//! - Watch key versions, then apply a batch atomically if none changed
//! - Batches are all-or-nothing: an error inside a batch discards it
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For tests, embedded use, and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use kvmodel_store::{ExecOutcome, InMemoryStore, KeyspaceExt, Store};
//!
//! let store = InMemoryStore::new();
//! let watch = store.watch(&["User:all".to_string()]).unwrap();
//! let outcome = store
//!     .multi(&watch, &mut |ks| {
//!         ks.sadd("User:all", ["1"])?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(outcome, ExecOutcome::Committed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod command;
mod error;
mod keyspace;
mod memory;

pub use backend::{Batch, ExecOutcome, Store, Watch};
pub use command::{Command, Reply};
pub use error::{StoreError, StoreResult};
pub use keyspace::{Keyspace, KeyspaceExt};
pub use memory::{InMemoryStore, StoredValue};
