//! # kvmodel Testkit
//!
//! Test utilities for kvmodel.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - Whole-namespace consistency checks
//! - Store wrappers that force watch conflicts
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use kvmodel_core::PersistRequest;
//! use kvmodel_testkit::prelude::*;
//!
//! let test_db = TestDatabase::memory();
//! test_db
//!     .persist(PersistRequest::new("User").index("name", ["Alice"]))
//!     .unwrap();
//! assert_eq!(check_namespace(&test_db.store, "User"), Ok(()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod consistency;
pub mod contention;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::consistency::*;
    pub use crate::contention::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::stress::*;
}

pub use consistency::*;
pub use contention::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;

/// Installs a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test;
/// only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
