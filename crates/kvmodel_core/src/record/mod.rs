//! Records: the persist and delete protocols and the keys they maintain.
//!
//! A record lives in a namespace (`User`, `Post`, ...) and occupies the keys
//! laid out in [`keys`].
//!
//! [`persist`] and [`delete`] must run inside an atomic batch; use
//! [`crate::Transaction::persist`] or [`crate::Database`] to get one.

mod delete;
pub mod keys;
pub mod membership;
mod persist;
pub mod query;
mod request;

pub use delete::delete;
pub use keys::Keys;
pub use persist::persist;
pub use request::{DeleteRequest, PersistRequest};
