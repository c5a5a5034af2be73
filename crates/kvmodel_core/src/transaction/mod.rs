//! Optimistic transactions over watch and atomic batches.
//!
//! A [`Transaction`] is an explicit list of phases:
//! - **Watch**: keys whose modification aborts the current attempt
//! - **Read**: steps re-run on every attempt, filling a per-attempt [`Scratch`]
//! - **Write**: steps run inside the store's atomic batch
//! - **Before / After**: hooks run once, outside the retry loop
//!
//! Transactions compose with [`Transaction::append`], which merges phases by
//! value so independent concerns can share one atomic commit.

mod manager;
mod scratch;
mod state;

pub use manager::{CommitReport, TransactionManager, TransactionStats};
pub use scratch::Scratch;
pub use state::{
    DeleteHandle, HookFn, PersistHandle, Phase, ReadFn, Step, StepId, Transaction, WriteFn,
};
