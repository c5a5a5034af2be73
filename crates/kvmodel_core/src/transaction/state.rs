//! Transaction phases and their composition.

use crate::error::CoreResult;
use crate::record::{self, DeleteRequest, PersistRequest};
use crate::transaction::scratch::Scratch;
use crate::types::RecordId;
use kvmodel_store::{Keyspace, Store};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A read step: runs once per attempt, after watching and before the batch.
pub type ReadFn = dyn Fn(&dyn Store, &mut Scratch) -> CoreResult<()> + Send + Sync;

/// A write step: runs inside the atomic batch of each attempt.
pub type WriteFn = dyn Fn(&mut dyn Keyspace, &Scratch) -> CoreResult<()> + Send + Sync;

/// A before or after hook: runs once per commit, outside the retry loop.
pub type HookFn = dyn Fn() -> CoreResult<()> + Send + Sync;

static NEXT_STEP_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered step.
///
/// Assigned when the step is registered and kept by every clone, so the
/// same step appended twice is merged instead of run twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(u64);

impl StepId {
    fn next() -> Self {
        Self(NEXT_STEP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A registered closure together with its identity.
pub struct Step<F: ?Sized> {
    id: StepId,
    f: Arc<F>,
}

impl<F: ?Sized> Step<F> {
    fn new(f: Arc<F>) -> Self {
        Self {
            id: StepId::next(),
            f,
        }
    }

    /// Returns the step's identity.
    #[must_use]
    pub fn id(&self) -> StepId {
        self.id
    }

    pub(crate) fn func(&self) -> &F {
        &self.f
    }
}

impl<F: ?Sized> Clone for Step<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            f: Arc::clone(&self.f),
        }
    }
}

impl<F: ?Sized> PartialEq for Step<F> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<F: ?Sized> Eq for Step<F> {}

impl<F: ?Sized> fmt::Debug for Step<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step({})", self.id.0)
    }
}

/// One entry of a transaction's phase list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// A key whose modification aborts the current attempt.
    Watch(String),
    /// A step run before the batch on every attempt.
    Read(Step<ReadFn>),
    /// A step run inside the batch on every attempt.
    Write(Step<WriteFn>),
    /// A hook run once before the first attempt.
    Before(Step<HookFn>),
    /// A hook run once after a successful commit.
    After(Step<HookFn>),
}

/// A composable optimistic transaction.
///
/// A transaction is a list of phases. Nothing runs until it is committed
/// (see [`Transaction::commit`]); the same transaction can be committed
/// more than once.
///
/// # Example
///
/// ```rust
/// use kvmodel_core::Transaction;
/// use kvmodel_store::{InMemoryStore, KeyspaceExt};
///
/// let store = InMemoryStore::new();
/// let mut txn = Transaction::new();
/// txn.watch(["counter"])
///     .read(|store, scratch| {
///         let mut ks = store;
///         let current = ks.get("counter")?.unwrap_or_default();
///         scratch.put("current", current)
///     })
///     .write(|ks, scratch| {
///         let current = scratch.get::<String>("current")?;
///         ks.set("counter", &format!("{current}+"))?;
///         Ok(())
///     });
/// txn.commit(&store).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    phases: Vec<Phase>,
}

impl Transaction {
    /// Creates an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers keys to watch. Keys already watched are ignored.
    pub fn watch<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            self.push(Phase::Watch(key.into()));
        }
        self
    }

    /// Registers a read step.
    pub fn read<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&dyn Store, &mut Scratch) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.push(Phase::Read(Step::new(Arc::new(f))));
        self
    }

    /// Registers a write step.
    pub fn write<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut dyn Keyspace, &Scratch) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.push(Phase::Write(Step::new(Arc::new(f))));
        self
    }

    /// Registers a hook run once before the first attempt.
    pub fn before<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> CoreResult<()> + Send + Sync + 'static,
    {
        self.push(Phase::Before(Step::new(Arc::new(f))));
        self
    }

    /// Registers a hook run once after a successful commit.
    pub fn after<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> CoreResult<()> + Send + Sync + 'static,
    {
        self.push(Phase::After(Step::new(Arc::new(f))));
        self
    }

    /// Merges the phases of `other` into this transaction.
    ///
    /// Watch keys are merged by value and steps by [`StepId`], so appending
    /// the same transaction twice is the same as appending it once.
    pub fn append(&mut self, other: &Transaction) -> &mut Self {
        for phase in &other.phases {
            self.push(phase.clone());
        }
        self
    }

    /// Adds the persist protocol for `request` as a write step.
    ///
    /// The record's unique keys and, for an existing id, its hash and
    /// tracked sets are watched. The returned handle yields the record id
    /// once the transaction has committed.
    pub fn persist(&mut self, request: PersistRequest) -> PersistHandle {
        let handle = PersistHandle::default();
        let slot = Arc::clone(&handle.slot);
        let published = Arc::clone(&handle.slot);
        self.watch(request.watch_keys())
            .write(move |ks, _| {
                let id = record::persist(ks, &request)?;
                slot.lock().staged = Some(id);
                Ok(())
            })
            .after(move || {
                published.lock().publish();
                Ok(())
            });
        handle
    }

    /// Adds the delete protocol for `request` as a write step.
    ///
    /// The returned handle tells whether the record existed once the
    /// transaction has committed.
    pub fn delete(&mut self, request: DeleteRequest) -> DeleteHandle {
        let handle = DeleteHandle::default();
        let slot = Arc::clone(&handle.slot);
        let published = Arc::clone(&handle.slot);
        self.watch(request.watch_keys())
            .write(move |ks, _| {
                let existed = record::delete(ks, &request)?;
                slot.lock().staged = Some(existed);
                Ok(())
            })
            .after(move || {
                published.lock().publish();
                Ok(())
            });
        handle
    }

    /// Returns the phase list in registration order.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Returns the watched keys in registration order.
    #[must_use]
    pub fn watch_keys(&self) -> Vec<String> {
        self.phases
            .iter()
            .filter_map(|phase| match phase {
                Phase::Watch(key) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns true if no phase has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub(crate) fn reads(&self) -> impl Iterator<Item = &Step<ReadFn>> {
        self.phases.iter().filter_map(|phase| match phase {
            Phase::Read(step) => Some(step),
            _ => None,
        })
    }

    pub(crate) fn writes(&self) -> impl Iterator<Item = &Step<WriteFn>> {
        self.phases.iter().filter_map(|phase| match phase {
            Phase::Write(step) => Some(step),
            _ => None,
        })
    }

    pub(crate) fn before_hooks(&self) -> impl Iterator<Item = &Step<HookFn>> {
        self.phases.iter().filter_map(|phase| match phase {
            Phase::Before(step) => Some(step),
            _ => None,
        })
    }

    pub(crate) fn after_hooks(&self) -> impl Iterator<Item = &Step<HookFn>> {
        self.phases.iter().filter_map(|phase| match phase {
            Phase::After(step) => Some(step),
            _ => None,
        })
    }

    fn push(&mut self, phase: Phase) {
        if !self.phases.contains(&phase) {
            self.phases.push(phase);
        }
    }
}

/// Result slot filled by a write step and published by an after hook.
#[derive(Debug)]
struct Slot<T> {
    staged: Option<T>,
    committed: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            staged: None,
            committed: None,
        }
    }
}

impl<T> Slot<T> {
    fn publish(&mut self) {
        if let Some(value) = self.staged.take() {
            self.committed = Some(value);
        }
    }
}

/// The id of a record persisted by a transaction.
#[derive(Debug, Clone, Default)]
pub struct PersistHandle {
    slot: Arc<Mutex<Slot<RecordId>>>,
}

impl PersistHandle {
    /// Returns the record id, or `None` until the transaction has committed.
    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        self.slot.lock().committed.clone()
    }
}

/// The outcome of a record deleted by a transaction.
#[derive(Debug, Clone, Default)]
pub struct DeleteHandle {
    slot: Arc<Mutex<Slot<bool>>>,
}

impl DeleteHandle {
    /// Returns whether the record existed, or `None` until the transaction
    /// has committed.
    #[must_use]
    pub fn existed(&self) -> Option<bool> {
        self.slot.lock().committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_write(_: &mut dyn Keyspace, _: &Scratch) -> CoreResult<()> {
        Ok(())
    }

    #[test]
    fn watch_keys_are_deduplicated() {
        let mut txn = Transaction::new();
        txn.watch(["a", "b"]).watch(["b", "c"]).watch(["a"]);
        assert_eq!(txn.watch_keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn append_merges_by_value() {
        let mut shared = Transaction::new();
        shared.watch(["User:uniques:email"]).write(noop_write);

        let mut left = Transaction::new();
        left.watch(["User:1"]).append(&shared);
        let mut right = Transaction::new();
        right.append(&shared).watch(["User:1"]);

        let mut combined = Transaction::new();
        combined.append(&left).append(&right).append(&shared);

        assert_eq!(combined.watch_keys(), vec!["User:1", "User:uniques:email"]);
        assert_eq!(combined.writes().count(), 1);
    }

    #[test]
    fn separately_registered_steps_are_distinct() {
        let mut txn = Transaction::new();
        txn.write(noop_write).write(noop_write);
        assert_eq!(txn.writes().count(), 2);
    }

    #[test]
    fn clones_share_step_identity() {
        let mut txn = Transaction::new();
        txn.read(|_, _| Ok(()));
        let copy = txn.clone();
        assert_eq!(copy, txn);

        let mut merged = txn.clone();
        merged.append(&copy);
        assert_eq!(merged.phases().len(), 1);
    }

    #[test]
    fn phases_keep_registration_order() {
        let mut txn = Transaction::new();
        txn.before(|| Ok(()))
            .watch(["k"])
            .read(|_, _| Ok(()))
            .write(noop_write)
            .after(|| Ok(()));

        let kinds: Vec<&str> = txn
            .phases()
            .iter()
            .map(|phase| match phase {
                Phase::Watch(_) => "watch",
                Phase::Read(_) => "read",
                Phase::Write(_) => "write",
                Phase::Before(_) => "before",
                Phase::After(_) => "after",
            })
            .collect();
        assert_eq!(kinds, vec!["before", "watch", "read", "write", "after"]);
    }

    #[test]
    fn persist_registers_watches_and_steps() {
        let mut txn = Transaction::new();
        let handle = txn.persist(
            PersistRequest::new("User")
                .with_id("1")
                .unique("email", "a@x.com"),
        );
        assert_eq!(
            txn.watch_keys(),
            vec![
                "User:uniques:email",
                "User:1",
                "User:1:_indices",
                "User:1:_uniques"
            ]
        );
        assert_eq!(txn.writes().count(), 1);
        assert_eq!(txn.after_hooks().count(), 1);
        assert_eq!(handle.id(), None);
    }
}
