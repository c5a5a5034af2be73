//! A store wrapper that loses races on purpose.
//!
//! [`ContendedStore`] runs an interfering write against the inner store
//! right before each of the first N batches, the way a concurrent client
//! would between another client's watch and its batch. [`TouchingStore`]
//! only advances versions, so every retry reads the same values.

use kvmodel_store::{Batch, Command, ExecOutcome, InMemoryStore, Reply, Store, StoreResult, Watch};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type Interference = dyn Fn(&InMemoryStore, u32) + Send + Sync;

/// Wraps an [`InMemoryStore`] and interferes with the first batches.
pub struct ContendedStore {
    inner: Arc<InMemoryStore>,
    remaining: AtomicU32,
    interfere: Box<Interference>,
    conflicts: Mutex<Vec<u32>>,
    batches: AtomicU32,
}

impl ContendedStore {
    /// Runs `interfere(store, round)` before each of the first `rounds`
    /// batches. `round` counts from 1.
    pub fn new<F>(inner: Arc<InMemoryStore>, rounds: u32, interfere: F) -> Self
    where
        F: Fn(&InMemoryStore, u32) + Send + Sync + 'static,
    {
        Self {
            inner,
            remaining: AtomicU32::new(rounds),
            interfere: Box::new(interfere),
            conflicts: Mutex::new(Vec::new()),
            batches: AtomicU32::new(0),
        }
    }

    /// Returns the inner store.
    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    /// Returns the number of batches attempted.
    pub fn batches(&self) -> u32 {
        self.batches.load(Ordering::SeqCst)
    }

    /// Returns the batch numbers (from 1) that ended in a conflict.
    pub fn conflicts(&self) -> Vec<u32> {
        self.conflicts.lock().clone()
    }
}

impl Store for ContendedStore {
    fn execute(&self, command: Command) -> StoreResult<Reply> {
        self.inner.execute(command)
    }

    fn watch(&self, keys: &[String]) -> StoreResult<Watch> {
        self.inner.watch(keys)
    }

    fn multi(&self, watch: &Watch, batch: &mut Batch<'_>) -> StoreResult<ExecOutcome> {
        let number = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            (self.interfere)(&self.inner, number);
        }
        let outcome = self.inner.multi(watch, batch)?;
        if outcome == ExecOutcome::Conflict {
            self.conflicts.lock().push(number);
        }
        Ok(outcome)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

/// Wraps an [`InMemoryStore`] and advances the version of every watched key
/// before the first batches, leaving values unchanged.
pub struct TouchingStore {
    inner: Arc<InMemoryStore>,
    remaining: AtomicU32,
    batches: AtomicU32,
    conflicts: AtomicU32,
}

impl TouchingStore {
    /// Touches the watched keys before each of the first `rounds` batches.
    pub fn new(inner: Arc<InMemoryStore>, rounds: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(rounds),
            batches: AtomicU32::new(0),
            conflicts: AtomicU32::new(0),
        }
    }

    /// Returns the number of batches attempted.
    pub fn batches(&self) -> u32 {
        self.batches.load(Ordering::SeqCst)
    }

    /// Returns the number of batches that ended in a conflict.
    pub fn conflicts(&self) -> u32 {
        self.conflicts.load(Ordering::SeqCst)
    }
}

impl Store for TouchingStore {
    fn execute(&self, command: Command) -> StoreResult<Reply> {
        self.inner.execute(command)
    }

    fn watch(&self, keys: &[String]) -> StoreResult<Watch> {
        self.inner.watch(keys)
    }

    fn multi(&self, watch: &Watch, batch: &mut Batch<'_>) -> StoreResult<ExecOutcome> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let keys: Vec<String> = watch.keys().map(str::to_string).collect();
            for key in keys {
                self.inner.touch(&key)?;
            }
        }
        let outcome = self.inner.multi(watch, batch)?;
        if outcome == ExecOutcome::Conflict {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}
