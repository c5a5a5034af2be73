//! The commit loop.

use crate::config::RetryPolicy;
use crate::error::{CoreError, CoreResult};
use crate::transaction::scratch::Scratch;
use crate::transaction::state::{Step, Transaction, WriteFn};
use kvmodel_store::{ExecOutcome, Store, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What a successful commit took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    /// Attempts made, the successful one included.
    pub attempts: u32,
}

impl CommitReport {
    /// Returns the number of attempts lost to a watch conflict.
    #[must_use]
    pub fn conflicts(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl Transaction {
    /// Commits the transaction against `store` with the default retry
    /// policy.
    ///
    /// # Errors
    ///
    /// See [`Transaction::commit_with`].
    pub fn commit(&self, store: &dyn Store) -> CoreResult<CommitReport> {
        self.commit_with(store, &RetryPolicy::default())
    }

    /// Commits the transaction against `store`.
    ///
    /// Before hooks run once. Then, until an attempt commits: the watch set
    /// is snapshotted, the read steps run in registration order against a
    /// fresh [`Scratch`], and the write steps run in registration order
    /// inside [`Store::multi`]. An attempt whose watched keys changed is
    /// discarded and retried after the policy's backoff delay. After hooks
    /// run once the batch is committed.
    ///
    /// # Errors
    ///
    /// - `ContentionExhausted` if every attempt allowed by `retry` hit a
    ///   conflict
    /// - any error returned by a step or hook, unretried
    /// - store errors, unmodified
    ///
    /// An error from an after hook is returned although the batch is
    /// already committed.
    pub fn commit_with(&self, store: &dyn Store, retry: &RetryPolicy) -> CoreResult<CommitReport> {
        for hook in self.before_hooks() {
            (hook.func())()?;
        }

        let watch_keys = self.watch_keys();
        let writes: Vec<&Step<WriteFn>> = self.writes().collect();
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match self.attempt(store, &watch_keys, &writes)? {
                ExecOutcome::Committed => break,
                ExecOutcome::Conflict => {
                    if !retry.allows_retry_after(attempt) {
                        warn!(attempts = attempt, "giving up on contended transaction");
                        return Err(CoreError::ContentionExhausted { attempts: attempt });
                    }
                    let delay = retry.delay_for_attempt(attempt);
                    trace!(attempt, ?delay, "watched key changed, retrying");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        for hook in self.after_hooks() {
            (hook.func())()?;
        }

        debug!(
            attempts = attempt,
            watched = watch_keys.len(),
            writes = writes.len(),
            "transaction committed"
        );
        Ok(CommitReport { attempts: attempt })
    }

    fn attempt(
        &self,
        store: &dyn Store,
        watch_keys: &[String],
        writes: &[&Step<WriteFn>],
    ) -> CoreResult<ExecOutcome> {
        let watch = store.watch(watch_keys)?;

        let mut scratch = Scratch::new();
        for read in self.reads() {
            (read.func())(store, &mut scratch)?;
        }

        // Store errors travel through the batch as they are; anything else
        // is parked here and replaced by `BatchAborted`.
        let mut failure: Option<CoreError> = None;
        let outcome = store.multi(&watch, &mut |ks| {
            for write in writes {
                if let Err(err) = (write.func())(&mut *ks, &scratch) {
                    return Err(match err {
                        CoreError::Store(err) => err,
                        other => {
                            failure = Some(other);
                            StoreError::BatchAborted
                        }
                    });
                }
            }
            Ok(())
        });

        match (outcome, failure) {
            (_, Some(err)) => Err(err),
            (Ok(outcome), None) => Ok(outcome),
            (Err(err), None) => Err(err.into()),
        }
    }
}

/// Commits transactions against one store with one retry policy and keeps
/// running totals.
pub struct TransactionManager {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    committed: AtomicU64,
    conflicts: AtomicU64,
    exhausted: AtomicU64,
}

/// Running totals of a [`TransactionManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    /// Transactions committed.
    pub committed: u64,
    /// Attempts discarded because a watched key changed.
    pub conflicts: u64,
    /// Transactions that ran out of attempts.
    pub exhausted: u64,
}

impl TransactionManager {
    /// Creates a manager committing against `store`.
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            committed: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Returns the store transactions are committed against.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Commits `txn` with the manager's retry policy.
    ///
    /// # Errors
    ///
    /// See [`Transaction::commit_with`].
    pub fn commit(&self, txn: &Transaction) -> CoreResult<CommitReport> {
        match txn.commit_with(self.store.as_ref(), &self.retry) {
            Ok(report) => {
                self.committed.fetch_add(1, Ordering::Relaxed);
                self.conflicts
                    .fetch_add(u64::from(report.conflicts()), Ordering::Relaxed);
                Ok(report)
            }
            Err(CoreError::ContentionExhausted { attempts }) => {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                self.conflicts
                    .fetch_add(u64::from(attempts), Ordering::Relaxed);
                Err(CoreError::ContentionExhausted { attempts })
            }
            Err(err) => Err(err),
        }
    }

    /// Returns a snapshot of the running totals.
    #[must_use]
    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            committed: self.committed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("retry", &self.retry)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
