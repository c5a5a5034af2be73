//! Stress tests for kvmodel.
//!
//! These helpers drive one database from many threads at once and report
//! what happened, so tests can assert on ids, winners and totals.

use kvmodel_core::{CoreError, Database, DeleteRequest, PersistRequest, RecordId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Logs a summary of the run.
    pub fn log_summary(&self, name: &str) {
        tracing::info!(
            name,
            total = self.total_ops,
            successful = self.successful_ops,
            failed = self.failed_ops,
            duration = ?self.duration,
            ops_per_second = self.ops_per_second,
            "stress run finished"
        );
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Namespace the operations target.
    pub namespace: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 50,
            threads: 8,
            namespace: "Stress".to_string(),
        }
    }
}

/// Runs `op(thread, iteration)` on `config.threads` threads released at the
/// same instant.
fn run_threads<F>(config: &StressConfig, op: F) -> StressTestResult
where
    F: Fn(usize, usize) -> bool + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(config.threads));
    let operations = config.operations;

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let op = Arc::clone(&op);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                for i in 0..operations {
                    if op(t, i) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Persists records without ids from every thread at once.
///
/// Returns the run result and every id handed out.
pub fn stress_concurrent_persists(
    db: Arc<Database>,
    config: &StressConfig,
) -> (StressTestResult, Vec<RecordId>) {
    let ids = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let collected = Arc::clone(&ids);
    let namespace = config.namespace.clone();

    let result = run_threads(config, move |t, i| {
        let request = PersistRequest::new(namespace.as_str())
            .attribute("writer", t.to_string())
            .index("writer", [t.to_string()])
            .index("round", [i.to_string()]);
        match db.persist(request) {
            Ok(id) => {
                collected.lock().push(id);
                true
            }
            Err(_) => false,
        }
    });

    let ids = std::mem::take(&mut *ids.lock());
    (result, ids)
}

/// Every thread tries to claim the same unique value for a fresh record.
///
/// Returns the ids that won and the number of `UniqueIndexViolation`
/// rejections.
pub fn stress_unique_race(db: Arc<Database>, config: &StressConfig) -> (Vec<RecordId>, usize) {
    let winners = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let rejected = Arc::new(AtomicUsize::new(0));
    let won = Arc::clone(&winners);
    let lost = Arc::clone(&rejected);
    let namespace = config.namespace.clone();

    run_threads(config, move |t, _| {
        let request = PersistRequest::new(namespace.as_str())
            .attribute("writer", t.to_string())
            .unique("slug", "contested");
        match db.persist(request) {
            Ok(id) => {
                won.lock().push(id);
                true
            }
            Err(CoreError::UniqueIndexViolation { .. }) => {
                lost.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(_) => false,
        }
    });

    let winners = std::mem::take(&mut *winners.lock());
    (winners, rejected.load(Ordering::Relaxed))
}

/// Threads repeatedly move a shared set of records between index values
/// and occasionally delete and recreate them.
pub fn stress_index_churn(db: Arc<Database>, config: &StressConfig, records: u32) -> StressTestResult {
    let namespace = config.namespace.clone();
    let records = records.max(1);

    run_threads(config, move |t, i| {
        let slot = u32::try_from(t + i).unwrap_or(0) % records + 1;
        let id = RecordId::from(slot.to_string());
        let outcome = if (t + i) % 7 == 0 {
            db.delete(DeleteRequest::new(namespace.as_str(), id)).map(|_| ())
        } else {
            let status = ["pending", "active", "done"][(t * 31 + i) % 3];
            db.persist(
                PersistRequest::new(namespace.as_str())
                    .with_id(id)
                    .attribute("status", status)
                    .index("status", [status])
                    .unique("slot", slot.to_string()),
            )
            .map(|_| ())
        };
        outcome.is_ok()
    })
}
