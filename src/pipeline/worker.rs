//! Fetch worker pool
//!
//! Each worker pulls keys from the shared queue, fetches the object, and
//! hands the record to the serializer over the rendezvous channel. A fetch
//! attempt resolves to exactly one of three outcomes: success, retryable
//! (a truncated body, retried locally with backoff), or fatal (sets the
//! shutdown flag and ends the run).
//!
//! Retrying locally instead of re-queueing the key keeps ordering concerns
//! out of the queue and puts a hard bound on attempts per key.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::error::{StoreError, WorkerError};
use crate::pipeline::queue::{KeyReceiver, NextKey, RecordSender};
use crate::store::{ObjectRecord, ObjectStore};

/// Backoff slice between shutdown checks while waiting to retry
const BACKOFF_POLL: Duration = Duration::from_millis(50);

/// Bounded retry settings for transient fetch failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per key, first try included
    pub max_attempts: u32,

    /// Pause before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Resolution of a single fetch attempt
enum AttemptOutcome {
    Success(ObjectRecord),
    Retryable(StoreError),
    Fatal(StoreError),
}

fn classify(result: Result<ObjectRecord, StoreError>) -> AttemptOutcome {
    match result {
        Ok(record) => AttemptOutcome::Success(record),
        Err(e) if e.is_transient() => AttemptOutcome::Retryable(e),
        Err(e) => AttemptOutcome::Fatal(e),
    }
}

/// Per-worker counters, shared with the coordinator for progress display
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Objects fetched and handed off
    pub fetched: AtomicU64,

    /// Body bytes fetched
    pub bytes: AtomicU64,

    /// Retry attempts made (not counting first tries)
    pub retries: AtomicU64,
}

/// Fetch `key`, retrying transient failures within the policy's bounds
///
/// Returns `Ok(None)` when shutdown was flagged during a backoff pause.
pub fn fetch_with_retry(
    store: &dyn ObjectStore,
    key: &str,
    policy: RetryPolicy,
    stats: &WorkerStats,
    shutdown: &AtomicBool,
) -> Result<Option<ObjectRecord>, WorkerError> {
    let mut attempt: u32 = 1;

    loop {
        match classify(store.fetch(key)) {
            AttemptOutcome::Success(record) => {
                stats.fetched.fetch_add(1, Ordering::Relaxed);
                stats.bytes.fetch_add(record.len, Ordering::Relaxed);
                return Ok(Some(record));
            }
            AttemptOutcome::Retryable(e) => {
                if attempt >= policy.max_attempts {
                    return Err(WorkerError::RetriesExhausted {
                        key: key.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                warn!(key = %key, attempt, error = %e, "transient fetch failure, retrying");
                stats.retries.fetch_add(1, Ordering::Relaxed);
                attempt += 1;
                if !backoff_sleep(policy.backoff, shutdown) {
                    return Ok(None);
                }
            }
            AttemptOutcome::Fatal(e) => {
                return Err(WorkerError::Fetch {
                    key: key.to_string(),
                    source: e,
                });
            }
        }
    }
}

/// Sleep for `duration` in small slices, bailing out if shutdown is flagged
///
/// Returns `false` when interrupted.
fn backoff_sleep(duration: Duration, shutdown: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(BACKOFF_POLL);
        thread::sleep(slice);
        remaining -= slice;
    }
    !shutdown.load(Ordering::Relaxed)
}

/// A single fetch worker thread
pub struct FetchWorker {
    id: usize,
    handle: Option<JoinHandle<Result<(), WorkerError>>>,
    stats: Arc<WorkerStats>,
}

impl FetchWorker {
    /// Spawn a worker thread
    pub fn spawn(
        id: usize,
        store: Arc<dyn ObjectStore>,
        keys: KeyReceiver,
        records: RecordSender,
        policy: RetryPolicy,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let worker_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("fetch-{}", id))
            .spawn(move || {
                worker_loop(
                    id,
                    store.as_ref(),
                    &keys,
                    &records,
                    policy,
                    &worker_stats,
                    &shutdown,
                )
            })
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Worker id
    pub fn id(&self) -> usize {
        self.id
    }

    /// Shared counters for this worker
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(&mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WorkerError::Panicked { id: self.id })?,
            None => Ok(()),
        }
    }
}

fn worker_loop(
    id: usize,
    store: &dyn ObjectStore,
    keys: &KeyReceiver,
    records: &RecordSender,
    policy: RetryPolicy,
    stats: &WorkerStats,
    shutdown: &AtomicBool,
) -> Result<(), WorkerError> {
    debug!(worker = id, "worker started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!(worker = id, "worker stopping on shutdown");
            return Ok(());
        }

        let key = match keys.next() {
            NextKey::Key(key) => key,
            NextKey::Empty => continue,
            NextKey::Closed => {
                debug!(worker = id, "key queue drained, worker exiting");
                return Ok(());
            }
        };

        trace!(worker = id, key = %key, "fetching");

        match fetch_with_retry(store, &key, policy, stats, shutdown) {
            Ok(Some(record)) => {
                if !records.send(record) {
                    // serializer is gone; the run is ending either way
                    debug!(worker = id, "record handoff closed, worker exiting");
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(worker = id, key = %key, error = %e, "fatal fetch failure");
                shutdown.store(true, Ordering::SeqCst);
                return Err(e);
            }
        }
    }
}

/// Sum counters across a worker pool
pub fn aggregate_stats(workers: &[FetchWorker]) -> (u64, u64, u64) {
    let mut fetched = 0;
    let mut bytes = 0;
    let mut retries = 0;
    for worker in workers {
        let stats = worker.stats();
        fetched += stats.fetched.load(Ordering::Relaxed);
        bytes += stats.bytes.load(Ordering::Relaxed);
        retries += stats.retries.load(Ordering::Relaxed);
    }
    (fetched, bytes, retries)
}
