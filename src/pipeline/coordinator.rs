//! Pipeline coordination
//!
//! Wires the three stages together, owns the shared shutdown flag, and
//! joins everything in dependency order: enumerator first, then the worker
//! pool, then the serializer. Worker counters are aggregated before the
//! final report so retries survive into the stats.
//!
//! Error precedence follows the flow of data: a listing failure outranks a
//! fetch failure, which outranks a serialization failure, since a failure
//! upstream is usually the root cause of whatever broke downstream.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ArchiveConfig;
use crate::error::{ArchiverError, Result};
use crate::pipeline::enumerator::KeyEnumerator;
use crate::pipeline::queue::{key_queue_with_stats, record_handoff, QueueStats};
use crate::pipeline::serializer::ArchiveSerializer;
use crate::pipeline::worker::{aggregate_stats, FetchWorker};
use crate::store::ObjectStore;

/// How often the progress callback fires
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Final report for an archiving run
#[derive(Debug, Clone)]
pub struct ArchiveStats {
    /// Object keys the enumerator queued
    pub keys_listed: u64,

    /// Entries written to the archive
    pub entries_written: u64,

    /// Body bytes written, before padding and compression
    pub bytes_written: u64,

    /// Transient fetch retries across the pool
    pub retries: u64,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Whether the run finished without interruption
    pub completed: bool,
}

/// Snapshot handed to the progress callback
#[derive(Debug, Clone)]
pub struct ArchiveProgress {
    /// Entries written so far
    pub entries: u64,

    /// Body bytes written so far
    pub bytes: u64,

    /// Keys waiting in the queue
    pub queue_len: u64,

    /// Time since the run started
    pub elapsed: Duration,

    /// Size of the worker pool
    pub total_workers: usize,
}

impl ArchiveProgress {
    /// Average entry throughput since the start of the run
    pub fn entries_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.entries as f64 / secs
        } else {
            0.0
        }
    }
}

/// Orchestrates enumerator, worker pool, and serializer for one run
pub struct ArchiveCoordinator {
    config: ArchiveConfig,
    shutdown: Arc<AtomicBool>,
    queue_stats: Arc<QueueStats>,
    entries_count: Arc<AtomicU64>,
    bytes_count: Arc<AtomicU64>,
}

impl ArchiveCoordinator {
    /// Create a coordinator for the given configuration
    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            queue_stats: Arc::new(QueueStats::default()),
            entries_count: Arc::new(AtomicU64::new(0)),
            bytes_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared shutdown flag, for wiring up signal handlers
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the pipeline, writing the archive to `sink`
    pub fn run<W: Write + Send + 'static>(
        &self,
        store: Arc<dyn ObjectStore>,
        sink: W,
    ) -> Result<ArchiveStats> {
        let start = Instant::now();

        let (key_tx, key_rx) =
            key_queue_with_stats(self.config.queue_capacity, Arc::clone(&self.queue_stats));
        let (record_tx, record_rx) = record_handoff();

        let mut enumerator = KeyEnumerator::spawn(
            Arc::clone(&store),
            self.config.page_size,
            key_tx,
            Arc::clone(&self.shutdown),
        )?;

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for id in 0..self.config.worker_count {
            workers.push(FetchWorker::spawn(
                id,
                Arc::clone(&store),
                key_rx.clone(),
                record_tx.clone(),
                self.config.retry,
                Arc::clone(&self.shutdown),
            )?);
        }

        // The workers hold the only live ends now. When the last worker
        // drops its sender the handoff closes and the serializer finalizes.
        drop(key_rx);
        drop(record_tx);

        let mut serializer = ArchiveSerializer::spawn(
            sink,
            self.config.compress,
            self.config.timestamp,
            record_rx,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.entries_count),
            Arc::clone(&self.bytes_count),
        )?;

        debug!(
            workers = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            page_size = self.config.page_size,
            "pipeline started"
        );

        let listing = enumerator.join();

        let mut worker_failure = None;
        for worker in &mut workers {
            if let Err(e) = worker.join() {
                warn!(worker = worker.id(), error = %e, "worker failed");
                if worker_failure.is_none() {
                    worker_failure = Some(e);
                }
            }
        }
        let (_fetched, _bytes, retries) = aggregate_stats(&workers);

        let serialized = serializer.join();

        let keys_listed = match listing {
            Ok(count) => count,
            Err(e) => return Err(ArchiverError::Store(e)),
        };
        if let Some(e) = worker_failure {
            return Err(ArchiverError::Worker(e));
        }
        let report = serialized.map_err(ArchiverError::Archive)?;

        let interrupted = self.shutdown.load(Ordering::SeqCst);
        let stats = ArchiveStats {
            keys_listed,
            entries_written: report.entries,
            bytes_written: report.bytes,
            retries,
            duration: start.elapsed(),
            completed: !interrupted,
        };

        info!(
            keys = stats.keys_listed,
            entries = stats.entries_written,
            bytes = stats.bytes_written,
            retries = stats.retries,
            completed = stats.completed,
            "archiving run finished"
        );

        Ok(stats)
    }

    /// Run the pipeline with a periodic progress callback
    ///
    /// The callback fires from a dedicated thread a few times per second
    /// while the pipeline runs, then once more after it finishes.
    pub fn run_with_progress<W, F>(
        &self,
        store: Arc<dyn ObjectStore>,
        sink: W,
        callback: F,
    ) -> Result<ArchiveStats>
    where
        W: Write + Send + 'static,
        F: Fn(&ArchiveProgress) + Send + 'static,
    {
        let entries = Arc::clone(&self.entries_count);
        let bytes = Arc::clone(&self.bytes_count);
        let queue_stats = Arc::clone(&self.queue_stats);
        let ticker_stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&ticker_stop);
        let total_workers = self.config.worker_count;
        let start = Instant::now();

        let ticker = thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    callback(&ArchiveProgress {
                        entries: entries.load(Ordering::Relaxed),
                        bytes: bytes.load(Ordering::Relaxed),
                        queue_len: queue_stats.depth(),
                        elapsed: start.elapsed(),
                        total_workers,
                    });
                    thread::sleep(PROGRESS_INTERVAL);
                }
                // final snapshot so the display lands on the true totals
                callback(&ArchiveProgress {
                    entries: entries.load(Ordering::Relaxed),
                    bytes: bytes.load(Ordering::Relaxed),
                    queue_len: queue_stats.depth(),
                    elapsed: start.elapsed(),
                    total_workers,
                });
            })?;

        let result = self.run(store, sink);

        ticker_stop.store(true, Ordering::SeqCst);
        let _ = ticker.join();

        result
    }
}
