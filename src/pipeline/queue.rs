//! Key queue and record handoff
//!
//! The pipeline's two backpressure points, as first-class types:
//!
//! - The **key queue** is a bounded multi-producer/multi-consumer channel.
//!   The enumerator blocks when it is full, which caps memory at the queue
//!   capacity no matter how large the bucket is.
//! - The **record handoff** is a zero-capacity rendezvous channel. A worker
//!   handing off a fetched record blocks until the serializer takes it,
//!   which throttles fetch throughput to serialization throughput.
//!
//! Blocking operations wake periodically to observe the shutdown flag so a
//! fatal classification anywhere in the pipeline unblocks every stage.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::store::ObjectRecord;

/// How often blocked queue operations re-check the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters shared by both ends of the key queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Keys pushed by the enumerator
    pub enqueued: AtomicU64,

    /// Keys pulled by workers
    pub dequeued: AtomicU64,
}

impl QueueStats {
    /// Keys enqueued but not yet taken by a worker
    pub fn depth(&self) -> u64 {
        let enqueued = self.enqueued.load(Ordering::Relaxed);
        let dequeued = self.dequeued.load(Ordering::Relaxed);
        enqueued.saturating_sub(dequeued)
    }
}

/// Create the bounded key queue
pub fn key_queue(capacity: usize) -> (KeySender, KeyReceiver) {
    key_queue_with_stats(capacity, Arc::new(QueueStats::default()))
}

/// Create the bounded key queue around caller-owned counters
///
/// Lets the coordinator watch queue depth while the queue itself lives
/// inside the pipeline.
pub fn key_queue_with_stats(
    capacity: usize,
    stats: Arc<QueueStats>,
) -> (KeySender, KeyReceiver) {
    let (sender, receiver) = bounded(capacity);

    (
        KeySender {
            sender,
            stats: Arc::clone(&stats),
        },
        KeyReceiver { receiver, stats },
    )
}

/// Producing end of the key queue (enumerator only)
pub struct KeySender {
    sender: Sender<String>,
    stats: Arc<QueueStats>,
}

impl KeySender {
    /// Blocking send with shutdown awareness
    ///
    /// Returns `true` once the key is enqueued; `false` when shutdown was
    /// flagged while waiting for space, or when every receiver is gone.
    pub fn send(&self, key: String, shutdown: &AtomicBool) -> bool {
        let mut key = key;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return false;
            }
            match self.sender.send_timeout(key, POLL_INTERVAL) {
                Ok(()) => {
                    self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(SendTimeoutError::Timeout(k)) => key = k,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Shared queue counters
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

/// Outcome of a single poll of the key queue
#[derive(Debug)]
pub enum NextKey {
    /// A key is ready
    Key(String),

    /// Nothing arrived within the poll interval; caller should check the
    /// shutdown flag and poll again
    Empty,

    /// The queue is closed and drained
    Closed,
}

/// Consuming end of the key queue (cloned into each worker)
#[derive(Clone)]
pub struct KeyReceiver {
    receiver: Receiver<String>,
    stats: Arc<QueueStats>,
}

impl KeyReceiver {
    /// Poll for the next key
    pub fn next(&self) -> NextKey {
        match self.receiver.recv_timeout(POLL_INTERVAL) {
            Ok(key) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                NextKey::Key(key)
            }
            Err(RecvTimeoutError::Timeout) => NextKey::Empty,
            Err(RecvTimeoutError::Disconnected) => NextKey::Closed,
        }
    }

}

/// Create the zero-capacity record handoff
pub fn record_handoff() -> (RecordSender, RecordReceiver) {
    // capacity 0: every send rendezvouses with a recv
    let (sender, receiver) = bounded(0);
    (RecordSender { sender }, RecordReceiver { receiver })
}

/// Producing end of the record handoff (cloned into each worker)
#[derive(Clone)]
pub struct RecordSender {
    sender: Sender<ObjectRecord>,
}

impl RecordSender {
    /// Hand a record to the serializer, blocking until it is taken
    ///
    /// Ownership of the body stream transfers with the record. Returns
    /// `false` when the serializer is gone.
    pub fn send(&self, record: ObjectRecord) -> bool {
        self.sender.send(record).is_ok()
    }
}

/// Consuming end of the record handoff (serializer only)
pub struct RecordReceiver {
    receiver: Receiver<ObjectRecord>,
}

impl RecordReceiver {
    /// Wait for the next record; `None` once every worker has exited
    pub fn recv(&self) -> Option<ObjectRecord> {
        self.receiver.recv().ok()
    }
}
