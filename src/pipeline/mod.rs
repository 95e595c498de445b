//! Concurrent archiving pipeline
//!
//! Three stages connected by two channels:
//!
//! ```text
//!                      bounded key queue          zero-capacity handoff
//! +------------+      +-----------------+      +-------------+      +------------+
//! | enumerator | ---> |  object keys    | ---> | fetch pool  | ---> | serializer |
//! |  (1 thread)|      |  (backpressure) |      | (N threads) |      | (1 thread) |
//! +------------+      +-----------------+      +-------------+      +------------+
//! ```
//!
//! The key queue bounds how far listing can run ahead of fetching; the
//! record handoff forces each fetched object to rendezvous with the
//! serializer, so at most one object body per worker is in flight.
//!
//! Entries land in the archive in fetch completion order. The set of
//! entries is deterministic for a given bucket; their order is not.

pub mod coordinator;
pub mod enumerator;
pub mod queue;
pub mod serializer;
pub mod worker;

pub use coordinator::{ArchiveCoordinator, ArchiveProgress, ArchiveStats};
pub use enumerator::KeyEnumerator;
pub use queue::{key_queue, record_handoff, KeyReceiver, KeySender, NextKey, QueueStats};
pub use serializer::{ArchiveSerializer, SerializerReport};
pub use worker::{aggregate_stats, FetchWorker, RetryPolicy, WorkerStats};
