//! bucket-tar - Streaming S3 Bucket Archiver
//!
//! Streams every object in an S3-compatible bucket into a single tar
//! archive (optionally gzip-compressed) written to a file or stdout. The
//! archive streams as objects arrive; the whole bucket never sits in
//! memory or on local disk.
//!
//! # Features
//!
//! - **Concurrent Fetching**: A pool of worker threads fetches objects in
//!   parallel while a single writer keeps the archive bytes sequential.
//!
//! - **Bounded Memory**: A capped key queue plus a rendezvous handoff to
//!   the writer keep memory proportional to the worker count, not the
//!   bucket size.
//!
//! - **Transient-Failure Retry**: Truncated downloads are retried a
//!   bounded number of times with backoff; anything else stops the run
//!   with a real error instead of a corrupt archive.
//!
//! - **S3-Compatible**: Works against AWS S3, MinIO, and LocalStack via a
//!   custom endpoint with path-style addressing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      S3-Compatible Bucket                        │
//! └───────────┬─────────────────────────────────┬───────────────────┘
//!             │ ListObjects (paged)             │ GetObject
//!             ▼                                 │
//! ┌───────────────────────┐                     │
//! │      Enumerator       │                     │
//! │  (1 thread, paging)   │                     │
//! └───────────┬───────────┘                     │
//!             ▼                                 │
//! ┌───────────────────────┐         ┌───────────┴───────────┐
//! │      Key Queue        │         │     Fetch Workers     │
//! │  (crossbeam bounded)  │────────▶│  ┌────┐ ┌────┐ ┌────┐ │
//! │  - Backpressure       │         │  │ W1 │ │ W2 │ │ WN │ │
//! └───────────────────────┘         │  └──┬─┘ └──┬─┘ └──┬─┘ │
//!                                   └─────┼──────┼──────┼───┘
//!                                         ▼      ▼      ▼
//!                                   ┌───────────────────────┐
//!                                   │    Record Handoff     │
//!                                   │  (zero-capacity)      │
//!                                   └───────────┬───────────┘
//!                                               ▼
//!                                   ┌───────────────────────┐
//!                                   │      Serializer       │
//!                                   │  tar (+ gzip) writer  │
//!                                   └───────────┬───────────┘
//!                                               ▼
//!                                      file or stdout
//! ```
//!
//! # Example
//!
//! ```bash
//! # Archive a bucket to a file
//! bucket-tar my-bucket -o backup.tar
//!
//! # Compressed, with more workers
//! bucket-tar my-bucket -z -w 32 -o backup.tar.gz
//!
//! # Stream through a pipe
//! bucket-tar my-bucket -z | ssh backup-host 'cat > bucket.tar.gz'
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod store;

pub use config::{ArchiveConfig, CliArgs};
pub use error::{ArchiverError, Result};
pub use pipeline::{ArchiveCoordinator, ArchiveProgress, ArchiveStats};
pub use store::{MemoryStore, ObjectStore, S3Store, S3StoreConfig};
