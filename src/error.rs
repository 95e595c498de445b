//! Error types for bucket-tar
//!
//! This module defines the error hierarchy for the archiving pipeline:
//! - Object store errors (listing and fetching), with a transient/fatal split
//! - Archive serialization errors (header, body, finalization)
//! - Worker errors (retry exhaustion, panics)
//! - Configuration and CLI errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the key or bucket involved
//! - A fetch attempt is classified exactly once: transient failures are
//!   retried by the owning worker, everything else aborts the run

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the bucket-tar application
#[derive(Error, Debug)]
pub enum ArchiverError {
    /// Object store errors (listing, fetching)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Archive serialization errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Worker errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (file operations, thread spawning)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A list request failed
    #[error("Failed to list bucket '{bucket}': {reason}")]
    ListFailed { bucket: String, reason: String },

    /// A fetch request failed before any body was received
    #[error("Failed to fetch '{key}': {reason}")]
    FetchFailed { key: String, reason: String },

    /// The store answered with an unexpected status code
    #[error("Unexpected status {code} fetching '{key}'")]
    BadStatus { key: String, code: u16 },

    /// The body stream terminated before the declared length was received
    #[error("Truncated body for '{key}': expected {expected} bytes, got {actual}")]
    TruncatedBody {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Credential resolution failed
    #[error("Failed to resolve credentials: {0}")]
    Credentials(String),

    /// The bucket handle could not be constructed
    #[error("Invalid bucket '{bucket}': {reason}")]
    Bucket { bucket: String, reason: String },
}

impl StoreError {
    /// Check if this error is transient (worth retrying the fetch)
    ///
    /// Only an unexpectedly terminated body stream qualifies; every other
    /// failure aborts the run.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TruncatedBody { .. })
    }
}

/// Archive serialization errors
///
/// All of these are fatal: once a header or body write fails, the byte
/// stream is no longer a valid archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Writing an entry (header or body) failed
    #[error("Failed to write archive entry '{name}': {source}")]
    Entry {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The body supplied fewer bytes than the entry header declared
    #[error("Short body for entry '{name}': header declares {expected} bytes, copied {actual}")]
    ShortBody {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Writing the trailer or flushing the compressor failed
    #[error("Failed to finalize archive: {0}")]
    Finalize(#[source] io::Error),
}

/// Worker errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A transient failure persisted through every allowed attempt
    #[error("Giving up on '{key}' after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// A non-transient fetch failure
    #[error("Fetch of '{key}' failed: {source}")]
    Fetch {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid key queue capacity
    #[error("Invalid queue capacity {capacity}: must be at least {min}")]
    InvalidQueueCapacity { capacity: usize, min: usize },

    /// Invalid listing page size
    #[error("Invalid page size {size}: must be between {min} and {max}")]
    InvalidPageSize { size: usize, min: usize, max: usize },

    /// Invalid retry attempt count
    #[error("Invalid retry count {count}: must be between 1 and {max}")]
    InvalidRetryCount { count: u32, max: u32 },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Result type alias for ArchiverError
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;
