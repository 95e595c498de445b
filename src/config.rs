//! Configuration for bucket-tar
//!
//! Command-line parsing (clap derive) plus validation into the runtime
//! [`ArchiveConfig`] the coordinator consumes. Validation fails fast with a
//! [`ConfigError`] naming the offending value and its allowed range.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::RetryPolicy;

/// Maximum number of fetch workers
pub const MAX_WORKERS: usize = 256;

/// Minimum key queue capacity
pub const MIN_QUEUE_CAPACITY: usize = 1;

/// Listing page size bounds (the upper bound is the S3 API maximum)
pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 1000;

/// Maximum fetch attempts per key
pub const MAX_RETRY_COUNT: u32 = 10;

/// Stream a bucket's objects into a tar archive
#[derive(Parser, Debug)]
#[command(name = "bucket-tar", version, about)]
pub struct CliArgs {
    /// Bucket to archive
    pub bucket: String,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compress the archive with gzip
    #[arg(short = 'z', long)]
    pub compress: bool,

    /// Number of parallel fetch workers
    #[arg(short, long, default_value_t = 10)]
    pub workers: usize,

    /// Capacity of the key queue between listing and fetching
    #[arg(long, default_value_t = 1000)]
    pub queue_capacity: usize,

    /// Keys requested per listing page
    #[arg(long, default_value_t = 500)]
    pub page_size: usize,

    /// Fetch attempts per key before giving up
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Pause between fetch retries, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub retry_backoff_ms: u64,

    /// Entry timestamp as seconds since the epoch (defaults to now)
    #[arg(long)]
    pub timestamp: Option<u64>,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Explicit access key (defaults to the environment chain)
    #[arg(long)]
    pub access_key_id: Option<String>,

    /// Explicit secret key
    #[arg(long)]
    pub secret_access_key: Option<String>,

    /// Suppress the progress display
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Bucket to archive
    pub bucket: String,

    /// Output file; `None` streams to stdout
    pub output: Option<PathBuf>,

    /// Wrap the archive in a gzip stream
    pub compress: bool,

    /// Number of fetch workers
    pub worker_count: usize,

    /// Key queue capacity
    pub queue_capacity: usize,

    /// Listing page size
    pub page_size: usize,

    /// Retry settings for transient fetch failures
    pub retry: RetryPolicy,

    /// Fixed entry timestamp; `None` captures the current time once
    pub timestamp: Option<u64>,

    /// Show the interactive progress display
    pub show_progress: bool,

    /// Verbose logging requested
    pub verbose: bool,
}

impl ArchiveConfig {
    /// Validate CLI arguments into a runtime configuration
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidQueueCapacity {
                capacity: args.queue_capacity,
                min: MIN_QUEUE_CAPACITY,
            });
        }

        if args.page_size < MIN_PAGE_SIZE || args.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize {
                size: args.page_size,
                min: MIN_PAGE_SIZE,
                max: MAX_PAGE_SIZE,
            });
        }

        if args.max_retries == 0 || args.max_retries > MAX_RETRY_COUNT {
            return Err(ConfigError::InvalidRetryCount {
                count: args.max_retries,
                max: MAX_RETRY_COUNT,
            });
        }

        if let Some(output) = &args.output {
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(ConfigError::InvalidOutputPath {
                        path: output.clone(),
                        reason: format!("directory '{}' does not exist", parent.display()),
                    });
                }
            }
        }

        // no spinner on stdout output: the archive owns that stream
        let show_progress = !args.quiet && args.output.is_some();

        Ok(Self {
            bucket: args.bucket.clone(),
            output: args.output.clone(),
            compress: args.compress,
            worker_count: args.workers,
            queue_capacity: args.queue_capacity,
            page_size: args.page_size,
            retry: RetryPolicy {
                max_attempts: args.max_retries,
                backoff: Duration::from_millis(args.retry_backoff_ms),
            },
            timestamp: args.timestamp,
            show_progress,
            verbose: args.verbose,
        })
    }
}
