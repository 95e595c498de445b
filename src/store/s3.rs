//! S3-compatible object store client
//!
//! Built on the blocking transport of the `rust-s3` crate. Works against
//! AWS S3 as well as S3-compatible services (MinIO, LocalStack) via a
//! custom endpoint, which switches the client to path-style addressing.
//!
//! Credentials come from an explicit key pair when configured, otherwise
//! from the standard environment chain (env vars, profile, instance role).
//!
//! Fetch streams the body in fixed-size ranged requests, so memory per
//! in-flight object is bounded by the chunk size, not the object size.
//! A chunk coming back short of its requested range is reported as
//! [`StoreError::TruncatedBody`], the one transient error the workers
//! retry.

use std::io::{self, Cursor, Read};

use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::store::{ListPage, ObjectEntry, ObjectRecord, ObjectStore};

/// Bytes requested per ranged GET while streaming a body
const FETCH_CHUNK: u64 = 8 * 1024 * 1024;

/// Connection settings for an S3-compatible store
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    /// Bucket name
    pub bucket: String,

    /// Region name (ignored for routing when `endpoint` is set, but still
    /// used for request signing)
    pub region: String,

    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,

    /// Explicit access key; falls back to the environment chain when unset
    pub access_key: Option<String>,

    /// Explicit secret key
    pub secret_key: Option<String>,
}

/// Blocking S3 client bound to a single bucket
pub struct S3Store {
    bucket: Bucket,
    name: String,
}

impl S3Store {
    /// Create a store handle for the configured bucket
    ///
    /// This resolves credentials and builds the request signer; it does not
    /// touch the network, so a bad bucket name only surfaces on first use.
    pub fn new(config: S3StoreConfig) -> StoreResult<Self> {
        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            }
            _ => Credentials::default(),
        }
        .map_err(|e| StoreError::Credentials(e.to_string()))?;

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|_| StoreError::Bucket {
                    bucket: config.bucket.clone(),
                    reason: format!("unknown region '{}'", config.region),
                })?,
        };

        let mut bucket_box =
            Bucket::new(&config.bucket, region, credentials).map_err(|e| StoreError::Bucket {
                bucket: config.bucket.clone(),
                reason: e.to_string(),
            })?;

        // MinIO and friends route by path, not by virtual host
        if config.endpoint.is_some() {
            bucket_box = bucket_box.with_path_style();
        }

        let bucket: Bucket = *bucket_box;

        debug!(bucket = %config.bucket, region = %config.region, "S3 store initialized");

        Ok(Self {
            bucket,
            name: config.bucket,
        })
    }

    /// Bucket name this store is bound to
    pub fn bucket_name(&self) -> &str {
        &self.name
    }
}

impl ObjectStore for S3Store {
    fn list_page(&self, marker: Option<&str>, page_size: usize) -> StoreResult<ListPage> {
        let (result, code) = self
            .bucket
            .list_page(
                String::new(),
                None,
                marker.map(str::to_string),
                None,
                Some(page_size),
            )
            .map_err(|e| StoreError::ListFailed {
                bucket: self.name.clone(),
                reason: e.to_string(),
            })?;

        if code != 200 {
            return Err(StoreError::ListFailed {
                bucket: self.name.clone(),
                reason: format!("unexpected status {}", code),
            });
        }

        let entries: Vec<ObjectEntry> = result
            .contents
            .into_iter()
            .map(|object| ObjectEntry {
                key: object.key,
                size: object.size,
            })
            .collect();

        trace!(
            bucket = %self.name,
            count = entries.len(),
            truncated = result.is_truncated,
            "listed page"
        );

        Ok(ListPage {
            entries,
            next_marker: result.next_continuation_token,
            truncated: result.is_truncated,
        })
    }

    fn fetch(&self, key: &str) -> StoreResult<ObjectRecord> {
        let (head, code) = self
            .bucket
            .head_object(key)
            .map_err(|e| StoreError::FetchFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if code != 200 {
            return Err(StoreError::BadStatus {
                key: key.to_string(),
                code,
            });
        }

        let len = head.content_length.unwrap_or(0).max(0) as u64;
        if len == 0 {
            return Ok(ObjectRecord {
                key: key.to_string(),
                len: 0,
                body: Box::new(io::empty()),
            });
        }

        // The first chunk is fetched eagerly so a truncated response is
        // still classified transient here, before the record is handed off.
        let mut body = RangedBody::new(self.bucket.clone(), key.to_string(), len);
        body.fill()?;

        Ok(ObjectRecord {
            key: key.to_string(),
            len,
            body: Box::new(body),
        })
    }
}

/// Streams an object body as a sequence of ranged GETs
///
/// Holds at most one chunk in memory. Chunk failures after the first
/// surface as I/O errors from `read`, at which point the archive is
/// already committed to the entry and the run aborts.
struct RangedBody {
    bucket: Bucket,
    key: String,
    len: u64,
    fetched: u64,
    chunk: Cursor<Vec<u8>>,
}

impl RangedBody {
    fn new(bucket: Bucket, key: String, len: u64) -> Self {
        Self {
            bucket,
            key,
            len,
            fetched: 0,
            chunk: Cursor::new(Vec::new()),
        }
    }

    /// Fetch the next chunk, replacing the exhausted one
    fn fill(&mut self) -> StoreResult<()> {
        let (start, end) = chunk_bounds(self.fetched, self.len, FETCH_CHUNK);
        let response = self
            .bucket
            .get_object_range(&self.key, start, Some(end))
            .map_err(|e| StoreError::FetchFailed {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;

        let code = response.status_code();
        if code != 206 && code != 200 {
            return Err(StoreError::BadStatus {
                key: self.key.clone(),
                code,
            });
        }

        let bytes = response.bytes().to_vec();
        if bytes.len() as u64 != end - start + 1 {
            return Err(StoreError::TruncatedBody {
                key: self.key.clone(),
                expected: self.len,
                actual: start + bytes.len() as u64,
            });
        }

        self.fetched += bytes.len() as u64;
        self.chunk = Cursor::new(bytes);
        Ok(())
    }
}

impl Read for RangedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.chunk.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            if self.fetched >= self.len {
                return Ok(0);
            }
            self.fill()
                .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))?;
        }
    }
}

/// Inclusive byte range of the next chunk starting at `fetched`
fn chunk_bounds(fetched: u64, len: u64, chunk: u64) -> (u64, u64) {
    let end = (fetched + chunk).min(len) - 1;
    (fetched, end)
}
