//! Object store abstraction
//!
//! The pipeline only ever talks to a bucket through the [`ObjectStore`]
//! trait: one call to list a page of keys, one call to fetch a body. The
//! production implementation is [`S3Store`]; [`MemoryStore`] backs the test
//! suite and supports fault injection.
//!
//! Listing uses an opaque continuation marker. A page holding fewer entries
//! than the requested page size signals the end of the bucket.

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Store, S3StoreConfig};

use std::fmt;
use std::io::Read;

use crate::error::StoreResult;

/// One key returned by a list page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key within the bucket
    pub key: String,

    /// Object size as reported by the listing
    pub size: u64,
}

impl ObjectEntry {
    /// Check if this key is a directory placeholder (trailing separator,
    /// no content). These never become archive entries.
    pub fn is_dir_like(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// One page of a bucket listing
#[derive(Debug, Clone)]
pub struct ListPage {
    /// Entries in listing order
    pub entries: Vec<ObjectEntry>,

    /// Marker to pass to the next list call, if the store provided one
    pub next_marker: Option<String>,

    /// Whether the store reported more entries beyond this page. A full
    /// page with `truncated = false` is a normal end of listing (object
    /// count was an exact multiple of the page size).
    pub truncated: bool,
}

/// A successfully fetched object, ready to be serialized
///
/// Produced exactly once per fetch. The fetching worker owns the body
/// stream until the record is handed to the serializer; after that the
/// serializer copies exactly `len` bytes and drops the stream.
pub struct ObjectRecord {
    /// Object key (becomes the archive entry name)
    pub key: String,

    /// Byte length declared by the store at fetch time
    pub len: u64,

    /// Open body stream
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRecord")
            .field("key", &self.key)
            .field("len", &self.len)
            .finish()
    }
}

/// Blocking client interface to a remote object store
///
/// Implementations must be shareable across worker threads; workers issue
/// concurrent `fetch` calls against a single instance.
pub trait ObjectStore: Send + Sync {
    /// Request one page of keys, resuming from `marker`
    fn list_page(&self, marker: Option<&str>, page_size: usize) -> StoreResult<ListPage>;

    /// Fetch an object's declared length and body stream
    fn fetch(&self, key: &str) -> StoreResult<ObjectRecord>;
}
