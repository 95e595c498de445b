//! In-memory object store
//!
//! Backs the test suite and local experiments. Keys enumerate in sorted
//! order; the continuation marker is the last key of the previous page.
//!
//! Fault injection: [`MemoryStore::fail_once`] makes the next fetch of a
//! key report a truncated body (the transient classification), and
//! [`MemoryStore::fail_always`] makes every fetch of a key fail that way,
//! which exercises the retry-exhaustion path.

use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::ops::Bound;
use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::store::{ListPage, ObjectEntry, ObjectRecord, ObjectStore};

/// Object store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: BTreeMap<String, Vec<u8>>,
    fail_once: Mutex<HashSet<String>>,
    fail_always: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object; a key with a trailing `/` acts as a directory
    /// placeholder
    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.objects.insert(key.into(), body.into());
    }

    /// Make the next fetch of `key` fail with a truncated body
    pub fn fail_once(&self, key: impl Into<String>) {
        self.fail_once
            .lock()
            .expect("fail_once lock poisoned")
            .insert(key.into());
    }

    /// Make every fetch of `key` fail with a truncated body
    pub fn fail_always(&self, key: impl Into<String>) {
        self.fail_always
            .lock()
            .expect("fail_always lock poisoned")
            .insert(key.into());
    }

    /// Number of stored objects, placeholders included
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn truncated(&self, key: &str) -> StoreError {
        let len = self.objects.get(key).map(|b| b.len() as u64).unwrap_or(1);
        StoreError::TruncatedBody {
            key: key.to_string(),
            expected: len,
            actual: len.saturating_sub(1),
        }
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(&self, marker: Option<&str>, page_size: usize) -> StoreResult<ListPage> {
        let lower = match marker {
            Some(m) => Bound::Excluded(m.to_string()),
            None => Bound::Unbounded,
        };

        let entries: Vec<ObjectEntry> = self
            .objects
            .range((lower, Bound::Unbounded))
            .take(page_size)
            .map(|(key, body)| ObjectEntry {
                key: key.clone(),
                size: body.len() as u64,
            })
            .collect();

        // Mirror real list APIs: a marker only when entries remain past
        // this page, so a full final page comes back untruncated
        let truncated = match entries.last() {
            Some(last) => self
                .objects
                .range((Bound::Excluded(last.key.clone()), Bound::Unbounded))
                .next()
                .is_some(),
            None => false,
        };
        let next_marker = if truncated {
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_marker,
            truncated,
        })
    }

    fn fetch(&self, key: &str) -> StoreResult<ObjectRecord> {
        if self
            .fail_always
            .lock()
            .expect("fail_always lock poisoned")
            .contains(key)
        {
            return Err(self.truncated(key));
        }

        if self
            .fail_once
            .lock()
            .expect("fail_once lock poisoned")
            .remove(key)
        {
            return Err(self.truncated(key));
        }

        let body = self
            .objects
            .get(key)
            .ok_or_else(|| StoreError::BadStatus {
                key: key.to_string(),
                code: 404,
            })?
            .clone();

        Ok(ObjectRecord {
            key: key.to_string(),
            len: body.len() as u64,
            body: Box::new(Cursor::new(body)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn store_with_keys(count: usize) -> MemoryStore {
        let mut store = MemoryStore::new();
        for i in 0..count {
            store.insert(format!("key-{:04}", i), format!("body-{}", i));
        }
        store
    }

    #[test]
    fn test_pagination_across_boundary() {
        let store = store_with_keys(7);

        let first = store.list_page(None, 3).unwrap();
        assert_eq!(first.entries.len(), 3);
        let marker = first.next_marker.clone().unwrap();
        assert_eq!(marker, "key-0002");

        let second = store.list_page(Some(&marker), 3).unwrap();
        assert_eq!(second.entries[0].key, "key-0003");

        let marker = second.next_marker.unwrap();
        let last = store.list_page(Some(&marker), 3).unwrap();
        assert_eq!(last.entries.len(), 1);
        assert!(last.next_marker.is_none());
    }

    #[test]
    fn test_exact_multiple_ends_untruncated() {
        // 6 keys and page size 3: the final page is full but reports no
        // further entries and carries no marker
        let store = store_with_keys(6);

        let first = store.list_page(None, 3).unwrap();
        assert!(first.truncated);
        let second = store
            .list_page(first.next_marker.as_deref(), 3)
            .unwrap();
        assert_eq!(second.entries.len(), 3);
        assert!(!second.truncated);
        assert!(second.next_marker.is_none());
    }

    #[test]
    fn test_fetch_returns_body() {
        let mut store = MemoryStore::new();
        store.insert("a.txt", "hello");

        let record = store.fetch("a.txt").unwrap();
        assert_eq!(record.len, 5);

        let mut body = Vec::new();
        let mut stream = record.body;
        stream.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_fetch_missing_key() {
        let store = MemoryStore::new();
        let err = store.fetch("nope").unwrap_err();
        assert!(matches!(err, StoreError::BadStatus { code: 404, .. }));
    }

    #[test]
    fn test_fail_once_then_succeed() {
        let mut store = MemoryStore::new();
        store.insert("flaky", "data");
        store.fail_once("flaky");

        let first = store.fetch("flaky").unwrap_err();
        assert!(first.is_transient());

        assert!(store.fetch("flaky").is_ok());
    }

    #[test]
    fn test_fail_always() {
        let mut store = MemoryStore::new();
        store.insert("doomed", "data");
        store.fail_always("doomed");

        assert!(store.fetch("doomed").is_err());
        assert!(store.fetch("doomed").is_err());
    }
}
