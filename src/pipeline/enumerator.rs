//! Key enumeration stage
//!
//! A single thread walks the bucket listing page by page and feeds object
//! keys into the bounded key queue. Keys with a trailing slash are
//! console-created folder placeholders, not objects, and are skipped.
//!
//! Enumeration ends at the first short page, or at a full page the store
//! reports as untruncated (the object count was an exact multiple of the
//! page size). A page claiming truncation but carrying no continuation
//! marker would loop forever on re-listing, so it ends enumeration too,
//! with a warning.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, trace, warn};

use crate::error::StoreError;
use crate::pipeline::queue::KeySender;
use crate::store::ObjectStore;

/// Bucket listing thread feeding the key queue
pub struct KeyEnumerator {
    handle: Option<JoinHandle<Result<u64, StoreError>>>,
}

impl KeyEnumerator {
    /// Spawn the enumeration thread
    ///
    /// The thread owns the sole [`KeySender`]; dropping it on exit closes
    /// the queue, which is how workers learn that no more keys are coming.
    /// On a listing error the thread sets the shutdown flag so the rest of
    /// the pipeline unwinds instead of waiting on an open queue.
    pub fn spawn(
        store: Arc<dyn ObjectStore>,
        page_size: usize,
        keys: KeySender,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("enumerator".to_string())
            .spawn(move || {
                let result = enumerate(store.as_ref(), page_size, &keys, &shutdown);
                if let Err(ref e) = result {
                    error!(error = %e, "enumeration failed, shutting down pipeline");
                    shutdown.store(true, Ordering::SeqCst);
                }
                result
            })?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for enumeration to finish and return the number of keys queued
    pub fn join(&mut self) -> Result<u64, StoreError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(StoreError::ListFailed {
                    bucket: "<unknown>".to_string(),
                    reason: "enumerator thread panicked".to_string(),
                }),
            },
            None => Ok(0),
        }
    }
}

fn enumerate(
    store: &dyn ObjectStore,
    page_size: usize,
    keys: &KeySender,
    shutdown: &AtomicBool,
) -> Result<u64, StoreError> {
    let mut marker: Option<String> = None;
    let mut queued: u64 = 0;
    let mut pages: u64 = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!(queued, "enumeration interrupted");
            return Ok(queued);
        }

        let page = store.list_page(marker.as_deref(), page_size)?;
        pages += 1;
        let received = page.entries.len();

        for entry in page.entries {
            if entry.is_dir_like() {
                trace!(key = %entry.key, "skipping folder placeholder");
                continue;
            }
            if !keys.send(entry.key, shutdown) {
                debug!(queued, "key queue closed, stopping enumeration");
                return Ok(queued);
            }
            queued += 1;
        }

        // A short page or an untruncated full page ends the listing
        if received < page_size || !page.truncated {
            break;
        }

        match page.next_marker {
            Some(next) => marker = Some(next),
            None => {
                warn!(pages, "truncated page without continuation marker, stopping");
                break;
            }
        }
    }

    info!(queued, pages, "enumeration complete");
    Ok(queued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::{key_queue, NextKey};
    use crate::store::MemoryStore;

    fn drain(rx: &crate::pipeline::queue::KeyReceiver) -> Vec<String> {
        let mut keys = Vec::new();
        loop {
            match rx.next() {
                NextKey::Key(k) => keys.push(k),
                NextKey::Empty => continue,
                NextKey::Closed => break,
            }
        }
        keys
    }

    #[test]
    fn test_enumerates_all_keys_across_pages() {
        let mut store = MemoryStore::new();
        for i in 0..7 {
            store.insert(format!("obj-{}", i), "x");
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = key_queue(100);
        let mut enumerator =
            KeyEnumerator::spawn(Arc::new(store), 3, tx, Arc::clone(&shutdown)).unwrap();

        let keys = drain(&rx);
        assert_eq!(enumerator.join().unwrap(), 7);
        assert_eq!(keys.len(), 7);
        assert!(keys.contains(&"obj-0".to_string()));
        assert!(keys.contains(&"obj-6".to_string()));
    }

    #[test]
    fn test_skips_folder_placeholders() {
        let mut store = MemoryStore::new();
        store.insert("docs/", "");
        store.insert("docs/readme.md", "hi");
        store.insert("logs/", "");

        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = key_queue(100);
        let mut enumerator =
            KeyEnumerator::spawn(Arc::new(store), 500, tx, Arc::clone(&shutdown)).unwrap();

        let keys = drain(&rx);
        assert_eq!(enumerator.join().unwrap(), 1);
        assert_eq!(keys, vec!["docs/readme.md".to_string()]);
    }

    #[test]
    fn test_exact_page_multiple_completes_cleanly() {
        // 6 keys with page size 3: the final page is full but untruncated,
        // and enumeration must stop there instead of re-listing
        let mut store = MemoryStore::new();
        for i in 0..6 {
            store.insert(format!("even-{}", i), "x");
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = key_queue(100);
        let mut enumerator =
            KeyEnumerator::spawn(Arc::new(store), 3, tx, Arc::clone(&shutdown)).unwrap();

        let keys = drain(&rx);
        assert_eq!(enumerator.join().unwrap(), 6);
        assert_eq!(keys.len(), 6);
        assert!(!shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn test_empty_bucket() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = key_queue(100);
        let mut enumerator =
            KeyEnumerator::spawn(Arc::new(MemoryStore::new()), 500, tx, shutdown).unwrap();

        assert!(drain(&rx).is_empty());
        assert_eq!(enumerator.join().unwrap(), 0);
    }

    #[test]
    fn test_shutdown_stops_enumeration() {
        let mut store = MemoryStore::new();
        for i in 0..50 {
            store.insert(format!("k-{:02}", i), "x");
        }

        let shutdown = Arc::new(AtomicBool::new(true));
        let (tx, rx) = key_queue(1);
        let mut enumerator =
            KeyEnumerator::spawn(Arc::new(store), 10, tx, Arc::clone(&shutdown)).unwrap();

        // The flag was set before the first page, so nothing is queued
        let queued = enumerator.join().unwrap();
        assert_eq!(queued, 0);
        assert!(drain(&rx).is_empty());
    }
}
