//! Integration tests for bucket-tar
//!
//! Exercises the full pipeline end to end against the in-memory store,
//! writing real archives to temporary files and reading them back.

use bucket_tar::config::ArchiveConfig;
use bucket_tar::pipeline::RetryPolicy;
use bucket_tar::store::MemoryStore;
use bucket_tar::{ArchiveCoordinator, ArchiverError};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn config(workers: usize, compress: bool) -> ArchiveConfig {
    ArchiveConfig {
        bucket: "itest".into(),
        output: None,
        compress,
        worker_count: workers,
        queue_capacity: 16,
        page_size: 4,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        },
        timestamp: Some(1_700_000_000),
        show_progress: false,
        verbose: false,
    }
}

/// Read every entry back out of a tar byte stream
fn read_archive(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(std::io::Cursor::new(bytes.to_vec()));
    let mut entries = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let declared = entry.header().size().unwrap();
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(declared, body.len() as u64, "header size mismatch for {}", name);
        entries.insert(name, body);
    }
    entries
}

#[test]
fn test_archives_bucket_to_file() {
    let mut store = MemoryStore::new();
    for i in 0..13 {
        store.insert(format!("data/obj-{:02}.bin", i), vec![i as u8; 64]);
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("out.tar");
    let sink = File::create(&path).unwrap();

    let stats = ArchiveCoordinator::new(config(4, false))
        .run(Arc::new(store), sink)
        .unwrap();

    assert_eq!(stats.keys_listed, 13);
    assert_eq!(stats.entries_written, 13);
    assert!(stats.completed);

    let mut bytes = Vec::new();
    File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
    let entries = read_archive(&bytes);
    assert_eq!(entries.len(), 13);
    assert_eq!(entries["data/obj-00.bin"], vec![0u8; 64]);
    assert_eq!(entries["data/obj-12.bin"], vec![12u8; 64]);
}

#[test]
fn test_folder_placeholders_and_empty_objects() {
    let mut store = MemoryStore::new();
    store.insert("a.txt", "hello");
    store.insert("dir/", "");
    store.insert("b.bin", "");

    let dir = tempdir().unwrap();
    let path = dir.path().join("out.tar");

    let stats = ArchiveCoordinator::new(config(2, false))
        .run(Arc::new(store), File::create(&path).unwrap())
        .unwrap();
    assert_eq!(stats.entries_written, 2);

    let mut bytes = Vec::new();
    File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
    let entries = read_archive(&bytes);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries["a.txt"], b"hello");
    assert!(entries["b.bin"].is_empty());
    assert!(entries.keys().all(|k| !k.ends_with('/')));
}

#[test]
fn test_compressed_archive_round_trips() {
    let mut store = MemoryStore::new();
    store.insert("logs/app.log", "line one\nline two\n");
    store.insert("logs/err.log", "nothing to report");

    let dir = tempdir().unwrap();
    let path = dir.path().join("out.tar.gz");

    ArchiveCoordinator::new(config(2, true))
        .run(Arc::new(store), File::create(&path).unwrap())
        .unwrap();

    let mut compressed = Vec::new();
    File::open(&path)
        .unwrap()
        .read_to_end(&mut compressed)
        .unwrap();
    assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

    let mut raw = Vec::new();
    GzDecoder::new(std::io::Cursor::new(compressed))
        .read_to_end(&mut raw)
        .unwrap();

    let entries = read_archive(&raw);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["logs/app.log"], b"line one\nline two\n");
}

#[test]
fn test_transient_failures_recover_with_retries() {
    let mut store = MemoryStore::new();
    for i in 0..6 {
        store.insert(format!("k-{}", i), format!("v-{}", i));
    }
    store.fail_once("k-2");
    store.fail_once("k-5");

    let dir = tempdir().unwrap();
    let path = dir.path().join("out.tar");

    let stats = ArchiveCoordinator::new(config(3, false))
        .run(Arc::new(store), File::create(&path).unwrap())
        .unwrap();

    assert_eq!(stats.entries_written, 6);
    assert_eq!(stats.retries, 2);
    assert!(stats.completed);

    let mut bytes = Vec::new();
    File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
    assert_eq!(read_archive(&bytes)["k-2"], b"v-2");
}

#[test]
fn test_persistent_failure_aborts_the_run() {
    let mut store = MemoryStore::new();
    store.insert("good", "ok");
    store.insert("bad", "never arrives");
    store.fail_always("bad");

    let dir = tempdir().unwrap();
    let path = dir.path().join("out.tar");

    let result = ArchiveCoordinator::new(config(2, false))
        .run(Arc::new(store), File::create(&path).unwrap());

    match result {
        Err(ArchiverError::Worker(e)) => {
            assert!(e.to_string().contains("bad"));
        }
        other => panic!("expected worker error, got {:?}", other.map(|s| s.entries_written)),
    }
}

#[test]
fn test_worker_count_yields_identical_entry_sets() {
    let build_store = || {
        let mut store = MemoryStore::new();
        for i in 0..30 {
            store.insert(format!("obj/{:03}", i), format!("payload-{}", i));
        }
        store
    };

    let dir = tempdir().unwrap();
    let solo = dir.path().join("solo.tar");
    let pool = dir.path().join("pool.tar");

    ArchiveCoordinator::new(config(1, false))
        .run(Arc::new(build_store()), File::create(&solo).unwrap())
        .unwrap();
    ArchiveCoordinator::new(config(10, false))
        .run(Arc::new(build_store()), File::create(&pool).unwrap())
        .unwrap();

    let mut solo_bytes = Vec::new();
    File::open(&solo).unwrap().read_to_end(&mut solo_bytes).unwrap();
    let mut pool_bytes = Vec::new();
    File::open(&pool).unwrap().read_to_end(&mut pool_bytes).unwrap();

    // entry order may differ; the entry sets must not
    assert_eq!(read_archive(&solo_bytes), read_archive(&pool_bytes));
}

#[test]
fn test_empty_bucket_produces_valid_empty_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.tar");

    let stats = ArchiveCoordinator::new(config(2, false))
        .run(Arc::new(MemoryStore::new()), File::create(&path).unwrap())
        .unwrap();
    assert_eq!(stats.entries_written, 0);

    let mut bytes = Vec::new();
    File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes.len(), 1024);
    assert!(read_archive(&bytes).is_empty());
}

#[test]
fn test_every_entry_carries_the_configured_timestamp() {
    let mut store = MemoryStore::new();
    store.insert("x", "1");
    store.insert("y", "2");

    let dir = tempdir().unwrap();
    let path = dir.path().join("stamped.tar");

    ArchiveCoordinator::new(config(2, false))
        .run(Arc::new(store), File::create(&path).unwrap())
        .unwrap();

    let mut archive = tar::Archive::new(File::open(&path).unwrap());
    for entry in archive.entries().unwrap() {
        let entry = entry.unwrap();
        assert_eq!(entry.header().mtime().unwrap(), 1_700_000_000);
        assert_eq!(entry.header().mode().unwrap(), 0o644);
    }
}
