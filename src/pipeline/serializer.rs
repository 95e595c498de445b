//! Archive serialization stage
//!
//! The single consumer of the record handoff. One thread owns the sink and
//! writes entries in the order records arrive, which is fetch completion
//! order, not listing order. The archive is finalized when every worker has
//! exited and the handoff closes.
//!
//! A write failure poisons the byte stream, so the serializer sets the
//! shutdown flag and then drains the handoff. Draining matters: workers
//! blocked mid-rendezvous would otherwise never observe the flag.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use crate::archive::ArchiveWriter;
use crate::error::ArchiveError;
use crate::pipeline::queue::RecordReceiver;

/// Totals reported by a finished serializer
#[derive(Debug, Clone, Copy)]
pub struct SerializerReport {
    /// Entries written to the archive
    pub entries: u64,

    /// Body bytes written, before padding and compression
    pub bytes: u64,
}

/// Archive serialization thread
pub struct ArchiveSerializer {
    handle: Option<JoinHandle<Result<SerializerReport, ArchiveError>>>,
}

impl ArchiveSerializer {
    /// Spawn the serialization thread over `sink`
    ///
    /// `entries_count` and `bytes_count` are bumped per entry so the
    /// coordinator can report progress without touching the writer.
    pub fn spawn<W: Write + Send + 'static>(
        sink: W,
        compress: bool,
        timestamp: Option<u64>,
        records: RecordReceiver,
        shutdown: Arc<AtomicBool>,
        entries_count: Arc<AtomicU64>,
        bytes_count: Arc<AtomicU64>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("serializer".to_string())
            .spawn(move || {
                serialize(
                    sink,
                    compress,
                    timestamp,
                    &records,
                    &shutdown,
                    &entries_count,
                    &bytes_count,
                )
            })?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the serializer to finalize the archive
    pub fn join(&mut self) -> Result<SerializerReport, ArchiveError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(ArchiveError::Finalize(io::Error::new(
                    io::ErrorKind::Other,
                    "serializer thread panicked",
                ))),
            },
            None => Ok(SerializerReport {
                entries: 0,
                bytes: 0,
            }),
        }
    }
}

fn serialize<W: Write>(
    sink: W,
    compress: bool,
    timestamp: Option<u64>,
    records: &RecordReceiver,
    shutdown: &AtomicBool,
    entries_count: &AtomicU64,
    bytes_count: &AtomicU64,
) -> Result<SerializerReport, ArchiveError> {
    let mut writer = ArchiveWriter::new(sink, compress, timestamp);
    debug!(timestamp = writer.timestamp(), compress, "serializer started");

    while let Some(record) = records.recv() {
        trace!(key = %record.key, size = record.len, "writing entry");

        if let Err(e) = writer.append(&record.key, record.len, record.body) {
            error!(key = %record.key, error = %e, "archive write failed, shutting down pipeline");
            shutdown.store(true, Ordering::SeqCst);
            // unblock workers parked on the rendezvous
            while records.recv().is_some() {}
            return Err(e);
        }

        entries_count.fetch_add(1, Ordering::Relaxed);
        bytes_count.fetch_add(record.len, Ordering::Relaxed);
    }

    let report = SerializerReport {
        entries: writer.entries(),
        bytes: writer.bytes(),
    };
    writer.finish()?;
    debug!(entries = report.entries, bytes = report.bytes, "archive finalized");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::record_handoff;
    use crate::store::ObjectRecord;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn record(key: &str, body: &[u8]) -> ObjectRecord {
        ObjectRecord {
            key: key.to_string(),
            len: body.len() as u64,
            body: Box::new(Cursor::new(body.to_vec())),
        }
    }

    /// Shared byte sink the test can inspect after the thread exits
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_serializes_records_in_arrival_order() {
        let sink = SharedSink::default();
        let (tx, rx) = record_handoff();
        let shutdown = Arc::new(AtomicBool::new(false));
        let entries = Arc::new(AtomicU64::new(0));
        let bytes = Arc::new(AtomicU64::new(0));

        let mut serializer = ArchiveSerializer::spawn(
            sink.clone(),
            false,
            Some(1_700_000_000),
            rx,
            shutdown,
            Arc::clone(&entries),
            Arc::clone(&bytes),
        )
        .unwrap();

        assert!(tx.send(record("second.txt", b"bb")));
        assert!(tx.send(record("first.txt", b"a")));
        drop(tx);

        let report = serializer.join().unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.bytes, 3);
        assert_eq!(entries.load(Ordering::Relaxed), 2);
        assert_eq!(bytes.load(Ordering::Relaxed), 3);

        let archive_bytes = sink.0.lock().unwrap().clone();
        let mut archive = tar::Archive::new(Cursor::new(archive_bytes));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["second.txt", "first.txt"]);
    }

    #[test]
    fn test_empty_run_emits_valid_trailer() {
        let sink = SharedSink::default();
        let (tx, rx) = record_handoff();

        let mut serializer = ArchiveSerializer::spawn(
            sink.clone(),
            false,
            Some(1),
            rx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicU64::new(0)),
        )
        .unwrap();

        drop(tx);
        let report = serializer.join().unwrap();
        assert_eq!(report.entries, 0);

        let bytes = sink.0.lock().unwrap().clone();
        assert_eq!(bytes.len(), 1024);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_failure_sets_shutdown_and_drains() {
        let sink = SharedSink::default();
        let (tx, rx) = record_handoff();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut serializer = ArchiveSerializer::spawn(
            sink,
            false,
            Some(1),
            rx,
            Arc::clone(&shutdown),
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicU64::new(0)),
        )
        .unwrap();

        // body shorter than the declared length forces a write error
        let bad = ObjectRecord {
            key: "liar.bin".to_string(),
            len: 100,
            body: Box::new(Cursor::new(b"tiny".to_vec())),
        };
        assert!(tx.send(bad));

        // a follow-up record is drained, not written
        let follow_up = tx.send(record("after.txt", b"x"));
        drop(tx);

        let err = serializer.join().unwrap_err();
        assert!(matches!(err, ArchiveError::ShortBody { .. }));
        assert!(shutdown.load(Ordering::SeqCst));
        assert!(follow_up);
    }
}
