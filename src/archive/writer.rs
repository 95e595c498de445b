//! Tar writer with optional gzip compression
//!
//! One entry per fetched object: GNU header (name = key, mode 0644, exact
//! declared size, uid/gid 0), then the body bytes, padded to the 512-byte
//! block boundary by the tar builder. Finalization writes the standard
//! end-of-archive marker and, when compressing, finishes the gzip stream
//! before the underlying sink is flushed.
//!
//! All three header timestamps carry a single value captured when the
//! writer is created. Zero timestamps make tar readers emit warnings for
//! every entry, so a real time is used unless the caller overrides it.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};

use crate::error::ArchiveError;

/// File mode for archive entries
const ENTRY_MODE: u32 = 0o644;

/// Sink that is either the raw output or a gzip stream around it
enum CompressSink<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Write for CompressSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressSink::Plain(w) => w.write(buf),
            CompressSink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressSink::Plain(w) => w.flush(),
            CompressSink::Gzip(w) => w.flush(),
        }
    }
}

impl<W: Write> CompressSink<W> {
    /// Finish the compressor (if any) and hand back the raw sink
    fn finish(self) -> io::Result<W> {
        match self {
            CompressSink::Plain(w) => Ok(w),
            CompressSink::Gzip(w) => w.finish(),
        }
    }
}

/// Reader wrapper that counts the bytes pulled through it
struct CountingReader<R> {
    inner: R,
    read: u64,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, read: 0 }
    }

    fn bytes_read(&self) -> u64 {
        self.read
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        Ok(n)
    }
}

/// Sequential tar writer over an arbitrary byte sink
pub struct ArchiveWriter<W: Write> {
    builder: Builder<CompressSink<W>>,
    mtime: u64,
    entries: u64,
    bytes: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer, optionally wrapping the sink in a gzip stream
    ///
    /// `timestamp` overrides the entry timestamp (seconds since the epoch);
    /// when `None`, the current time is captured once and reused for every
    /// entry.
    pub fn new(sink: W, compress: bool, timestamp: Option<u64>) -> Self {
        let inner = if compress {
            CompressSink::Gzip(GzEncoder::new(sink, Compression::default()))
        } else {
            CompressSink::Plain(sink)
        };

        Self {
            builder: Builder::new(inner),
            mtime: timestamp.unwrap_or_else(unix_now),
            entries: 0,
            bytes: 0,
        }
    }

    /// Append one entry: header, then exactly `len` body bytes
    ///
    /// The body stream is consumed up to `len` bytes and must supply all of
    /// them; a short stream is an error because the header has already
    /// declared the size.
    pub fn append(&mut self, key: &str, len: u64, body: impl Read) -> Result<(), ArchiveError> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(ENTRY_MODE);
        header.set_size(len);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(self.mtime);
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.set_atime(self.mtime);
            gnu.set_ctime(self.mtime);
        }

        let mut counted = CountingReader::new(body.take(len));
        self.builder
            .append_data(&mut header, Path::new(key), &mut counted)
            .map_err(|source| ArchiveError::Entry {
                name: key.to_string(),
                source,
            })?;

        if counted.bytes_read() != len {
            return Err(ArchiveError::ShortBody {
                name: key.to_string(),
                expected: len,
                actual: counted.bytes_read(),
            });
        }

        self.entries += 1;
        self.bytes += len;
        Ok(())
    }

    /// Entries written so far
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Body bytes written so far (before padding and compression)
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Timestamp applied to every entry
    pub fn timestamp(&self) -> u64 {
        self.mtime
    }

    /// Write the end-of-archive marker, finish the compressor, and flush
    ///
    /// Returns the raw sink so callers can keep using it.
    pub fn finish(self) -> Result<W, ArchiveError> {
        let sink = self
            .builder
            .into_inner()
            .map_err(ArchiveError::Finalize)?;
        let mut sink = sink.finish().map_err(ArchiveError::Finalize)?;
        sink.flush().map_err(ArchiveError::Finalize)?;
        Ok(sink)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
