//! Archive output
//!
//! Produces the POSIX tar byte stream, optionally wrapped in a single gzip
//! stream. Only the serializer stage touches this module at runtime; the
//! format forbids interleaved writers.

pub mod writer;

pub use writer::ArchiveWriter;
