//! Checksum calculation for export artifacts
//!
//! Every data file gets a SHA-256 checksum recorded in the manifest so a
//! consumer can verify integrity after download. CSV files are hashed while
//! being written via [`HashingWriter`]; single-file formats are hashed by
//! streaming the finished file.

use crate::domain::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Calculate SHA-256 checksum of raw bytes
///
/// # Returns
///
/// Returns a hex-encoded SHA-256 checksum string (64 characters).
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{result:x}")
}

/// Calculate SHA-256 checksum of a file by streaming its contents
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn checksum_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let result = hasher.finalize();
    Ok(format!("{result:x}"))
}

/// Writer adapter that hashes everything passing through it
///
/// Wraps an inner writer, updating a SHA-256 digest and a byte counter on
/// every write, so the checksum of a streamed file is known without a
/// second read.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wraps the given writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }

    /// Consumes self, returning the inner writer, the hex checksum, and the
    /// total bytes written
    pub fn finalize(self) -> (W, String, u64) {
        let result = self.hasher.finalize();
        (self.inner, format!("{result:x}"), self.bytes_written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
