//! Atomic file finalization
//!
//! Output files are written to a temporary path in the destination
//! directory, flushed and synced to durable storage, then renamed into
//! place. A crash at any point leaves either the complete final file or an
//! unreferenced temp file that is cleaned up on drop; observers never see a
//! partial file under its final name.

use crate::domain::{CaravanError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Prefix for in-flight temp files, so stale ones are recognizable
const TEMP_PREFIX: &str = ".caravan-tmp-";

/// A file being written under the temp-then-rename discipline
///
/// Dropping without [`commit`](AtomicFile::commit) removes the temp file.
pub struct AtomicFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl AtomicFile {
    /// Opens a temp file in `dir` destined to become `dir/file_name`
    ///
    /// The temp file lives in the destination directory so the final rename
    /// never crosses a filesystem boundary.
    pub fn create(dir: &Path, file_name: &str) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| {
                CaravanError::from(std::io::Error::new(
                    e.kind(),
                    format!("failed to create temp file in {}: {e}", dir.display()),
                ))
            })?;
        Ok(Self {
            temp,
            dest: dir.join(file_name),
        })
    }

    /// The underlying file handle for writing
    pub fn file(&self) -> &File {
        self.temp.as_file()
    }

    /// Path of the temp file (for writers that need a path, not a handle)
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Syncs the temp file to durable storage and renames it into place
    ///
    /// # Errors
    ///
    /// Returns an error if the fsync or rename fails; the temp file is
    /// removed either way.
    pub fn commit(self) -> Result<PathBuf> {
        self.temp.as_file().sync_all()?;
        let dest = self.dest;
        self.temp
            .persist(&dest)
            .map_err(|e| CaravanError::from(e.error))?;
        sync_dir(dest.parent())?;
        Ok(dest)
    }
}

/// Writes a complete byte buffer to `dir/file_name` atomically
///
/// Used for small artifacts written in one piece, like the manifest.
///
/// # Errors
///
/// Returns an error if writing, syncing, or renaming fails.
pub fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    use std::io::Write;

    let mut atomic = AtomicFile::create(dir, file_name)?;
    atomic.temp.write_all(bytes)?;
    atomic.temp.flush()?;
    atomic.commit()
}

/// Syncs a directory so a completed rename survives a crash
#[cfg(unix)]
fn sync_dir(dir: Option<&Path>) -> Result<()> {
    if let Some(dir) = dir {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: Option<&Path>) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_commit_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut atomic = AtomicFile::create(dir.path(), "part-00001.csv").unwrap();
        atomic.temp.write_all(b"data").unwrap();
        atomic.temp.flush().unwrap();

        let dest = atomic.commit().unwrap();
        assert_eq!(dest, dir.path().join("part-00001.csv"));
        assert_eq!(std::fs::read(dest).unwrap(), b"data");
    }

    #[test]
    fn test_drop_without_commit_leaves_nothing_final() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut atomic = AtomicFile::create(dir.path(), "part-00001.csv").unwrap();
            atomic.temp.write_all(b"half a row").unwrap();
            // dropped uncommitted
        }
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.is_empty(), "leftover entries: {names:?}");
    }

    #[test]
    fn test_write_atomic_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let dest = write_atomic(dir.path(), "manifest.json", b"{}\n").unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "{}\n");
    }
}
