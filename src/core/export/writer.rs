//! Chunk writer abstraction
//!
//! Both output formats sit behind [`ChunkWriter`]: the exporter feeds
//! ordered chunks of normalized rows and collects finished, checksummed
//! files. The CSV writer finalizes one physical file per chunk; the
//! spreadsheet writer adds one sheet per chunk and finalizes a single file
//! at the end.

use crate::core::normalize::guard_formula;
use crate::domain::{CellValue, ManifestEntry, NormalizedRow, OutputFile, Result};

/// A durably written, final-named output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedFile {
    /// File name within the job's output directory
    pub file_name: String,
    /// Data rows in the file (headers excluded)
    pub row_count: u64,
    /// Size in bytes
    pub byte_size: u64,
    /// Hex-encoded SHA-256 of the file contents
    pub checksum: String,
}

impl FinishedFile {
    /// Download descriptor for the status endpoint
    pub fn to_output_file(&self) -> OutputFile {
        OutputFile {
            file_name: self.file_name.clone(),
            row_count: self.row_count,
            byte_size: self.byte_size,
            checksum: self.checksum.clone(),
        }
    }

    /// Manifest entry for this file
    pub fn to_manifest_entry(&self) -> ManifestEntry {
        ManifestEntry {
            file_name: self.file_name.clone(),
            row_count: self.row_count,
            checksum: self.checksum.clone(),
        }
    }
}

/// Writer strategy for one output format
///
/// Implementations must write incrementally: peak memory scales with the
/// chunk size, never with the total row count.
pub trait ChunkWriter: Send {
    /// Writes one ordered chunk
    ///
    /// Returns a [`FinishedFile`] when the chunk completed a physical file
    /// (CSV), or `None` when the chunk was appended to a file still being
    /// built (XLSX sheet).
    fn write_chunk(&mut self, rows: &[NormalizedRow]) -> Result<Option<FinishedFile>>;

    /// Finalizes any pending physical file and returns it
    fn finish(self: Box<Self>) -> Result<Vec<FinishedFile>>;
}

/// Serializes a cell to its delimited-text form
///
/// Text cells get the formula-injection guard; numeric and date cells use
/// their canonical ASCII forms. Sensitivity does not change the text here,
/// only the quoting behavior of the writer.
pub fn cell_to_text(value: &CellValue) -> String {
    match value {
        CellValue::Text(text) => guard_formula(text),
        CellValue::Integer(n) => n.to_string(),
        CellValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        CellValue::Empty => String::new(),
    }
}
