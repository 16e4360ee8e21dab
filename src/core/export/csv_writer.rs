//! Delimited-text chunk writer
//!
//! One physical file per chunk: UTF-8 with an optional byte-order mark,
//! CRLF line endings, RFC-4180 quoting. The writer quotes every field;
//! sensitive columns require always-on quoting and full quoting keeps the
//! output uniform for the spreadsheet applications that consume it. Each
//! file is hashed while being written and finalized atomically.

use crate::core::export::atomic::AtomicFile;
use crate::core::export::checksum::HashingWriter;
use crate::core::export::writer::{cell_to_text, ChunkWriter, FinishedFile};
use crate::domain::{CaravanError, NormalizedRow, Result, COLUMNS};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// UTF-8 byte-order mark
const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// CSV writer: one `part-NNNNN.csv` per chunk
pub struct CsvChunkWriter {
    out_dir: PathBuf,
    bom: bool,
    next_part: usize,
}

impl CsvChunkWriter {
    /// Creates a writer emitting into `out_dir`
    ///
    /// `start_part` is the number of parts already finalized by a previous
    /// attempt, so resumed jobs continue the numbering instead of
    /// restarting it.
    pub fn new(out_dir: PathBuf, bom: bool, start_part: usize) -> Self {
        Self {
            out_dir,
            bom,
            next_part: start_part,
        }
    }

    /// File name for the given zero-based part index
    pub fn part_file_name(part: usize) -> String {
        format!("part-{:05}.csv", part + 1)
    }
}

impl ChunkWriter for CsvChunkWriter {
    fn write_chunk(&mut self, rows: &[NormalizedRow]) -> Result<Option<FinishedFile>> {
        let file_name = Self::part_file_name(self.next_part);
        let atomic = AtomicFile::create(&self.out_dir, &file_name)?;

        let mut hashing = HashingWriter::new(BufWriter::new(atomic.file()));
        if self.bom {
            hashing.write_all(BOM)?;
        }

        let mut csv_writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(hashing);

        csv_writer.write_record(COLUMNS.iter().map(|c| c.name))?;
        for row in rows {
            csv_writer.write_record(row.cells().iter().map(cell_to_text))?;
        }
        csv_writer.flush()?;

        let hashing = csv_writer
            .into_inner()
            .map_err(|e| CaravanError::Export(format!("csv writer flush failed: {e}")))?;
        let (mut buffered, checksum, byte_size) = hashing.finalize();
        buffered.flush()?;
        drop(buffered);

        atomic.commit()?;
        self.next_part += 1;

        Ok(Some(FinishedFile {
            file_name,
            row_count: rows.len() as u64,
            byte_size,
            checksum,
        }))
    }

    fn finish(self: Box<Self>) -> Result<Vec<FinishedFile>> {
        // Every chunk already finalized its own file
        Ok(Vec::new())
    }
}

// csv::Error does not reach callers; wrap it at the boundary here
impl From<csv::Error> for CaravanError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io_err) => CaravanError::from(io_err),
                other => CaravanError::Export(format!("csv write failed: {other:?}")),
            }
        } else {
            CaravanError::Export(format!("csv write failed: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::checksum::checksum_bytes;
    use chrono::NaiveDate;

    fn row(candidate: &str, name: &str) -> NormalizedRow {
        NormalizedRow {
            year_code: "2026".to_string(),
            center_code: "C01".to_string(),
            group_code: "G1".to_string(),
            school_code: None,
            candidate_id: candidate.to_string(),
            candidate_name: name.to_string(),
            national_id: "00123".to_string(),
            seat_number: Some(7),
            exam_date: NaiveDate::from_ymd_opt(2026, 6, 1),
        }
    }

    #[test]
    fn test_writes_bom_crlf_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvChunkWriter::new(dir.path().to_path_buf(), true, 0);

        let finished = writer.write_chunk(&[row("K-1", "Amina Diallo")]).unwrap().unwrap();
        assert_eq!(finished.file_name, "part-00001.csv");
        assert_eq!(finished.row_count, 1);

        let bytes = std::fs::read(dir.path().join(&finished.file_name)).unwrap();
        assert_eq!(&bytes[..3], BOM);
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert!(text.starts_with("\"year_code\","));
        assert!(text.contains("\r\n"));
        assert!(text.contains("\"Amina Diallo\""));
        assert_eq!(finished.byte_size, bytes.len() as u64);
        assert_eq!(finished.checksum, checksum_bytes(&bytes));
    }

    #[test]
    fn test_no_bom_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvChunkWriter::new(dir.path().to_path_buf(), false, 0);
        let finished = writer.write_chunk(&[row("K-1", "B")]).unwrap().unwrap();
        let bytes = std::fs::read(dir.path().join(&finished.file_name)).unwrap();
        assert_ne!(&bytes[..3], BOM);
    }

    #[test]
    fn test_formula_guard_applied_in_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvChunkWriter::new(dir.path().to_path_buf(), false, 0);
        let finished = writer.write_chunk(&[row("K-1", "=2+2")]).unwrap().unwrap();
        let text =
            std::fs::read_to_string(dir.path().join(&finished.file_name)).unwrap();
        assert!(text.contains("\"'=2+2\""));
        assert!(!text.contains("\"=2+2\""));
    }

    #[test]
    fn test_part_numbering_continues_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvChunkWriter::new(dir.path().to_path_buf(), false, 0);
        let first = writer.write_chunk(&[row("K-1", "A")]).unwrap().unwrap();
        let second = writer.write_chunk(&[row("K-2", "B")]).unwrap().unwrap();
        assert_eq!(first.file_name, "part-00001.csv");
        assert_eq!(second.file_name, "part-00002.csv");
    }

    #[test]
    fn test_resume_numbering_starts_after_completed_parts() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvChunkWriter::new(dir.path().to_path_buf(), false, 2);
        let finished = writer.write_chunk(&[row("K-5", "E")]).unwrap().unwrap();
        assert_eq!(finished.file_name, "part-00003.csv");
    }

    #[test]
    fn test_quoting_embedded_delimiters() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvChunkWriter::new(dir.path().to_path_buf(), false, 0);
        let finished = writer
            .write_chunk(&[row("K-1", "Diallo, Amina \"AD\"")])
            .unwrap()
            .unwrap();
        let text =
            std::fs::read_to_string(dir.path().join(&finished.file_name)).unwrap();
        // RFC-4180: embedded quotes doubled, field stays one cell
        assert!(text.contains("\"Diallo, Amina \"\"AD\"\"\""));
    }
}
