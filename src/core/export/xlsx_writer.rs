//! Spreadsheet chunk writer
//!
//! One physical workbook for the whole job, one sheet per chunk. Numeric
//! and date-like values are written as typed cells; sensitive columns are
//! written as literal text cells even when numeric-looking, so spreadsheet
//! applications cannot autoformat them (leading zeros survive). The
//! finished workbook is finalized atomically like every other artifact.

use crate::core::export::atomic::AtomicFile;
use crate::core::export::checksum::checksum_file;
use crate::core::export::writer::{ChunkWriter, FinishedFile};
use crate::core::normalize::guard_formula;
use crate::domain::{CaravanError, CellValue, NormalizedRow, Result, COLUMNS};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::PathBuf;

/// Workbook file name within the job's output directory
pub const WORKBOOK_FILE_NAME: &str = "export.xlsx";

/// XLSX writer: one sheet per chunk, single physical file
pub struct XlsxChunkWriter {
    out_dir: PathBuf,
    workbook: Workbook,
    date_format: Format,
    sheet_count: usize,
    row_count: u64,
}

impl XlsxChunkWriter {
    /// Creates a writer emitting `export.xlsx` into `out_dir`
    pub fn new(out_dir: PathBuf) -> Self {
        Self {
            out_dir,
            workbook: Workbook::new(),
            date_format: Format::new().set_num_format("yyyy-mm-dd"),
            sheet_count: 0,
            row_count: 0,
        }
    }

    fn add_sheet(&mut self, rows: &[NormalizedRow]) -> std::result::Result<(), XlsxError> {
        let name = format!("part-{:03}", self.sheet_count + 1);
        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(&name)?;

        for (col, spec) in COLUMNS.iter().enumerate() {
            worksheet.write_string(0, col as u16, spec.name)?;
        }

        for (r, row) in rows.iter().enumerate() {
            let sheet_row = (r + 1) as u32;
            for (col, (cell, spec)) in row.cells().iter().zip(COLUMNS.iter()).enumerate() {
                let col = col as u16;
                match cell {
                    CellValue::Text(text) => {
                        worksheet.write_string(sheet_row, col, &guard_formula(text))?;
                    }
                    CellValue::Integer(n) => {
                        if spec.sensitive {
                            worksheet.write_string(sheet_row, col, &n.to_string())?;
                        } else {
                            worksheet.write_number(sheet_row, col, *n as f64)?;
                        }
                    }
                    CellValue::Date(date) => {
                        worksheet.write_datetime_with_format(
                            sheet_row,
                            col,
                            *date,
                            &self.date_format,
                        )?;
                    }
                    CellValue::Empty => {}
                }
            }
        }

        self.sheet_count += 1;
        self.row_count += rows.len() as u64;
        Ok(())
    }
}

impl ChunkWriter for XlsxChunkWriter {
    fn write_chunk(&mut self, rows: &[NormalizedRow]) -> Result<Option<FinishedFile>> {
        self.add_sheet(rows)?;
        // The physical file only exists once finish() runs
        Ok(None)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<FinishedFile>> {
        if self.sheet_count == 0 {
            // An export with zero rows still publishes a header-only sheet
            self.add_sheet(&[])?;
        }

        let atomic = AtomicFile::create(&self.out_dir, WORKBOOK_FILE_NAME)?;
        self.workbook.save(atomic.temp_path())?;

        let checksum = checksum_file(atomic.temp_path())?;
        let byte_size = std::fs::metadata(atomic.temp_path())?.len();
        atomic.commit()?;

        Ok(vec![FinishedFile {
            file_name: WORKBOOK_FILE_NAME.to_string(),
            row_count: self.row_count,
            byte_size,
            checksum,
        }])
    }
}

// rust_xlsxwriter errors stay behind the domain error type
impl From<XlsxError> for CaravanError {
    fn from(err: XlsxError) -> Self {
        match err {
            XlsxError::IoError(io_err) => CaravanError::from(io_err),
            other => CaravanError::Export(format!("xlsx write failed: {other}")),
        }
    }
}
