//! Exporter service
//!
//! Drives one export attempt end to end: pull batches from the row source,
//! normalize, spill sorted runs, k-way merge, write ordered chunks through
//! the format's writer, and finalize with a manifest written strictly after
//! every data file is durably in place. Cancellation is honored at chunk
//! boundaries; a chunk being written always completes or leaves only a temp
//! file.

use crate::adapters::rows::RowSource;
use crate::config::{ExportConfig, MalformedRowPolicy};
use crate::core::clock::Clock;
use crate::core::export::atomic::write_atomic;
use crate::core::export::csv_writer::CsvChunkWriter;
use crate::core::export::spill::SpillStore;
use crate::core::export::writer::{ChunkWriter, FinishedFile};
use crate::core::export::xlsx_writer::XlsxChunkWriter;
use crate::core::normalize::{normalize_row, RowOutcome};
use crate::domain::{
    CaravanError, ExportFormat, ExportJob, Manifest, Result, MANIFEST_FILE_NAME,
    SORT_KEY_DESCRIPTION,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Progress carried across retry attempts of one job
///
/// For chunked formats, files finalized by a failed attempt are complete
/// and correctly ordered, so a retry skips that many chunks of the merged
/// stream instead of rewriting them. Single-file formats reset and restart.
#[derive(Debug, Default)]
pub struct ExportProgress {
    /// Chunks already finalized as durable files
    pub completed_chunks: usize,
    /// The finalized files, in output order
    pub files: Vec<FinishedFile>,
    /// Malformed rows dropped under the skip policy
    pub rows_skipped: u64,
}

impl ExportProgress {
    /// Discards progress, for formats that cannot resume
    pub fn reset(&mut self) {
        self.completed_chunks = 0;
        self.files.clear();
        self.rows_skipped = 0;
    }
}

/// Result of a successful export
#[derive(Debug)]
pub struct ExportOutcome {
    /// All finalized data files, in output order
    pub files: Vec<FinishedFile>,
    /// Manifest file name within the job directory
    pub manifest_file: String,
    /// Total data rows written
    pub rows_exported: u64,
    /// Malformed rows dropped under the skip policy
    pub rows_skipped: u64,
}

/// Streaming exporter behind the job runner
pub struct ExporterService {
    config: ExportConfig,
    clock: Arc<dyn Clock>,
}

impl ExporterService {
    /// Creates an exporter with the given configuration and clock
    pub fn new(config: ExportConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Output directory for a job
    pub fn job_dir(&self, job: &ExportJob) -> PathBuf {
        PathBuf::from(&self.config.output_dir).join(job.id.as_str())
    }

    /// Whether a failed attempt of this format can resume at a chunk
    /// boundary
    pub fn is_resumable(format: ExportFormat) -> bool {
        matches!(format, ExportFormat::Csv)
    }

    /// Runs one export attempt
    ///
    /// On success every data file and the manifest are durably renamed into
    /// the job directory. On failure, spill artifacts and uncommitted temp
    /// files are removed; finalized chunk files stay for a resumable retry.
    ///
    /// # Errors
    ///
    /// Returns [`CaravanError::Cancelled`] when cancellation is observed at
    /// a chunk boundary, a transient or unrecoverable I/O error from the
    /// storage layer, or [`CaravanError::MalformedRow`] under the abort
    /// policy.
    pub async fn export(
        &self,
        job: &ExportJob,
        source: &mut dyn RowSource,
        progress: &mut ExportProgress,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ExportOutcome> {
        let out_dir = self.job_dir(job);
        std::fs::create_dir_all(&out_dir)?;

        let spill = self.collect_runs(job, source, progress, cancel).await?;
        tracing::debug!(
            job_id = %job.id,
            runs = spill.run_count(),
            "Collected sorted runs, starting merge"
        );

        let resume_skip = if Self::is_resumable(job.format) {
            progress.completed_chunks
        } else {
            0
        };

        let mut writer: Box<dyn ChunkWriter> = match job.format {
            ExportFormat::Csv => Box::new(CsvChunkWriter::new(
                out_dir.clone(),
                self.config.csv_bom,
                resume_skip,
            )),
            ExportFormat::Xlsx => Box::new(XlsxChunkWriter::new(out_dir.clone())),
        };

        let mut chunk: Vec<crate::domain::NormalizedRow> = Vec::new();
        let mut chunk_index = 0usize;
        for row in spill.into_merge()? {
            chunk.push(row?);
            if chunk.len() == self.config.chunk_size {
                self.flush_chunk(
                    job,
                    &mut *writer,
                    &mut chunk,
                    &mut chunk_index,
                    resume_skip,
                    progress,
                    cancel,
                )?;
            }
        }
        if !chunk.is_empty() {
            self.flush_chunk(
                job,
                &mut *writer,
                &mut chunk,
                &mut chunk_index,
                resume_skip,
                progress,
                cancel,
            )?;
        }

        let mut files = progress.files.clone();
        files.extend(writer.finish()?);

        // Manifest strictly last: only after every data file's rename
        let manifest = Manifest::new(
            job.id.clone(),
            job.format,
            SORT_KEY_DESCRIPTION,
            files.iter().map(FinishedFile::to_manifest_entry).collect(),
            self.clock.now(),
        );
        write_atomic(&out_dir, MANIFEST_FILE_NAME, &manifest.to_json_bytes()?)?;

        let rows_exported = files.iter().map(|f| f.row_count).sum();
        tracing::info!(
            job_id = %job.id,
            files = files.len(),
            rows = rows_exported,
            skipped = progress.rows_skipped,
            "Export attempt completed"
        );

        Ok(ExportOutcome {
            files,
            manifest_file: MANIFEST_FILE_NAME.to_string(),
            rows_exported,
            rows_skipped: progress.rows_skipped,
        })
    }

    /// Pulls the whole window from the source into sorted spill runs
    async fn collect_runs(
        &self,
        job: &ExportJob,
        source: &mut dyn RowSource,
        progress: &mut ExportProgress,
        cancel: &watch::Receiver<bool>,
    ) -> Result<SpillStore> {
        let mut spill = SpillStore::create(std::path::Path::new(&self.config.spool_dir), &job.id)?;
        let mut buffer: Vec<crate::domain::NormalizedRow> =
            Vec::with_capacity(self.config.chunk_size.min(64 * 1024));

        // Every attempt re-reads the window, so the skip count starts over
        progress.rows_skipped = 0;

        loop {
            check_cancelled(cancel)?;
            let batch = source.next_batch(self.config.source_batch_size).await?;
            if batch.is_empty() {
                break;
            }
            for raw in batch {
                match normalize_row(raw, self.config.on_malformed)? {
                    RowOutcome::Row(row) => buffer.push(*row),
                    RowOutcome::Skipped => {
                        progress.rows_skipped += 1;
                        if progress.rows_skipped == 1
                            || progress.rows_skipped.is_power_of_two()
                        {
                            tracing::warn!(
                                job_id = %job.id,
                                skipped = progress.rows_skipped,
                                "Dropping malformed rows under skip policy"
                            );
                        }
                    }
                }
                if buffer.len() >= self.config.chunk_size {
                    spill.spill_run(&mut buffer)?;
                }
            }
        }
        spill.spill_run(&mut buffer)?;
        Ok(spill)
    }

    /// Writes or skips one full chunk at a chunk boundary
    #[allow(clippy::too_many_arguments)]
    fn flush_chunk(
        &self,
        job: &ExportJob,
        writer: &mut dyn ChunkWriter,
        chunk: &mut Vec<crate::domain::NormalizedRow>,
        chunk_index: &mut usize,
        resume_skip: usize,
        progress: &mut ExportProgress,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        check_cancelled(cancel)?;

        if *chunk_index < resume_skip {
            // This chunk was finalized by a previous attempt; the merged
            // order is deterministic, so its contents are identical
            tracing::debug!(
                job_id = %job.id,
                chunk = *chunk_index,
                "Skipping chunk finalized by previous attempt"
            );
        } else if let Some(file) = writer.write_chunk(chunk)? {
            tracing::debug!(
                job_id = %job.id,
                file = %file.file_name,
                rows = file.row_count,
                "Finalized chunk file"
            );
            progress.files.push(file);
            progress.completed_chunks += 1;
        }

        *chunk_index += 1;
        chunk.clear();
        Ok(())
    }
}

fn check_cancelled(cancel: &watch::Receiver<bool>) -> Result<()> {
    if *cancel.borrow() {
        return Err(CaravanError::Cancelled);
    }
    Ok(())
}
