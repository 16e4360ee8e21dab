//! Integration tests for the export pipeline
//!
//! These tests drive the exporter service end to end over in-memory row
//! sources and verify:
//! - Chunking into multiple files with correct row counts
//! - Deterministic ordering regardless of input permutation
//! - Manifest correctness (written last, checksums match the files)
//! - Formula-injection guarding in real output
//! - Malformed-row policies
//! - Cancellation and failure atomicity

use caravan::adapters::rows::{MemoryRowSource, RowSource};
use caravan::config::{ExportConfig, MalformedRowPolicy};
use caravan::core::clock::FrozenClock;
use caravan::core::export::checksum::checksum_file;
use caravan::core::export::{ExportProgress, ExporterService};
use caravan::domain::{
    CaravanError, ExportFilter, ExportFormat, ExportJob, JobId, Manifest, Result, SourceRow,
    MANIFEST_FILE_NAME,
};
use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

fn export_config(dir: &Path, chunk_size: usize) -> ExportConfig {
    ExportConfig {
        output_dir: dir.join("exports").to_string_lossy().into_owned(),
        spool_dir: dir.join("spool").to_string_lossy().into_owned(),
        chunk_size,
        source_batch_size: 512,
        csv_bom: true,
        on_malformed: MalformedRowPolicy::Abort,
    }
}

fn service(dir: &Path, chunk_size: usize) -> ExporterService {
    let clock = Arc::new(FrozenClock::new(
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
    ));
    ExporterService::new(export_config(dir, chunk_size), clock)
}

fn job(format: ExportFormat) -> ExportJob {
    ExportJob::new(
        JobId::generate(),
        format,
        ExportFilter {
            year_code: "2026".to_string(),
            center_codes: None,
            group_codes: None,
            school_codes: None,
        },
        "req-test".to_string(),
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
    )
}

fn synthetic_rows(count: usize) -> Vec<SourceRow> {
    (0..count)
        .map(|i| SourceRow {
            year_code: "2026".to_string(),
            center_code: format!("C{:03}", i % 40),
            group_code: format!("G{}", i % 4),
            school_code: if i % 7 == 0 {
                None
            } else {
                Some(format!("S{:03}", i % 25))
            },
            candidate_id: format!("K-{i:07}"),
            candidate_name: format!("Candidate {i}"),
            national_id: format!("{:011}", i),
            seat_number: Some((i % 500) as u32 + 1),
            exam_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 1 + (i % 20) as u32),
        })
        .collect()
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

async fn run_export(
    service: &ExporterService,
    job: &ExportJob,
    rows: Vec<SourceRow>,
) -> Result<caravan::core::export::ExportOutcome> {
    let mut source = MemoryRowSource::new(rows);
    let mut progress = ExportProgress::default();
    service
        .export(job, &mut source as &mut dyn RowSource, &mut progress, &no_cancel())
        .await
}

#[tokio::test]
async fn test_csv_chunking_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 5_000);
    let job = job(ExportFormat::Csv);

    let outcome = run_export(&service, &job, synthetic_rows(12_000)).await.unwrap();

    // 12,000 rows at chunk 5,000: two full files and one remainder
    assert_eq!(outcome.files.len(), 3);
    let counts: Vec<u64> = outcome.files.iter().map(|f| f.row_count).collect();
    assert_eq!(counts, vec![5_000, 5_000, 2_000]);
    assert_eq!(outcome.rows_exported, 12_000);

    let out_dir = service.job_dir(&job);
    let manifest = Manifest::from_json_bytes(
        &std::fs::read(out_dir.join(MANIFEST_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.files.len(), 3);
    assert_eq!(manifest.total_rows(), 12_000);
    assert_eq!(manifest.job_id, job.id);
    assert_eq!(
        manifest.generated_at,
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    );

    // Every checksum in the manifest matches the file on disk
    for entry in &manifest.files {
        let on_disk = checksum_file(&out_dir.join(&entry.file_name)).unwrap();
        assert_eq!(on_disk, entry.checksum, "checksum mismatch: {}", entry.file_name);
    }

    // No stray temp artifacts remain
    for dir_entry in std::fs::read_dir(&out_dir).unwrap() {
        let name = dir_entry.unwrap().file_name().to_string_lossy().into_owned();
        assert!(!name.starts_with('.'), "leftover temp file: {name}");
    }
}

#[tokio::test]
async fn test_order_is_deterministic_across_permutations() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let service_a = service(dir_a.path(), 1_000);
    let service_b = service(dir_b.path(), 1_000);
    let job_a = job(ExportFormat::Csv);
    let job_b = job(ExportFormat::Csv);

    let rows = synthetic_rows(3_000);
    let mut reversed = rows.clone();
    reversed.reverse();

    let out_a = run_export(&service_a, &job_a, rows).await.unwrap();
    let out_b = run_export(&service_b, &job_b, reversed).await.unwrap();

    let checksums_a: Vec<&str> = out_a.files.iter().map(|f| f.checksum.as_str()).collect();
    let checksums_b: Vec<&str> = out_b.files.iter().map(|f| f.checksum.as_str()).collect();
    assert_eq!(checksums_a, checksums_b, "permuted input changed the output");
}

#[tokio::test]
async fn test_tie_break_on_candidate_id() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 1_000);
    let job = job(ExportFormat::Csv);

    // Identical composite keys except for the candidate id
    let mut rows = synthetic_rows(2);
    for (i, row) in rows.iter_mut().enumerate() {
        row.center_code = "C001".to_string();
        row.group_code = "G1".to_string();
        row.school_code = Some("S001".to_string());
        row.candidate_id = if i == 0 { "K-B" } else { "K-A" }.to_string();
    }

    run_export(&service, &job, rows).await.unwrap();

    let text = std::fs::read_to_string(
        service.job_dir(&job).join("part-00001.csv"),
    )
    .unwrap();
    let pos_a = text.find("K-A").unwrap();
    let pos_b = text.find("K-B").unwrap();
    assert!(pos_a < pos_b, "tie-break should order K-A before K-B");
}

#[tokio::test]
async fn test_formula_guard_survives_the_whole_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 1_000);
    let job = job(ExportFormat::Csv);

    let mut rows = synthetic_rows(2);
    rows[0].candidate_name = "=2+2".to_string();
    rows[1].candidate_name = "plain text".to_string();

    run_export(&service, &job, rows).await.unwrap();

    let text = std::fs::read_to_string(
        service.job_dir(&job).join("part-00001.csv"),
    )
    .unwrap();
    assert!(text.contains("\"'=2+2\""), "formula value must be escaped");
    assert!(text.contains("\"plain text\""), "plain value must pass through");
    assert!(!text.contains("\"=2+2\""), "unescaped formula leaked into output");
}

#[tokio::test]
async fn test_malformed_row_aborts_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 1_000);
    let job = job(ExportFormat::Csv);

    let mut rows = synthetic_rows(10);
    rows[4].center_code = "  ".to_string();

    let err = run_export(&service, &job, rows).await.unwrap_err();
    assert_eq!(err.code(), "malformed_row");

    // Abort means nothing was published
    let out_dir = service.job_dir(&job);
    assert!(!out_dir.join(MANIFEST_FILE_NAME).exists());
}

#[tokio::test]
async fn test_malformed_rows_skipped_and_counted_under_skip_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = export_config(dir.path(), 1_000);
    config.on_malformed = MalformedRowPolicy::Skip;
    let clock = Arc::new(FrozenClock::new(
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
    ));
    let service = ExporterService::new(config, clock);
    let job = job(ExportFormat::Csv);

    let mut rows = synthetic_rows(10);
    rows[2].candidate_id = String::new();
    rows[7].year_code = String::new();

    let outcome = run_export(&service, &job, rows).await.unwrap();
    assert_eq!(outcome.rows_skipped, 2);
    assert_eq!(outcome.rows_exported, 8);
}

#[tokio::test]
async fn test_cancellation_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 1_000);
    let job = job(ExportFormat::Csv);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let mut source = MemoryRowSource::new(synthetic_rows(100));
    let mut progress = ExportProgress::default();
    let err = service
        .export(&job, &mut source as &mut dyn RowSource, &mut progress, &cancel_rx)
        .await
        .unwrap_err();
    assert!(matches!(err, CaravanError::Cancelled));

    let out_dir = service.job_dir(&job);
    assert!(!out_dir.join(MANIFEST_FILE_NAME).exists());
    assert!(!out_dir.join("part-00001.csv").exists());

    // Spill artifacts are cleaned up with the failed attempt
    let spool = dir.path().join("spool");
    assert_eq!(std::fs::read_dir(spool).unwrap().count(), 0);
}

struct FailingSource {
    yielded: usize,
}

#[async_trait::async_trait]
impl RowSource for FailingSource {
    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<SourceRow>> {
        if self.yielded >= 1_500 {
            return Err(CaravanError::UnrecoverableIo(
                "relation scan aborted".to_string(),
            ));
        }
        let batch = synthetic_rows(max_rows.min(500));
        self.yielded += batch.len();
        Ok(batch)
    }
}

#[tokio::test]
async fn test_midstream_failure_leaves_no_final_files() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 1_000);
    let job = job(ExportFormat::Csv);

    let mut source = FailingSource { yielded: 0 };
    let mut progress = ExportProgress::default();
    let err = service
        .export(&job, &mut source, &mut progress, &no_cancel())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unrecoverable_io");

    // The failure hit while reading the source: no manifest, no
    // final-named data file, no spill leftovers
    let out_dir = service.job_dir(&job);
    assert!(!out_dir.join(MANIFEST_FILE_NAME).exists());
    if out_dir.exists() {
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }
    assert_eq!(
        std::fs::read_dir(dir.path().join("spool")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn test_xlsx_single_file_multiple_sheets() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 1_000);
    let job = job(ExportFormat::Xlsx);

    let outcome = run_export(&service, &job, synthetic_rows(2_500)).await.unwrap();

    // One physical workbook regardless of chunk count
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].file_name, "export.xlsx");
    assert_eq!(outcome.files[0].row_count, 2_500);

    let out_dir = service.job_dir(&job);
    let bytes = std::fs::read(out_dir.join("export.xlsx")).unwrap();
    assert_eq!(&bytes[..2], b"PK", "xlsx must be a zip container");

    let manifest = Manifest::from_json_bytes(
        &std::fs::read(out_dir.join(MANIFEST_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.files.len(), 1);
    assert_eq!(manifest.files[0].checksum, outcome.files[0].checksum);
}

#[tokio::test]
async fn test_csv_resume_skips_completed_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 1_000);
    let job = job(ExportFormat::Csv);
    let rows = synthetic_rows(2_500);

    // First full run establishes the expected outputs
    let first = run_export(&service, &job, rows.clone()).await.unwrap();
    assert_eq!(first.files.len(), 3);

    // Simulate an attempt that had finalized only the first chunk
    let out_dir = service.job_dir(&job);
    std::fs::remove_file(out_dir.join("part-00002.csv")).unwrap();
    std::fs::remove_file(out_dir.join("part-00003.csv")).unwrap();
    std::fs::remove_file(out_dir.join(MANIFEST_FILE_NAME)).unwrap();

    let mut progress = ExportProgress {
        completed_chunks: 1,
        files: vec![first.files[0].clone()],
        rows_skipped: 0,
    };
    let mut source = MemoryRowSource::new(rows);
    let resumed = service
        .export(&job, &mut source as &mut dyn RowSource, &mut progress, &no_cancel())
        .await
        .unwrap();

    // The resumed attempt reproduces the exact same artifact set
    assert_eq!(resumed.files.len(), 3);
    let first_sums: Vec<&str> = first.files.iter().map(|f| f.checksum.as_str()).collect();
    let resumed_sums: Vec<&str> = resumed.files.iter().map(|f| f.checksum.as_str()).collect();
    assert_eq!(first_sums, resumed_sums);
    assert!(out_dir.join(MANIFEST_FILE_NAME).exists());
}

#[tokio::test]
async fn test_export_far_larger_than_chunk_streams_through() {
    // Spec scenario: 120,000 rows at chunk 50,000 -> exactly three files
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), 50_000);
    let job = job(ExportFormat::Csv);

    let outcome = run_export(&service, &job, synthetic_rows(120_000)).await.unwrap();

    let counts: Vec<u64> = outcome.files.iter().map(|f| f.row_count).collect();
    assert_eq!(counts, vec![50_000, 50_000, 20_000]);

    let manifest = Manifest::from_json_bytes(
        &std::fs::read(service.job_dir(&job).join(MANIFEST_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.total_rows(), 120_000);
}
