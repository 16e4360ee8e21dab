//! Export job model and lifecycle
//!
//! An [`ExportJob`] is created at submission, mutated only by the job runner
//! that owns it, and read lock-free by the status endpoint. Transitions
//! follow the fixed state machine: `Pending -> Running -> Succeeded|Failed`,
//! with transient failures retried in place while the job stays `Running`.

use crate::domain::errors::{user_message, CaravanError};
use crate::domain::ids::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// UTF-8 delimited text, one file per chunk
    Csv,
    /// Single spreadsheet file, one sheet per chunk
    Xlsx,
}

impl ExportFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CaravanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(CaravanError::Validation(format!(
                "Unknown export format '{other}', expected 'csv' or 'xlsx'"
            ))),
        }
    }
}

/// Filter/window parameters selecting the rows a job exports
///
/// The year code is mandatory; the remaining filters narrow the window.
/// Empty filter lists are rejected rather than silently matching nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilter {
    /// Examination year code (required)
    pub year_code: String,

    /// Restrict to these center codes (None = all centers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_codes: Option<Vec<String>>,

    /// Restrict to these group codes (None = all groups)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_codes: Option<Vec<String>>,

    /// Restrict to these school codes (None = all schools)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_codes: Option<Vec<String>>,
}

impl ExportFilter {
    /// Validates the filter parameters
    ///
    /// # Errors
    ///
    /// Returns a validation error if the year code is empty or any provided
    /// filter list is empty.
    pub fn validate(&self) -> Result<(), CaravanError> {
        if self.year_code.trim().is_empty() {
            return Err(CaravanError::Validation(
                "year_code must not be empty".to_string(),
            ));
        }
        for (name, list) in [
            ("center_codes", &self.center_codes),
            ("group_codes", &self.group_codes),
            ("school_codes", &self.school_codes),
        ] {
            if let Some(values) = list {
                if values.is_empty() {
                    return Err(CaravanError::Validation(format!(
                        "{name} must not be an empty list"
                    )));
                }
                if values.iter().any(|v| v.trim().is_empty()) {
                    return Err(CaravanError::Validation(format!(
                        "{name} must not contain empty values"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, not yet picked up by the runner
    Pending,
    /// Export in progress (including in-place retries)
    Running,
    /// All files and the manifest are durably in place
    Succeeded,
    /// Terminal failure, reason recorded
    Failed,
}

impl JobStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Descriptor of one finished output file, surfaced on the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    /// File name under the job's output directory
    pub file_name: String,
    /// Number of data rows in the file (headers excluded)
    pub row_count: u64,
    /// File size in bytes
    pub byte_size: u64,
    /// Hex-encoded SHA-256 of the file contents
    pub checksum: String,
}

/// Terminal error recorded on a failed job
///
/// The message is the fixed per-code string, never internal error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Stable error code from the failure taxonomy
    pub code: String,
    /// Deterministic user-facing message for that code
    pub message: String,
}

impl JobError {
    /// Builds the recorded error for a pipeline failure
    pub fn from_error(err: &CaravanError) -> Self {
        let code = err.code();
        Self {
            code: code.to_string(),
            message: user_message(code).to_string(),
        }
    }
}

/// An export job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    /// Opaque job identifier
    pub id: JobId,

    /// Requested output format
    pub format: ExportFormat,

    /// Filter/window parameters
    pub filter: ExportFilter,

    /// Current lifecycle status
    pub status: JobStatus,

    /// Creation timestamp (clock-sourced)
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp (clock-sourced)
    pub updated_at: DateTime<Utc>,

    /// Correlation identifier threaded from the HTTP boundary
    pub correlation_id: String,

    /// Number of export attempts made so far
    pub attempts: u32,

    /// Finished output files (populated on success)
    pub files: Vec<OutputFile>,

    /// Manifest file name (populated on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_file: Option<String>,

    /// Terminal error (populated on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobError>,
}

impl ExportJob {
    /// Creates a new pending job
    pub fn new(
        id: JobId,
        format: ExportFormat,
        filter: ExportFilter,
        correlation_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            format,
            filter,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            correlation_id,
            attempts: 0,
            files: Vec::new(),
            manifest_file: None,
            last_error: None,
        }
    }

    /// Marks the job as running and counts the attempt
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempts += 1;
        self.updated_at = now;
    }

    /// Marks the job as succeeded with its outputs
    pub fn mark_succeeded(
        &mut self,
        files: Vec<OutputFile>,
        manifest_file: String,
        now: DateTime<Utc>,
    ) {
        self.status = JobStatus::Succeeded;
        self.files = files;
        self.manifest_file = Some(manifest_file);
        self.last_error = None;
        self.updated_at = now;
    }

    /// Marks the job as failed with the terminal error
    pub fn mark_failed(&mut self, err: &CaravanError, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(JobError::from_error(err));
        self.updated_at = now;
    }
}
