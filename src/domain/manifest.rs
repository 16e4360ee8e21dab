//! Export manifest model
//!
//! The manifest is the commit record of an export: it is generated only
//! after every data file has been atomically renamed into place, and it is
//! itself written with the same temp-then-rename discipline, strictly last.
//! Its existence therefore implies that all listed files are complete.

use crate::domain::ids::JobId;
use crate::domain::job::ExportFormat;
use crate::domain::result::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest file name within a job's output directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// One data file listed in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name relative to the manifest
    pub file_name: String,
    /// Number of data rows in the file (headers excluded)
    pub row_count: u64,
    /// Hex-encoded SHA-256 of the file contents
    pub checksum: String,
}

/// Manifest describing a completed export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Output format of the listed files
    pub format: ExportFormat,
    /// Generation timestamp (clock-sourced, serialized as ISO-8601)
    pub generated_at: DateTime<Utc>,
    /// Description of the row ordering inside the files
    pub sort_key: String,
    /// Job this manifest belongs to
    pub job_id: JobId,
    /// Data files, in output order
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Creates a manifest for a completed set of data files
    pub fn new(
        job_id: JobId,
        format: ExportFormat,
        sort_key: impl Into<String>,
        files: Vec<ManifestEntry>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            format,
            generated_at,
            sort_key: sort_key.into(),
            job_id,
            files,
        }
    }

    /// Total data rows across all listed files
    pub fn total_rows(&self) -> u64 {
        self.files.iter().map(|f| f.row_count).sum()
    }

    /// Serializes the manifest to pretty-printed JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parses a manifest from JSON bytes
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manifest_roundtrip() {
        let manifest = Manifest::new(
            JobId::generate(),
            ExportFormat::Csv,
            "year_code, center_code",
            vec![ManifestEntry {
                file_name: "part-00001.csv".to_string(),
                row_count: 50_000,
                checksum: "ab".repeat(32),
            }],
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
        );

        let bytes = manifest.to_json_bytes().unwrap();
        let parsed = Manifest::from_json_bytes(&bytes).unwrap();
        assert_eq!(parsed.files, manifest.files);
        assert_eq!(parsed.generated_at, manifest.generated_at);
        assert_eq!(parsed.total_rows(), 50_000);
    }

    #[test]
    fn test_generated_at_is_iso8601() {
        let manifest = Manifest::new(
            JobId::generate(),
            ExportFormat::Xlsx,
            "k",
            vec![],
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
        );
        let json: serde_json::Value =
            serde_json::from_slice(&manifest.to_json_bytes().unwrap()).unwrap();
        assert_eq!(json["generated_at"], "2026-03-14T09:26:53Z");
        assert_eq!(json["format"], "xlsx");
    }
}
