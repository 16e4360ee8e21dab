//! Domain models and types for Caravan.
//!
//! This module contains the core domain models, types, and business rules
//! for the export pipeline.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`JobId`], [`IdempotencyKey`], [`ConsumerId`])
//! - **Job lifecycle models** ([`ExportJob`], [`JobStatus`], [`ExportFilter`])
//! - **Row models and ordering** ([`SourceRow`], [`NormalizedRow`])
//! - **Manifest model** ([`Manifest`], [`ManifestEntry`])
//! - **Error types** ([`CaravanError`]) and the [`Result`] alias
//!
//! # Type Safety
//!
//! Caravan uses the newtype pattern for identifiers to prevent mixing
//! different ID types:
//!
//! ```rust
//! use caravan::domain::{IdempotencyKey, JobId};
//!
//! # fn example() -> Result<(), String> {
//! let job_id = JobId::generate();
//! let key = IdempotencyKey::new("submit-2026-run1")?;
//!
//! // This won't compile - type safety prevents mixing IDs
//! // let wrong: JobId = key;  // Compile error!
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, CaravanError>`]:
//!
//! ```rust
//! use caravan::domain::{CaravanError, Result};
//!
//! fn example(format: &str) -> Result<caravan::domain::ExportFormat> {
//!     format.parse()
//! }
//! ```

pub mod errors;
pub mod ids;
pub mod job;
pub mod manifest;
pub mod result;
pub mod row;

// Re-export commonly used types for convenience
pub use errors::{user_message, CaravanError};
pub use ids::{ConsumerId, IdempotencyKey, JobId};
pub use job::{ExportFilter, ExportFormat, ExportJob, JobError, JobStatus, OutputFile};
pub use manifest::{Manifest, ManifestEntry, MANIFEST_FILE_NAME};
pub use result::Result;
pub use row::{
    CellValue, ColumnSpec, NormalizedRow, SourceRow, COLUMNS, SCHOOL_CODE_SENTINEL,
    SORT_KEY_DESCRIPTION,
};
