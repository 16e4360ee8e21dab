//! Domain error types
//!
//! This module defines the error taxonomy for Caravan. Every failure the
//! pipeline can produce maps onto one of these variants, and every variant
//! carries a stable error code with a fixed user-facing message so the same
//! failure always reads the same way at the HTTP boundary. Errors never
//! expose third-party types.

use thiserror::Error;

/// Main Caravan error type
///
/// This is the primary error type used throughout the application.
/// Variants mirror the pipeline's failure taxonomy: synchronous rejections
/// (validation, rate limiting, idempotency conflicts), retryable transient
/// I/O, terminal I/O, malformed input rows, and cancellation.
#[derive(Debug, Error)]
pub enum CaravanError {
    /// Bad request parameters, rejected before any work begins
    #[error("Validation error: {0}")]
    Validation(String),

    /// Submission rejected by the rate limiter
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Milliseconds until at least one token is available
        retry_after_ms: u64,
    },

    /// Idempotency key reused with a different request body
    #[error("Idempotency conflict: {0}")]
    IdempotencyConflict(String),

    /// A request with this idempotency key is still executing
    #[error("Idempotency key in flight: {0}")]
    IdempotencyInFlight(String),

    /// Transient I/O or storage error, retried by the job runner
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Terminal I/O error (permissions, disk full after retries)
    #[error("Unrecoverable I/O error: {0}")]
    UnrecoverableIo(String),

    /// A source row failed normalization or field validation
    #[error("Malformed row {identifier}: {reason}")]
    MalformedRow {
        /// Identifier of the offending row, when known
        identifier: String,
        /// What was wrong with it
        reason: String,
    },

    /// Job cancelled between chunks
    #[error("Job cancelled")]
    Cancelled,

    /// Job not found in the job store
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Export process errors that fit no other variant
    #[error("Export error: {0}")]
    Export(String),
}

impl CaravanError {
    /// Stable error code for this variant
    ///
    /// Codes key the fixed user-facing message table and the failure-reason
    /// metrics, so they must never change for an existing variant.
    pub fn code(&self) -> &'static str {
        match self {
            CaravanError::Validation(_) => "validation_error",
            CaravanError::RateLimited { .. } => "rate_limited",
            CaravanError::IdempotencyConflict(_) => "idempotency_conflict",
            CaravanError::IdempotencyInFlight(_) => "idempotency_in_flight",
            CaravanError::TransientIo(_) => "transient_io",
            CaravanError::UnrecoverableIo(_) => "unrecoverable_io",
            CaravanError::MalformedRow { .. } => "malformed_row",
            CaravanError::Cancelled => "cancelled",
            CaravanError::JobNotFound(_) => "job_not_found",
            CaravanError::Configuration(_) => "configuration_error",
            CaravanError::Serialization(_) => "serialization_error",
            CaravanError::Export(_) => "export_error",
        }
    }

    /// Whether the job runner should retry this error
    pub fn is_transient(&self) -> bool {
        matches!(self, CaravanError::TransientIo(_))
    }
}

/// Fixed user-facing message for an error code
///
/// The HTTP boundary and the status endpoint surface these strings instead
/// of internal error text, so the same failure always produces the same
/// message and no internal detail leaks to clients.
pub fn user_message(code: &str) -> &'static str {
    match code {
        "validation_error" => "The request parameters are invalid.",
        "rate_limited" => "Too many requests. Retry after the indicated delay.",
        "idempotency_conflict" => {
            "This idempotency key was already used with a different request."
        }
        "idempotency_in_flight" => {
            "A request with this idempotency key is still being processed."
        }
        "transient_io" => "A temporary storage error occurred. The export was retried.",
        "unrecoverable_io" => "The export failed due to a storage error.",
        "malformed_row" => "The export failed because a source row was malformed.",
        "cancelled" => "The export was cancelled.",
        "job_not_found" => "No export job exists with this identifier.",
        "configuration_error" => "The service is misconfigured.",
        "serialization_error" => "The export failed while encoding data.",
        "export_error" => "The export failed.",
        _ => "An unexpected error occurred.",
    }
}

// Conversion from std::io::Error, classifying transient vs. terminal kinds
impl From<std::io::Error> for CaravanError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => CaravanError::TransientIo(err.to_string()),
            _ => CaravanError::UnrecoverableIo(err.to_string()),
        }
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for CaravanError {
    fn from(err: serde_json::Error) -> Self {
        CaravanError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for CaravanError {
    fn from(err: toml::de::Error) -> Self {
        CaravanError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CaravanError::Validation("bad format".to_string());
        assert_eq!(err.to_string(), "Validation error: bad format");
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            CaravanError::RateLimited { retry_after_ms: 250 }.code(),
            "rate_limited"
        );
        assert_eq!(CaravanError::Cancelled.code(), "cancelled");
        assert_eq!(
            CaravanError::TransientIo("timeout".into()).code(),
            "transient_io"
        );
    }

    #[test]
    fn test_user_message_is_deterministic() {
        let first = user_message("malformed_row");
        let second = user_message("malformed_row");
        assert_eq!(first, second);
        assert_eq!(user_message("nonsense_code"), "An unexpected error occurred.");
    }

    #[test]
    fn test_transient_classification() {
        assert!(CaravanError::TransientIo("x".into()).is_transient());
        assert!(!CaravanError::UnrecoverableIo("x".into()).is_transient());
        assert!(!CaravanError::Cancelled.is_transient());
    }

    #[test]
    fn test_io_error_kind_classification() {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        assert!(matches!(
            CaravanError::from(timeout),
            CaravanError::TransientIo(_)
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert!(matches!(
            CaravanError::from(denied),
            CaravanError::UnrecoverableIo(_)
        ));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CaravanError = json_err.into();
        assert!(matches!(err, CaravanError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("a = b = c").unwrap_err();
        let err: CaravanError = toml_err.into();
        assert!(matches!(err, CaravanError::Configuration(_)));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CaravanError::Export("test".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
