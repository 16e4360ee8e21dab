//! Configuration schema types
//!
//! This module defines the configuration structure for Caravan. Every
//! section validates itself; `CaravanConfig::validate` runs all of them
//! before the service starts.

use serde::{Deserialize, Serialize};

/// Runtime environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment
    #[default]
    Development,
    /// Staging environment
    Staging,
    /// Production environment
    Production,
}

/// Main Caravan configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaravanConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: Environment,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Export pipeline settings
    pub export: ExportConfig,

    /// Retry/backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Submission rate-limit settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Idempotency cache settings
    #[serde(default)]
    pub idempotency: IdempotencyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CaravanConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.server.validate()?;
        self.export.validate()?;
        self.retry.validate()?;
        self.rate_limit.validate()?;
        self.idempotency.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind, e.g. "127.0.0.1:8320"
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), String> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| format!("Invalid bind_addr '{}'", self.bind_addr))?;
        Ok(())
    }
}

/// Policy for rows that fail normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRowPolicy {
    /// Fail the export on the first malformed row (default, avoids silent
    /// data loss)
    #[default]
    Abort,
    /// Drop malformed rows and count them
    Skip,
}

/// Export pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory finished exports are published under (one subdirectory per
    /// job)
    pub output_dir: String,

    /// Directory for sort-run spill files; removed when the job finishes
    pub spool_dir: String,

    /// Rows per output unit: one CSV file or one XLSX sheet (1,000-500,000)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Rows requested from the row source per read
    #[serde(default = "default_source_batch_size")]
    pub source_batch_size: usize,

    /// Emit a UTF-8 byte-order mark at the start of each CSV file
    #[serde(default = "default_true")]
    pub csv_bom: bool,

    /// What to do with rows that fail normalization
    #[serde(default)]
    pub on_malformed: MalformedRowPolicy,
}

impl ExportConfig {
    fn validate(&self) -> Result<(), String> {
        if self.output_dir.trim().is_empty() {
            return Err("export.output_dir must not be empty".to_string());
        }
        if self.spool_dir.trim().is_empty() {
            return Err("export.spool_dir must not be empty".to_string());
        }
        if !(1_000..=500_000).contains(&self.chunk_size) {
            return Err(format!(
                "export.chunk_size must be between 1000 and 500000, got {}",
                self.chunk_size
            ));
        }
        if self.source_batch_size == 0 || self.source_batch_size > self.chunk_size {
            return Err(format!(
                "export.source_batch_size must be between 1 and chunk_size, got {}",
                self.source_batch_size
            ));
        }
        Ok(())
    }
}

/// Retry/backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on any single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total attempt budget per job (first attempt included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout for a single export attempt, in seconds
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Overall ceiling per job, independent of retries, in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("retry.base_delay_ms must be positive".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("retry.max_delay_ms must be >= retry.base_delay_ms".to_string());
        }
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.attempt_timeout_secs == 0 || self.job_timeout_secs == 0 {
            return Err("retry timeouts must be positive".to_string());
        }
        if self.job_timeout_secs < self.attempt_timeout_secs {
            return Err(
                "retry.job_timeout_secs must be >= retry.attempt_timeout_secs".to_string(),
            );
        }
        Ok(())
    }
}

/// Submission rate-limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Token bucket capacity per (route, consumer)
    #[serde(default = "default_rate_capacity")]
    pub capacity: u32,

    /// Tokens restored per second
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("rate_limit.capacity must be at least 1".to_string());
        }
        if !(self.refill_per_sec > 0.0) || !self.refill_per_sec.is_finite() {
            return Err("rate_limit.refill_per_sec must be a positive number".to_string());
        }
        Ok(())
    }
}

/// Idempotency cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// Retention window for cached responses, in hours
    #[serde(default = "default_idempotency_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_idempotency_ttl_hours(),
        }
    }
}

impl IdempotencyConfig {
    fn validate(&self) -> Result<(), String> {
        if self.ttl_hours == 0 {
            return Err("idempotency.ttl_hours must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable JSON file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_log_path")]
    pub local_path: String,

    /// Rotation policy: "daily" or "hourly"
    #[serde(default = "default_rotation")]
    pub local_rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_log_path(),
            local_rotation: default_rotation(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if !["daily", "hourly"].contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be 'daily' or 'hourly'",
                self.local_rotation
            ));
        }
        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path must not be empty when file logging is enabled"
                .to_string());
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8320".to_string()
}

fn default_chunk_size() -> usize {
    50_000
}

fn default_source_batch_size() -> usize {
    4_096
}

fn default_true() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_attempt_timeout_secs() -> u64 {
    300
}

fn default_job_timeout_secs() -> u64 {
    3_600
}

fn default_rate_capacity() -> u32 {
    10
}

fn default_refill_per_sec() -> f64 {
    1.0
}

fn default_idempotency_ttl_hours() -> u64 {
    24
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}
