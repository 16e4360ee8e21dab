// Caravan - Streaming Export Pipeline
// Copyright (c) 2026 Caravan Contributors
// Licensed under the MIT License

//! # Caravan - Streaming Export Pipeline
//!
//! Caravan turns a large relational dataset into Excel-safe export
//! artifacts (delimited text or multi-sheet spreadsheets) under strict
//! memory budgets, guarding its submission endpoint with rate limiting and
//! idempotency.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Accepting** export jobs over HTTP with rate-limit, idempotency and
//!   auth gates applied in order
//! - **Normalizing** rows (NFKC, digit folding, control stripping) with a
//!   formula-injection guard on every text cell
//! - **Sorting** deterministically with bounded memory via sorted-run
//!   spilling and a k-way merge
//! - **Writing** chunked CSV files or multi-sheet XLSX workbooks that are
//!   finalized atomically and described by a manifest written strictly last
//! - **Retrying** transient failures with deterministic, reproducible
//!   backoff delays
//!
//! ## Architecture
//!
//! Caravan follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`http`] - HTTP boundary (submission and status endpoints)
//! - [`gateway`] - Rate limiter and idempotency cache
//! - [`core`] - Pipeline logic (clock, normalize, export, retry, runner)
//! - [`adapters`] - The row-source seam to the relational store
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use caravan::adapters::rows::MemoryRowSourceFactory;
//! use caravan::config::CaravanConfig;
//! use caravan::core::clock::SystemClock;
//! use caravan::core::export::ExporterService;
//! use caravan::core::runner::{JobRunner, MemoryJobStore, TokioSleeper};
//! use caravan::domain::{ExportFilter, ExportFormat};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CaravanConfig::from_file("caravan.toml")?;
//!     let clock = Arc::new(SystemClock);
//!
//!     let runner = Arc::new(JobRunner::new(
//!         Arc::new(MemoryJobStore::new()),
//!         Arc::new(ExporterService::new(config.export.clone(), clock.clone())),
//!         Arc::new(MemoryRowSourceFactory::new(Vec::new())),
//!         &config.retry,
//!         clock,
//!         Arc::new(TokioSleeper),
//!     ));
//!
//!     let filter = ExportFilter {
//!         year_code: "2026".to_string(),
//!         center_codes: None,
//!         group_codes: None,
//!         school_codes: None,
//!     };
//!     let job_id = runner.submit(ExportFormat::Csv, filter, "req-1".into()).await?;
//!     println!("submitted {job_id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::CaravanError`]:
//!
//! ```rust
//! use caravan::domain::{CaravanError, Result};
//!
//! fn parse_format(s: &str) -> Result<caravan::domain::ExportFormat> {
//!     s.parse()
//! }
//! ```
//!
//! ## Logging
//!
//! Caravan uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!(job_id = "7d44b88c", "Starting export");
//! warn!(skipped = 3, "Dropping malformed rows under skip policy");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod gateway;
pub mod http;
pub mod logging;
