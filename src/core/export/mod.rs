//! Export engine
//!
//! This module provides the streaming export pipeline:
//! - Sorted-run spilling and k-way merge ([`spill`])
//! - Format writers behind one interface ([`writer`], [`csv_writer`],
//!   [`xlsx_writer`])
//! - Atomic temp-then-rename finalization ([`atomic`])
//! - Artifact checksums ([`checksum`])
//! - The service tying them together ([`service`])

pub mod atomic;
pub mod checksum;
pub mod csv_writer;
pub mod service;
pub mod spill;
pub mod writer;
pub mod xlsx_writer;

pub use service::{ExportOutcome, ExportProgress, ExporterService};
pub use writer::{ChunkWriter, FinishedFile};
