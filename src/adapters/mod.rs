//! External integrations
//!
//! The pipeline's only upstream collaborator is the relational store that
//! produces rows; it sits behind the [`rows::RowSource`] trait so the
//! exporter never knows what is on the other side.

pub mod rows;

pub use rows::{MemoryRowSource, MemoryRowSourceFactory, RowSource, RowSourceFactory};
