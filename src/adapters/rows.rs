//! Row source abstraction
//!
//! The relational store that produces export rows is an external
//! collaborator. The pipeline consumes it through [`RowSource`], pulling
//! bounded batches so memory never depends on the window's total row
//! count. A fresh source is opened per export attempt, since a retry
//! re-reads the window from the start.

use crate::domain::{ExportFilter, Result, SourceRow};
use async_trait::async_trait;
use std::collections::VecDeque;

/// A stream of source rows for one job's filter window
#[async_trait]
pub trait RowSource: Send {
    /// Returns up to `max_rows` rows, or an empty batch when exhausted
    ///
    /// # Errors
    ///
    /// Returns a transient error for recoverable store failures; the job
    /// runner retries those.
    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<SourceRow>>;
}

/// Opens row sources for submitted jobs
#[async_trait]
pub trait RowSourceFactory: Send + Sync {
    /// Opens a fresh source for the given filter window
    async fn open(&self, filter: &ExportFilter) -> Result<Box<dyn RowSource>>;
}

/// In-memory row source, used by tests and demos
pub struct MemoryRowSource {
    rows: VecDeque<SourceRow>,
}

impl MemoryRowSource {
    /// Wraps a fixed set of rows
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows: rows.into() }
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<SourceRow>> {
        let take = max_rows.min(self.rows.len());
        Ok(self.rows.drain(..take).collect())
    }
}

/// Factory serving filtered copies of a fixed in-memory dataset
pub struct MemoryRowSourceFactory {
    rows: Vec<SourceRow>,
}

impl MemoryRowSourceFactory {
    /// Wraps the dataset every opened source filters from
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }
}

fn matches(filter: &ExportFilter, row: &SourceRow) -> bool {
    if row.year_code != filter.year_code {
        return false;
    }
    if let Some(centers) = &filter.center_codes {
        if !centers.contains(&row.center_code) {
            return false;
        }
    }
    if let Some(groups) = &filter.group_codes {
        if !groups.contains(&row.group_code) {
            return false;
        }
    }
    if let Some(schools) = &filter.school_codes {
        match &row.school_code {
            Some(code) if schools.contains(code) => {}
            _ => return false,
        }
    }
    true
}

#[async_trait]
impl RowSourceFactory for MemoryRowSourceFactory {
    async fn open(&self, filter: &ExportFilter) -> Result<Box<dyn RowSource>> {
        let rows: Vec<SourceRow> = self
            .rows
            .iter()
            .filter(|row| matches(filter, row))
            .cloned()
            .collect();
        Ok(Box::new(MemoryRowSource::new(rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(year: &str, center: &str, school: Option<&str>) -> SourceRow {
        SourceRow {
            year_code: year.to_string(),
            center_code: center.to_string(),
            group_code: "G1".to_string(),
            school_code: school.map(String::from),
            candidate_id: "K-1".to_string(),
            candidate_name: "N".to_string(),
            national_id: "001".to_string(),
            seat_number: None,
            exam_date: None,
        }
    }

    fn filter(year: &str) -> ExportFilter {
        ExportFilter {
            year_code: year.to_string(),
            center_codes: None,
            group_codes: None,
            school_codes: None,
        }
    }

    #[tokio::test]
    async fn test_memory_source_drains_in_batches() {
        let rows = (0..5).map(|_| row("2026", "C1", None)).collect();
        let mut source = MemoryRowSource::new(rows);

        assert_eq!(source.next_batch(2).await.unwrap().len(), 2);
        assert_eq!(source.next_batch(2).await.unwrap().len(), 2);
        assert_eq!(source.next_batch(2).await.unwrap().len(), 1);
        assert!(source.next_batch(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_factory_filters_by_year_and_center() {
        let factory = MemoryRowSourceFactory::new(vec![
            row("2026", "C1", None),
            row("2026", "C2", None),
            row("2025", "C1", None),
        ]);

        let mut all_2026 = factory.open(&filter("2026")).await.unwrap();
        assert_eq!(all_2026.next_batch(100).await.unwrap().len(), 2);

        let mut narrowed = filter("2026");
        narrowed.center_codes = Some(vec!["C2".to_string()]);
        let mut c2_only = factory.open(&narrowed).await.unwrap();
        let batch = c2_only.next_batch(100).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].center_code, "C2");
    }

    #[tokio::test]
    async fn test_school_filter_excludes_absent_school() {
        let factory = MemoryRowSourceFactory::new(vec![
            row("2026", "C1", Some("S1")),
            row("2026", "C1", None),
        ]);
        let mut narrowed = filter("2026");
        narrowed.school_codes = Some(vec!["S1".to_string()]);
        let mut source = factory.open(&narrowed).await.unwrap();
        assert_eq!(source.next_batch(100).await.unwrap().len(), 1);
    }
}
