//! Sorted-run spilling and k-way merge
//!
//! The exporter never holds more than one chunk of rows in memory. Incoming
//! rows accumulate to the chunk size, get sorted, and are spilled to a run
//! file in the spool directory as JSON lines. Once the source is exhausted
//! the runs are merged with a binary heap holding exactly one row per run,
//! yielding the full dataset in sort order with memory bounded by the chunk
//! size plus one row per run.

use crate::domain::{JobId, NormalizedRow, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::PathBuf;
use tempfile::TempDir;

/// Accumulates sorted runs on disk for one export job
pub struct SpillStore {
    dir: TempDir,
    runs: Vec<PathBuf>,
}

impl SpillStore {
    /// Creates a per-job spill directory under the configured spool dir
    ///
    /// The directory and every run file in it are removed on drop, so a
    /// failed attempt leaves no spill artifacts behind.
    pub fn create(spool_dir: &std::path::Path, job_id: &JobId) -> Result<Self> {
        std::fs::create_dir_all(spool_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job_id.as_str()))
            .tempdir_in(spool_dir)?;
        Ok(Self {
            dir,
            runs: Vec::new(),
        })
    }

    /// Sorts the buffered rows and writes them out as one run
    ///
    /// The buffer is drained and its capacity kept for the next run.
    pub fn spill_run(&mut self, rows: &mut Vec<NormalizedRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        rows.sort();

        let path = self.dir.path().join(format!("run-{:05}.jsonl", self.runs.len()));
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        for row in rows.iter() {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        self.runs.push(path);
        rows.clear();
        Ok(())
    }

    /// Number of runs spilled so far
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Consumes the store, producing the merged iterator over all runs
    pub fn into_merge(self) -> Result<RunMerge> {
        let mut readers = Vec::with_capacity(self.runs.len());
        for path in &self.runs {
            readers.push(BufReader::new(File::open(path)?).lines());
        }

        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (run, reader) in readers.iter_mut().enumerate() {
            if let Some(row) = next_row(reader)? {
                heap.push(Reverse(HeapItem { row, run }));
            }
        }

        Ok(RunMerge {
            _dir: self.dir,
            readers,
            heap,
        })
    }
}

/// Heap entry: the head row of one run
struct HeapItem {
    row: NormalizedRow,
    run: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.run.cmp(&other.run))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Streaming k-way merge over the spilled runs
///
/// Yields rows in the composite sort order. Holds one row per run plus the
/// read buffers; memory does not grow with total row count.
pub struct RunMerge {
    _dir: TempDir,
    readers: Vec<Lines<BufReader<File>>>,
    heap: BinaryHeap<Reverse<HeapItem>>,
}

fn next_row(reader: &mut Lines<BufReader<File>>) -> Result<Option<NormalizedRow>> {
    match reader.next() {
        None => Ok(None),
        Some(line) => {
            let line = line?;
            Ok(Some(serde_json::from_str(&line)?))
        }
    }
}

impl Iterator for RunMerge {
    type Item = Result<NormalizedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(item) = self.heap.pop()?;
        match next_row(&mut self.readers[item.run]) {
            Ok(Some(row)) => {
                self.heap.push(Reverse(HeapItem { row, run: item.run }));
            }
            Ok(None) => {}
            Err(e) => return Some(Err(e)),
        }
        Some(Ok(item.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(center: &str, candidate: &str) -> NormalizedRow {
        NormalizedRow {
            year_code: "2026".to_string(),
            center_code: center.to_string(),
            group_code: "G1".to_string(),
            school_code: Some("S1".to_string()),
            candidate_id: candidate.to_string(),
            candidate_name: "Test Candidate".to_string(),
            national_id: "001".to_string(),
            seat_number: None,
            exam_date: None,
        }
    }

    fn merge_all(merge: RunMerge) -> Vec<NormalizedRow> {
        merge.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_single_run_roundtrip() {
        let spool = tempfile::tempdir().unwrap();
        let mut store = SpillStore::create(spool.path(), &JobId::generate()).unwrap();

        let mut buffer = vec![row("C2", "B"), row("C1", "A")];
        store.spill_run(&mut buffer).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(store.run_count(), 1);

        let merged = merge_all(store.into_merge().unwrap());
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].center_code, "C1");
    }

    #[test]
    fn test_merge_across_runs_is_globally_sorted() {
        let spool = tempfile::tempdir().unwrap();
        let mut store = SpillStore::create(spool.path(), &JobId::generate()).unwrap();

        store
            .spill_run(&mut vec![row("C3", "X"), row("C1", "B")])
            .unwrap();
        store
            .spill_run(&mut vec![row("C2", "M"), row("C1", "A")])
            .unwrap();
        store
            .spill_run(&mut vec![row("C1", "C"), row("C4", "Z")])
            .unwrap();

        let merged = merge_all(store.into_merge().unwrap());
        let ids: Vec<&str> = merged.iter().map(|r| r.candidate_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "M", "X", "Z"]);
    }

    #[test]
    fn test_empty_store_yields_nothing() {
        let spool = tempfile::tempdir().unwrap();
        let store = SpillStore::create(spool.path(), &JobId::generate()).unwrap();
        let merged = merge_all(store.into_merge().unwrap());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_spill_dir_removed_on_drop() {
        let spool = tempfile::tempdir().unwrap();
        {
            let mut store = SpillStore::create(spool.path(), &JobId::generate()).unwrap();
            store.spill_run(&mut vec![row("C1", "A")]).unwrap();
        }
        assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 0);
    }
}
