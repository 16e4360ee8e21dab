//! Row models and the stable sort ordering
//!
//! A [`SourceRow`] is what the row source yields for a job's filter window.
//! After normalization it becomes a [`NormalizedRow`], whose ordering is the
//! fixed composite key the exporter sorts by: year code, center code, group
//! code, school code (with a sentinel for rows that have none), and finally
//! the candidate id as a unique tie-break. The ordering is total: two
//! distinct rows can never compare equal because candidate ids are unique
//! within a window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sentinel substituted for an absent school code in the sort key.
///
/// Sorts after every real school code, so center-wide rows trail
/// school-scoped rows within a group.
pub const SCHOOL_CODE_SENTINEL: &str = "ZZZZ";

/// Human-readable description of the sort key, recorded in every manifest.
pub const SORT_KEY_DESCRIPTION: &str =
    "year_code, center_code, group_code, school_code (absent sorts as ZZZZ), candidate_id";

/// A raw row as produced by the row source
///
/// Field values are untrusted: they may carry non-ASCII digits, zero-width
/// characters, or spreadsheet formula prefixes, and are normalized before
/// they reach any writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    /// Examination year code, e.g. "2026"
    pub year_code: String,
    /// Examination center code
    pub center_code: String,
    /// Candidate group code within the center
    pub group_code: String,
    /// School code, absent for center-wide candidates
    pub school_code: Option<String>,
    /// Unique candidate identifier (sort tie-break)
    pub candidate_id: String,
    /// Candidate full name
    pub candidate_name: String,
    /// National identity number (sensitive, may carry leading zeros)
    pub national_id: String,
    /// Allocated seat number, if seating has run
    pub seat_number: Option<u32>,
    /// Examination date, if scheduled
    pub exam_date: Option<NaiveDate>,
}

/// A row after normalization, ready for the writers
///
/// Invariant: every text field has been through NFKC normalization, digit
/// folding, and control-character stripping before this type is constructed.
/// Only the normalization module builds these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub year_code: String,
    pub center_code: String,
    pub group_code: String,
    pub school_code: Option<String>,
    pub candidate_id: String,
    pub candidate_name: String,
    pub national_id: String,
    pub seat_number: Option<u32>,
    pub exam_date: Option<NaiveDate>,
}

impl NormalizedRow {
    /// The composite sort key as a comparable tuple of borrowed fields
    ///
    /// School code falls back to [`SCHOOL_CODE_SENTINEL`] when absent.
    pub fn sort_key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.year_code,
            &self.center_code,
            &self.group_code,
            self.school_code.as_deref().unwrap_or(SCHOOL_CODE_SENTINEL),
            &self.candidate_id,
        )
    }
}

impl Eq for NormalizedRow {}

impl Ord for NormalizedRow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for NormalizedRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A typed cell value handed to the chunk writers
///
/// Numeric and date-like values stay typed so the spreadsheet writer can
/// emit real number/date cells instead of re-stringified text.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Date(NaiveDate),
    Empty,
}

/// Static description of one output column
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Column header name
    pub name: &'static str,
    /// Whether the column is sensitive by default (always quoted, never
    /// auto-formatted)
    pub sensitive: bool,
}

/// The fixed output column layout, in serialization order
pub const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "year_code", sensitive: false },
    ColumnSpec { name: "center_code", sensitive: false },
    ColumnSpec { name: "group_code", sensitive: false },
    ColumnSpec { name: "school_code", sensitive: false },
    ColumnSpec { name: "candidate_id", sensitive: false },
    ColumnSpec { name: "candidate_name", sensitive: true },
    ColumnSpec { name: "national_id", sensitive: true },
    ColumnSpec { name: "seat_number", sensitive: false },
    ColumnSpec { name: "exam_date", sensitive: false },
];

impl NormalizedRow {
    /// Cell values in [`COLUMNS`] order
    pub fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(self.year_code.clone()),
            CellValue::Text(self.center_code.clone()),
            CellValue::Text(self.group_code.clone()),
            match &self.school_code {
                Some(code) => CellValue::Text(code.clone()),
                None => CellValue::Empty,
            },
            CellValue::Text(self.candidate_id.clone()),
            CellValue::Text(self.candidate_name.clone()),
            CellValue::Text(self.national_id.clone()),
            match self.seat_number {
                Some(seat) => CellValue::Integer(i64::from(seat)),
                None => CellValue::Empty,
            },
            match self.exam_date {
                Some(date) => CellValue::Date(date),
                None => CellValue::Empty,
            },
        ]
    }
}
