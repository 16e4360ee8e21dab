//! Row and cell text normalization
//!
//! Every text field passes through here before it can reach a writer:
//! Unicode NFKC normalization, folding of non-Latin digit variants to ASCII,
//! stripping of zero-width and control characters, and unification of
//! visually-ambiguous letter variants. The formula-injection guard lives
//! here too, applied by the writers at serialization time.

use crate::config::MalformedRowPolicy;
use crate::domain::{CaravanError, NormalizedRow, Result, SourceRow};
use unicode_normalization::UnicodeNormalization;

/// Neutral escape character prefixed to formula-looking cell values
pub const FORMULA_ESCAPE: char = '\'';

/// Zero-width characters stripped from every field
const ZERO_WIDTH: [char; 5] = [
    '\u{200B}', // zero width space
    '\u{200C}', // zero width non-joiner
    '\u{200D}', // zero width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // zero width no-break space
];

/// Folds a visually-ambiguous letter to its Latin counterpart
///
/// Covers the Cyrillic and Greek homoglyphs that show up in hand-keyed
/// records. Anything not in the table passes through unchanged.
fn fold_confusable(c: char) -> char {
    match c {
        // Cyrillic capitals
        '\u{0410}' => 'A',
        '\u{0412}' => 'B',
        '\u{0415}' => 'E',
        '\u{041A}' => 'K',
        '\u{041C}' => 'M',
        '\u{041D}' => 'H',
        '\u{041E}' => 'O',
        '\u{0420}' => 'P',
        '\u{0421}' => 'C',
        '\u{0422}' => 'T',
        '\u{0425}' => 'X',
        // Cyrillic small letters
        '\u{0430}' => 'a',
        '\u{0435}' => 'e',
        '\u{043E}' => 'o',
        '\u{0440}' => 'p',
        '\u{0441}' => 'c',
        '\u{0443}' => 'y',
        '\u{0445}' => 'x',
        // Greek capitals
        '\u{0391}' => 'A',
        '\u{0392}' => 'B',
        '\u{0395}' => 'E',
        '\u{0397}' => 'H',
        '\u{0399}' => 'I',
        '\u{039A}' => 'K',
        '\u{039C}' => 'M',
        '\u{039D}' => 'N',
        '\u{039F}' => 'O',
        '\u{03A1}' => 'P',
        '\u{03A4}' => 'T',
        '\u{03A7}' => 'X',
        other => other,
    }
}

/// Normalizes one text field
///
/// Applies NFKC, folds any Unicode decimal digit to its ASCII value, strips
/// zero-width and control characters, folds confusable letters, and trims
/// surrounding whitespace.
///
/// # Examples
///
/// ```
/// use caravan::core::normalize::normalize_text;
///
/// // Arabic-Indic digits fold to ASCII
/// assert_eq!(normalize_text("\u{0661}\u{0662}\u{0663}"), "123");
/// // Zero-width characters are stripped
/// assert_eq!(normalize_text("A\u{200B}B"), "AB");
/// ```
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.nfkc() {
        if ZERO_WIDTH.contains(&c) || (c.is_control() && c != '\t') {
            continue;
        }
        if c == '\t' {
            out.push(' ');
            continue;
        }
        if let Some(digit) = c.to_digit(10) {
            out.push(char::from(b'0' + digit as u8));
            continue;
        }
        out.push(fold_confusable(c));
    }
    out.trim().to_string()
}

/// Applies the formula-injection guard to an already-normalized value
///
/// A value beginning with `=`, `+`, `-` or `@` is prefixed with
/// [`FORMULA_ESCAPE`] so spreadsheet applications treat it as literal text.
/// Writers call this at serialization time for every text cell.
pub fn guard_formula(value: &str) -> String {
    match value.chars().next() {
        Some('=' | '+' | '-' | '@') => {
            let mut guarded = String::with_capacity(value.len() + 1);
            guarded.push(FORMULA_ESCAPE);
            guarded.push_str(value);
            guarded
        }
        _ => value.to_string(),
    }
}

/// Outcome of normalizing one source row under the configured policy
#[derive(Debug)]
pub enum RowOutcome {
    /// Row is clean and ready for the writers
    Row(Box<NormalizedRow>),
    /// Row was malformed and the policy says to skip and count it
    Skipped,
}

/// Normalizes a source row, validating required fields
///
/// A row is malformed when its year, center, group or candidate id is empty
/// after normalization. Under [`MalformedRowPolicy::Abort`] the first
/// malformed row fails the export with a detailed error; under
/// [`MalformedRowPolicy::Skip`] it is dropped and counted by the caller.
///
/// # Errors
///
/// Returns [`CaravanError::MalformedRow`] under the abort policy.
pub fn normalize_row(row: SourceRow, policy: MalformedRowPolicy) -> Result<RowOutcome> {
    let year_code = normalize_text(&row.year_code);
    let center_code = normalize_text(&row.center_code);
    let group_code = normalize_text(&row.group_code);
    let candidate_id = normalize_text(&row.candidate_id);
    let candidate_name = normalize_text(&row.candidate_name);
    let national_id = normalize_text(&row.national_id);
    // An all-whitespace school code means "no school", not a malformed row
    let school_code = row
        .school_code
        .as_deref()
        .map(normalize_text)
        .filter(|code| !code.is_empty());

    let missing = [
        ("year_code", &year_code),
        ("center_code", &center_code),
        ("group_code", &group_code),
        ("candidate_id", &candidate_id),
    ]
    .iter()
    .find(|(_, value)| value.is_empty())
    .map(|(name, _)| *name);

    if let Some(field) = missing {
        return match policy {
            MalformedRowPolicy::Abort => Err(CaravanError::MalformedRow {
                identifier: if candidate_id.is_empty() {
                    "<unknown>".to_string()
                } else {
                    candidate_id
                },
                reason: format!("{field} is empty after normalization"),
            }),
            MalformedRowPolicy::Skip => Ok(RowOutcome::Skipped),
        };
    }

    Ok(RowOutcome::Row(Box::new(NormalizedRow {
        year_code,
        center_code,
        group_code,
        school_code,
        candidate_id,
        candidate_name,
        national_id,
        seat_number: row.seat_number,
        exam_date: row.exam_date,
    })))
}
