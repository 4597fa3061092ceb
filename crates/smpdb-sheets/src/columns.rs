//! Header discovery and result-cell protocol for tracked sheets.
//!
//! Sheets are operator-maintained, so column headers drift. Every logical
//! column is located by case-insensitive alias matching against row 1; the
//! results column is created when absent.

use crate::error::SheetsError;

/// Header label written when the results column is auto-created.
pub const RESULTS_HEADER: &str = "Collected";

/// Reserved result-cell sentinel: collection is in flight for this row.
pub const COLLECTING_SENTINEL: &str = "collecting";

/// Reserved result-cell sentinel: this row is permanently uncollectable.
pub const UNCOLLECTABLE_SENTINEL: &str = "uncollectable";

/// Widest header the adapter will scan or extend (columns A..Z).
pub const MAX_COLUMNS: usize = 26;

const IDENTIFIER_ALIASES: &[&str] = &["username", "handle", "account", "identifier", "profile"];
const PLATFORM_ALIASES: &[&str] = &["platform", "network", "channel"];
const PROFILE_URL_ALIASES: &[&str] = &["profile url", "profile link", "url", "link"];
const FOLLOWERS_ALIASES: &[&str] = &["followers", "follower count"];
const MODE_ALIASES: &[&str] = &["mode", "source mode", "collection mode"];
const QUERY_ALIASES: &[&str] = &["query", "source query", "search"];
const RESULTS_ALIASES: &[&str] = &["collected", "results", "collected posts", "progress"];

/// Zero-based indices of the logical columns found in a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub identifier: usize,
    pub platform: usize,
    pub profile_url: Option<usize>,
    pub followers: Option<usize>,
    pub mode: Option<usize>,
    pub query: Option<usize>,
    pub results: ResultsColumn,
}

/// Where the results column lives, or where it must be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsColumn {
    Existing(usize),
    /// No alias matched; create at this index (first blank header slot, or
    /// one past the current header).
    Create(usize),
}

impl ResultsColumn {
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            ResultsColumn::Existing(i) | ResultsColumn::Create(i) => i,
        }
    }
}

fn find_alias(header: &[String], aliases: &[&str]) -> Option<usize> {
    header.iter().position(|cell| {
        let normalized = cell.trim().to_lowercase();
        aliases.contains(&normalized.as_str())
    })
}

/// Locates the logical columns in a header row.
///
/// The results column is never allowed to overwrite a populated header:
/// when no alias matches, the first blank slot inside the header wins, then
/// the column just past it, up to [`MAX_COLUMNS`].
///
/// # Errors
///
/// - [`SheetsError::MissingColumn`] — no identifier or no platform column.
/// - [`SheetsError::SheetFull`] — no alias match and no room to create one.
pub fn discover_columns(header: &[String]) -> Result<ColumnMap, SheetsError> {
    let identifier = find_alias(header, IDENTIFIER_ALIASES)
        .ok_or(SheetsError::MissingColumn { column: "identifier" })?;
    let platform = find_alias(header, PLATFORM_ALIASES)
        .ok_or(SheetsError::MissingColumn { column: "platform" })?;

    let results = match find_alias(header, RESULTS_ALIASES) {
        Some(index) => ResultsColumn::Existing(index),
        None => {
            let blank = header.iter().position(|cell| cell.trim().is_empty());
            let index = blank.unwrap_or(header.len());
            if index >= MAX_COLUMNS {
                return Err(SheetsError::SheetFull {
                    max_columns: MAX_COLUMNS,
                });
            }
            ResultsColumn::Create(index)
        }
    };

    Ok(ColumnMap {
        identifier,
        platform,
        profile_url: find_alias(header, PROFILE_URL_ALIASES),
        followers: find_alias(header, FOLLOWERS_ALIASES),
        mode: find_alias(header, MODE_ALIASES),
        query: find_alias(header, QUERY_ALIASES),
        results,
    })
}

/// Parsed state of one results-column cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    NotStarted,
    Collected(u32),
    Collecting,
    Uncollectable,
}

/// Parses a results cell per the protocol: empty = not started, positive
/// integer = collected count, reserved sentinels for in-flight/permanent
/// failure. Anything else counts as not started.
#[must_use]
pub fn parse_result_cell(cell: &str) -> CellState {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return CellState::NotStarted;
    }
    if trimmed.eq_ignore_ascii_case(COLLECTING_SENTINEL) {
        return CellState::Collecting;
    }
    if trimmed.eq_ignore_ascii_case(UNCOLLECTABLE_SENTINEL) {
        return CellState::Uncollectable;
    }
    match trimmed.parse::<u32>() {
        Ok(count) if count > 0 => CellState::Collected(count),
        Ok(_) => CellState::NotStarted,
        Err(_) => {
            tracing::warn!(cell = trimmed, "unrecognized results cell; treating as not started");
            CellState::NotStarted
        }
    }
}

/// A1 column letter for a zero-based index (0 → "A", 25 → "Z").
///
/// Only single-letter columns are supported; the adapter never scans past
/// [`MAX_COLUMNS`].
#[must_use]
pub fn column_letter(index: usize) -> String {
    debug_assert!(index < MAX_COLUMNS);
    let letter = b'A' + u8::try_from(index % MAX_COLUMNS).unwrap_or(0);
    (letter as char).to_string()
}
