//! Work-item reads and state-transition writes for tracked sheets.
//!
//! Work items are re-derived from the sheet on every read — the sheet is
//! the source of truth and rows are never cached across cycles. All writes
//! go through the results column; the sheet itself has no locking, so the
//! `collecting` sentinel written here is what keeps concurrent cycles from
//! re-selecting a row.

use smpdb_core::{normalize_identifier, Platform, WorkItem};

use crate::client::{a1_range, SheetsClient};
use crate::columns::{
    column_letter, discover_columns, parse_result_cell, CellState, ColumnMap, ResultsColumn,
    COLLECTING_SENTINEL, RESULTS_HEADER, UNCOLLECTABLE_SENTINEL,
};
use crate::error::SheetsError;

/// Header row lives at row 1; data starts at row 2.
const HEADER_CELLS: &str = "A1:Z1";
const DATA_CELLS: &str = "A2:Z";

/// Derives a handle from a profile URL: the last non-empty path segment,
/// minus any `@` prefix. Query strings and fragments are dropped.
fn identifier_from_profile_url(url: &str) -> Option<String> {
    let stripped = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let segment = stripped.rsplit('/').next()?;
    if segment.is_empty() || segment.contains('.') && !segment.contains('@') {
        // A bare domain ("instagram.com") is not a handle.
        return None;
    }
    let handle = normalize_identifier(segment);
    (!handle.is_empty()).then_some(handle)
}

/// Spreadsheet-backed work-item source.
pub struct SheetWorkItems {
    client: SheetsClient,
}

impl SheetWorkItems {
    #[must_use]
    pub fn new(client: SheetsClient) -> Self {
        Self { client }
    }

    async fn header(&self, source_id: &str, sheet_name: &str) -> Result<Vec<String>, SheetsError> {
        let rows = self
            .client
            .get_values(source_id, &a1_range(sheet_name, HEADER_CELLS))
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Discovers the column layout, creating the results column header on
    /// first contact with a sheet that lacks one.
    async fn columns(&self, source_id: &str, sheet_name: &str) -> Result<ColumnMap, SheetsError> {
        let header = self.header(source_id, sheet_name).await?;
        let map = discover_columns(&header)?;

        if let ResultsColumn::Create(index) = map.results {
            let cell = format!("{}1", column_letter(index));
            self.client
                .update_values(
                    source_id,
                    &a1_range(sheet_name, &cell),
                    vec![vec![RESULTS_HEADER.to_owned()]],
                )
                .await?;
            tracing::info!(
                source_id,
                sheet_name,
                column = %column_letter(index),
                "created results column"
            );
        }

        Ok(map)
    }

    /// Reads all work items from one sheet.
    ///
    /// Rows without a resolvable identifier or a recognized platform are
    /// skipped with a warning — an operator typo must not poison the cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError`] if the sheet cannot be read or the header
    /// row is missing required columns.
    pub async fn list_work_items(
        &self,
        source_id: &str,
        sheet_name: &str,
    ) -> Result<Vec<WorkItem>, SheetsError> {
        let map = self.columns(source_id, sheet_name).await?;
        let rows = self
            .client
            .get_values(source_id, &a1_range(sheet_name, DATA_CELLS))
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (offset, row) in rows.iter().enumerate() {
            let row_number = u32::try_from(offset).unwrap_or(u32::MAX).saturating_add(2);

            let cell = |index: Option<usize>| -> Option<String> {
                index
                    .and_then(|i| row.get(i))
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty())
            };

            let profile_url = cell(map.profile_url);

            let identifier = cell(Some(map.identifier))
                .map(|raw| normalize_identifier(&raw))
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    profile_url
                        .as_deref()
                        .and_then(identifier_from_profile_url)
                });
            let Some(identifier) = identifier else {
                tracing::warn!(source_id, sheet_name, row = row_number, "row has no identifier; skipping");
                continue;
            };

            let Some(platform) = cell(Some(map.platform)).and_then(|p| p.parse::<Platform>().ok())
            else {
                tracing::warn!(
                    source_id,
                    sheet_name,
                    row = row_number,
                    "row has no recognized platform; skipping"
                );
                continue;
            };

            let followers = cell(map.followers)
                .map(|s| s.replace(',', ""))
                .and_then(|s| s.parse::<i64>().ok());

            let state = cell(Some(map.results.index()))
                .map_or(CellState::NotStarted, |s| parse_result_cell(&s));
            let (collected_count, collecting, uncollectable) = match state {
                CellState::NotStarted => (0, false, false),
                CellState::Collected(count) => (count, false, false),
                CellState::Collecting => (0, true, false),
                CellState::Uncollectable => (0, false, true),
            };

            items.push(WorkItem {
                row: row_number,
                identifier,
                platform,
                profile_url,
                followers,
                collected_count,
                collecting,
                uncollectable,
            });
        }

        Ok(items)
    }

    /// Writes one value into the results column for each given row, as a
    /// single batch request.
    async fn write_results_cells(
        &self,
        source_id: &str,
        sheet_name: &str,
        cells: &[(u32, String)],
    ) -> Result<(), SheetsError> {
        if cells.is_empty() {
            return Ok(());
        }
        let map = self.columns(source_id, sheet_name).await?;
        let column = column_letter(map.results.index());

        let data: Vec<(String, Vec<Vec<String>>)> = cells
            .iter()
            .map(|(row, value)| {
                (
                    a1_range(sheet_name, &format!("{column}{row}")),
                    vec![vec![value.clone()]],
                )
            })
            .collect();

        self.client.batch_update(source_id, &data).await
    }

    /// Marks rows as in-flight. Idempotent: re-marking an already marked
    /// row rewrites the same sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError`] if the write fails.
    pub async fn mark_collecting(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> Result<(), SheetsError> {
        let cells: Vec<(u32, String)> = rows
            .iter()
            .map(|row| (*row, COLLECTING_SENTINEL.to_owned()))
            .collect();
        self.write_results_cells(source_id, sheet_name, &cells).await
    }

    /// Marks rows as permanently uncollectable.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError`] if the write fails.
    pub async fn mark_uncollectable(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> Result<(), SheetsError> {
        let cells: Vec<(u32, String)> = rows
            .iter()
            .map(|row| (*row, UNCOLLECTABLE_SENTINEL.to_owned()))
            .collect();
        self.write_results_cells(source_id, sheet_name, &cells).await
    }

    /// Clears rows back to not-started, making them eligible again on the
    /// next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError`] if the write fails.
    pub async fn clear_state(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> Result<(), SheetsError> {
        let cells: Vec<(u32, String)> = rows.iter().map(|row| (*row, String::new())).collect();
        self.write_results_cells(source_id, sheet_name, &cells).await
    }

    /// Records per-row collected counts.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError`] if the write fails.
    pub async fn record_collected_counts(
        &self,
        source_id: &str,
        sheet_name: &str,
        counts: &[(u32, u32)],
    ) -> Result<(), SheetsError> {
        let cells: Vec<(u32, String)> = counts
            .iter()
            .map(|(row, count)| (*row, count.to_string()))
            .collect();
        self.write_results_cells(source_id, sheet_name, &cells).await
    }
}
