//! Data models for listing rows, per-row outcomes and Sheets API payloads

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of header rows above the first data row in the sheet.
pub const HEADER_ROWS: u32 = 1;

/// 1-indexed sheet row a listing lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowRef(pub u32);

impl RowRef {
    /// Row reference for the `index`-th entry (0-based) of a data range.
    pub fn from_position(index: usize) -> Self {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        Self(index.saturating_add(HEADER_ROWS + 1))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of input: where it lives and the listing URL found there, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub row: RowRef,
    pub url: Option<String>,
}

impl ListingRow {
    /// The URL with surrounding whitespace removed, or `None` when blank.
    pub fn listing_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Data pulled off a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub bid_text: String,
    /// First gallery image, query string already stripped.
    pub image_url: Option<String>,
}

/// What happened to a single row during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Success(Listing),
    Skipped,
    Failed { reason: String },
}

impl ExtractionResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Skipped => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// An [`ExtractionResult`] tagged with the row it belongs to.
#[derive(Debug, Clone)]
pub struct RowOutcome {
    pub row: RowRef,
    pub url: Option<String>,
    pub result: ExtractionResult,
    pub elapsed: Duration,
}

/// A single cell update awaiting the bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingWrite {
    /// A1 column letters, e.g. `V` or `AC`.
    pub column: String,
    pub row: RowRef,
    pub value: String,
}

impl PendingWrite {
    /// A1 notation for the target cell, e.g. `InHunt!V5`.
    pub fn a1_cell(&self, sheet: &str) -> String {
        format!("{}!{}{}", quote_sheet_name(sheet), self.column, self.row)
    }
}

/// Sheet names containing anything but ASCII alphanumerics and `_` must be
/// single-quoted in A1 notation.
pub fn quote_sheet_name(sheet: &str) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// Counters reported at the end of every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_seen: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub images_found: usize,
    pub cells_written: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Tallies row outcomes; `cells_written` and `elapsed` are filled in by the caller.
    pub fn from_outcomes(outcomes: &[RowOutcome]) -> Self {
        let mut summary = Self {
            rows_seen: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            match &outcome.result {
                ExtractionResult::Success(listing) => {
                    summary.succeeded += 1;
                    if listing.image_url.is_some() {
                        summary.images_found += 1;
                    }
                }
                ExtractionResult::Skipped => summary.skipped += 1,
                ExtractionResult::Failed { .. } => summary.failed += 1,
            }
        }

        summary
    }

    pub fn attempted(&self) -> usize {
        self.rows_seen - self.skipped
    }
}

/// `ValueRange` resource returned by `spreadsheets.values.get`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    /// Trailing empty rows and cells are omitted by the API.
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl ValueRange {
    /// First cell of every row as text; empty rows become `None`.
    pub fn first_column(&self) -> Vec<Option<String>> {
        self.values
            .iter()
            .map(|row| row.first().and_then(cell_text))
            .collect()
    }
}

fn cell_text(cell: &serde_json::Value) -> Option<String> {
    match cell {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Outgoing range in a `values:batchUpdate` request
#[derive(Debug, Clone, Serialize)]
pub struct CellUpdate {
    pub range: String,
    pub values: Vec<Vec<String>>,
}

/// Body of `spreadsheets.values.batchUpdate`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateRequest {
    pub value_input_option: &'static str,
    pub data: Vec<CellUpdate>,
}

/// Subset of the `values:batchUpdate` response we report on
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    #[serde(default)]
    pub total_updated_cells: usize,
}
