//! # Google Sheets store gateway
//!
//! The spreadsheet is the system of record: listing URLs are read from one
//! column and results are written back into two others, addressed by row.
//!
//! ## Reads
//!
//! - `<sheet>!A2:A` bounds how many data rows exist
//! - `<sheet>!T2:T<n+1>` holds the listing URLs
//!
//! The API trims trailing empty cells and rows, so callers pad the URL
//! column back up to the probed row count.
//!
//! ## Writes
//!
//! All results go out in a single `values:batchUpdate` call with
//! `valueInputOption=USER_ENTERED`. `RAW` would store the `=IMAGE(...)`
//! formulas as inert text instead of rendering thumbnails.

pub mod auth;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::models::{
    BatchUpdateRequest, BatchUpdateResponse, CellUpdate, HEADER_ROWS, PendingWrite, ValueRange,
    quote_sheet_name,
};

use self::auth::{ServiceAccountKey, TokenProvider};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const USER_ENTERED: &str = "USER_ENTERED";

/// Which columns of the sheet play which role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub sheet_name: String,
    pub row_count_column: String,
    pub url_column: String,
    pub bid_column: String,
    pub image_column: String,
}

impl SheetLayout {
    /// Open-ended data range of `column`, e.g. `InHunt!A2:A`.
    pub fn data_range(&self, column: &str) -> String {
        let first = HEADER_ROWS + 1;
        format!("{}!{column}{first}:{column}", quote_sheet_name(&self.sheet_name))
    }

    /// Data range of `column` covering exactly `rows` rows, e.g. `InHunt!T2:T9`.
    pub fn bounded_range(&self, column: &str, rows: usize) -> String {
        let first = HEADER_ROWS + 1;
        let last = u32::try_from(rows)
            .unwrap_or(u32::MAX)
            .saturating_add(HEADER_ROWS);
        format!(
            "{}!{column}{first}:{column}{last}",
            quote_sheet_name(&self.sheet_name)
        )
    }
}

/// Read/write access to the tabular store
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// First column of every row in `range`; blank cells are `None`.
    async fn read_column(&self, range: &str) -> Result<Vec<Option<String>>>;

    /// Apply every write in one call; returns the number of cells updated.
    async fn write_cells(&self, sheet: &str, writes: &[PendingWrite]) -> Result<usize>;
}

/// Build the `values:batchUpdate` body for `writes`.
pub fn batch_update_request(sheet: &str, writes: &[PendingWrite]) -> BatchUpdateRequest {
    BatchUpdateRequest {
        value_input_option: USER_ENTERED,
        data: writes
            .iter()
            .map(|write| CellUpdate {
                range: write.a1_cell(sheet),
                values: vec![vec![write.value.clone()]],
            })
            .collect(),
    }
}

/// Sheets v4 REST client authenticated as a service account
pub struct SheetsClient {
    client: Client,
    tokens: TokenProvider,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(credentials: &ServiceAccountKey, spreadsheet_id: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        let tokens = TokenProvider::new(client.clone(), credentials.clone())?;

        Ok(Self {
            client,
            tokens,
            spreadsheet_id: spreadsheet_id.to_string(),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{SHEETS_API}/{}/values/{}",
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    fn batch_update_url(&self) -> String {
        format!("{SHEETS_API}/{}/values:batchUpdate", self.spreadsheet_id)
    }
}

#[async_trait]
impl StoreGateway for SheetsClient {
    async fn read_column(&self, range: &str) -> Result<Vec<Option<String>>> {
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .get(self.values_url(range))
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to read {range}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to read {range}: {status} {body}"));
        }

        let values: ValueRange = response.json().await?;
        Ok(values.first_column())
    }

    async fn write_cells(&self, sheet: &str, writes: &[PendingWrite]) -> Result<usize> {
        let token = self.tokens.access_token().await?;
        let request = batch_update_request(sheet, writes);

        let response = self
            .client
            .post(self.batch_update_url())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .context("Failed to send batch update")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Batch update rejected: {status} {body}"));
        }

        let result: BatchUpdateResponse = response.json().await?;
        info!(
            "Sheet updated: {} ranges, {} cells",
            request.data.len(),
            result.total_updated_cells
        );
        Ok(result.total_updated_cells)
    }
}
