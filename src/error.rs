//! Per-row failure taxonomy
//!
//! Everything in here is caught at the page session boundary and turned into
//! an [`ExtractionResult::Failed`](crate::models::ExtractionResult) for the row.
//! Run-level failures (config, auth, the sheet read and the final write) stay
//! `anyhow::Error`.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowFailure {
    #[error("could not open a browser page: {0}")]
    PageUnavailable(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("navigation to {url} did not finish within {}ms", timeout.as_millis())]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("'{selector}' did not appear within {}ms", timeout.as_millis())]
    ExtractionTimeout { selector: String, timeout: Duration },

    #[error("evaluating '{selector}' failed: {reason}")]
    Extraction { selector: String, reason: String },

    #[error("page task aborted: {0}")]
    TaskAborted(String),
}

impl RowFailure {
    pub fn extraction(selector: &str, err: impl std::fmt::Display) -> Self {
        Self::Extraction {
            selector: selector.to_string(),
            reason: err.to_string(),
        }
    }
}
