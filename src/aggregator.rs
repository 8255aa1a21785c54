//! Turns per-row outcomes into the cell writes for the final bulk update

use std::str::FromStr;

use anyhow::bail;

use crate::extraction::{ThumbnailSize, image_formula};
use crate::models::{ExtractionResult, PendingWrite, RowOutcome};

/// What goes into the image column when a listing had no image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoImagePolicy {
    /// Write an empty string, clearing any thumbnail left by an earlier run
    Blank,
    /// Leave the cell untouched
    Omit,
    /// Write a fixed marker such as `NO IMAGE FOUND`
    Sentinel(String),
}

impl FromStr for NoImagePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(text) = s.strip_prefix("sentinel:") {
            return Ok(Self::Sentinel(text.to_string()));
        }
        match s.to_ascii_lowercase().as_str() {
            "blank" | "empty" => Ok(Self::Blank),
            "omit" | "skip" => Ok(Self::Omit),
            other => bail!("unknown policy '{other}' (expected blank, omit or sentinel:<TEXT>)"),
        }
    }
}

/// Target columns and formatting for result writes
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub bid_column: String,
    pub image_column: String,
    pub thumbnail: ThumbnailSize,
    pub no_image: NoImagePolicy,
}

/// Build the pending writes for every successful row.
pub fn aggregate(outcomes: &[RowOutcome], output: &OutputSpec) -> Vec<PendingWrite> {
    let mut writes = Vec::with_capacity(outcomes.len() * 2);

    for outcome in outcomes {
        let ExtractionResult::Success(listing) = &outcome.result else {
            continue;
        };

        writes.push(PendingWrite {
            column: output.bid_column.clone(),
            row: outcome.row,
            value: listing.bid_text.clone(),
        });

        let image_value = match (&listing.image_url, &output.no_image) {
            (Some(url), _) => Some(image_formula(url, output.thumbnail)),
            (None, NoImagePolicy::Blank) => Some(String::new()),
            (None, NoImagePolicy::Sentinel(text)) => Some(text.clone()),
            (None, NoImagePolicy::Omit) => None,
        };

        if let Some(value) = image_value {
            writes.push(PendingWrite {
                column: output.image_column.clone(),
                row: outcome.row,
                value,
            });
        }
    }

    writes
}
