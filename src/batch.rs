//! Bounded fan-out of page visits in fixed-size groups
//!
//! Each group runs fully concurrently and must settle before the next one
//! starts, so at most `batch_size` tabs are ever open at once.

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::RowFailure;
use crate::models::{ExtractionResult, ListingRow, RowOutcome};
use crate::session::PageSession;

#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Contiguous groups in the order they will run.
    pub fn groups<'a>(&self, rows: &'a [ListingRow]) -> impl Iterator<Item = &'a [ListingRow]> {
        rows.chunks(self.batch_size)
    }

    /// Visit every row, returning one outcome per row in input order.
    pub async fn run(&self, session: &PageSession, rows: &[ListingRow]) -> Vec<RowOutcome> {
        let mut outcomes = Vec::with_capacity(rows.len());
        let total_groups = rows.len().div_ceil(self.batch_size);

        for (index, group) in self.groups(rows).enumerate() {
            info!(
                "Processing batch {}/{} ({} rows)",
                index + 1,
                total_groups,
                group.len()
            );

            let tasks = group.iter().cloned().map(|row| {
                let session = session.clone();
                tokio::spawn(async move { session.visit(row).await })
            });
            let settled = join_all(tasks).await;

            for (row, joined) in group.iter().zip(settled) {
                let outcome = joined.unwrap_or_else(|e| RowOutcome {
                    row: row.row,
                    url: row.url.clone(),
                    result: ExtractionResult::Failed {
                        reason: RowFailure::TaskAborted(e.to_string()).to_string(),
                    },
                    elapsed: Default::default(),
                });
                log_outcome(&outcome);
                outcomes.push(outcome);
            }
        }

        outcomes
    }
}

fn log_outcome(outcome: &RowOutcome) {
    let row = outcome.row.get();
    let url = outcome.url.as_deref().unwrap_or_default().trim();
    let elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX);

    match &outcome.result {
        ExtractionResult::Success(listing) => info!(
            row,
            url,
            elapsed_ms,
            bid = %listing.bid_text,
            image = listing.image_url.as_deref().unwrap_or("none"),
            "Row scraped"
        ),
        ExtractionResult::Skipped => info!(row, "Row skipped: empty URL"),
        ExtractionResult::Failed { reason } => {
            warn!(row, url, elapsed_ms, reason = %reason, "Row failed")
        }
    }
}
