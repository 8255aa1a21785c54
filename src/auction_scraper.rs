use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::aggregator::{OutputSpec, aggregate};
use crate::batch::BatchScheduler;
use crate::browsers;
use crate::config::Config;
use crate::diagnostics::{DiagnosticsSink, FileDiagnostics, NoopDiagnostics};
use crate::extraction::ExtractionStrategy;
use crate::models::{ExtractionResult, ListingRow, RowOutcome, RowRef, RunSummary};
use crate::session::{PageSession, SessionSettings};
use crate::sheets::{SheetLayout, SheetsClient, StoreGateway};
use crate::traits::{BrowserLauncher, SiteSelectors};

#[derive(Clone)]
pub struct AuctionScraper {
    store: Arc<dyn StoreGateway>,
    launcher: Arc<dyn BrowserLauncher>,
    strategy: Arc<ExtractionStrategy>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    layout: SheetLayout,
    output: OutputSpec,
    session: SessionSettings,
    scheduler: BatchScheduler,
    run_lock: Arc<Mutex<()>>,
}

impl AuctionScraper {
    pub fn new(config: &Config) -> Result<Self> {
        let store = SheetsClient::new(&config.credentials, &config.spreadsheet_id)?;
        let launcher = browsers::launcher(config)?;
        let selectors = SiteSelectors::default();

        let diagnostics: Arc<dyn DiagnosticsSink> = match &config.diagnostics_dir {
            Some(dir) => {
                let sink = FileDiagnostics::new(dir, selectors.gallery_container.clone());
                info!("Diagnostics will be written to {}", sink.dir().display());
                Arc::new(sink)
            }
            None => Arc::new(NoopDiagnostics),
        };

        Ok(Self::with_parts(
            Arc::new(store),
            launcher,
            diagnostics,
            ExtractionStrategy::new(selectors, config.bid_timeout),
            config,
        ))
    }

    pub fn with_parts(
        store: Arc<dyn StoreGateway>,
        launcher: Arc<dyn BrowserLauncher>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        strategy: ExtractionStrategy,
        config: &Config,
    ) -> Self {
        Self {
            store,
            launcher,
            strategy: Arc::new(strategy),
            diagnostics,
            layout: config.layout.clone(),
            output: OutputSpec {
                bid_column: config.layout.bid_column.clone(),
                image_column: config.layout.image_column.clone(),
                thumbnail: config.thumbnail,
                no_image: config.no_image_policy.clone(),
            },
            session: config.session.clone(),
            scheduler: BatchScheduler::new(config.batch_size),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run unless a previous run is still going; `None` means skipped.
    pub async fn run_if_idle(&self) -> Result<Option<RunSummary>> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("Previous run still in progress, skipping this one");
            return Ok(None);
        };
        self.run_once().await.map(Some)
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let rows = self.read_rows().await?;

        info!(
            "Found {} rows, scraping in batches of {} with {} backend",
            rows.len(),
            self.scheduler.batch_size(),
            self.launcher.name()
        );

        let outcomes = if rows.iter().any(|row| row.listing_url().is_some()) {
            let browser = self.launcher.launch().await?;
            let session = PageSession::new(
                browser.clone(),
                self.strategy.clone(),
                self.diagnostics.clone(),
                self.session.clone(),
            );

            let outcomes = self.scheduler.run(&session, &rows).await;

            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {:#}", e);
            }
            outcomes
        } else {
            rows.iter()
                .map(|row| RowOutcome {
                    row: row.row,
                    url: row.url.clone(),
                    result: ExtractionResult::Skipped,
                    elapsed: Duration::ZERO,
                })
                .collect()
        };

        let writes = aggregate(&outcomes, &self.output);
        let mut summary = RunSummary::from_outcomes(&outcomes);

        if writes.is_empty() {
            info!("No updates to apply");
        } else {
            summary.cells_written = self
                .store
                .write_cells(&self.layout.sheet_name, &writes)
                .await
                .context("Failed to write results to the sheet")?;
        }

        summary.elapsed = started.elapsed();
        info!(
            rows = summary.rows_seen,
            attempted = summary.attempted(),
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            failed = summary.failed,
            images = summary.images_found,
            written = summary.cells_written,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Run finished"
        );

        Ok(summary)
    }

    async fn read_rows(&self) -> Result<Vec<ListingRow>> {
        let probe_range = self.layout.data_range(&self.layout.row_count_column);
        let row_count = self
            .store
            .read_column(&probe_range)
            .await
            .with_context(|| format!("Failed to read {probe_range}"))?
            .len();

        if row_count == 0 {
            return Ok(Vec::new());
        }

        let url_range = self.layout.bounded_range(&self.layout.url_column, row_count);
        let mut urls = self
            .store
            .read_column(&url_range)
            .await
            .with_context(|| format!("Failed to read {url_range}"))?;
        urls.resize(row_count, None);

        Ok(urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| ListingRow {
                row: RowRef::from_position(index),
                url,
            })
            .collect())
    }
}
