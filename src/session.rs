//! One listing visit, from opening a tab to closing it
//!
//! A visit walks `Navigating → Scrolling → WaitingForBid → Extracting →
//! CapturingDiagnostics → Closed`, where scrolling and diagnostics are
//! optional. Whatever goes wrong is folded into the row's
//! [`ExtractionResult`]; nothing escapes to sibling rows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::diagnostics::DiagnosticsSink;
use crate::error::RowFailure;
use crate::extraction::{ExtractionStrategy, ProbeResult};
use crate::models::{ExtractionResult, Listing, ListingRow, RowOutcome, RowRef};
use crate::traits::{Browser, PageHandle};

/// Lazy-load scrolling knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollSettings {
    pub step_px: u32,
    pub max_steps: u32,
    pub pause: Duration,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            step_px: 800,
            max_steps: 20,
            pause: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub navigation_timeout: Duration,
    /// `None` disables scroll-to-load
    pub scroll: Option<ScrollSettings>,
}

/// Owns a page until it is closed.
///
/// `close` is the normal path. If the visit is dropped before that (the
/// task was cancelled or panicked) the close is spawned onto the runtime.
struct PageGuard {
    page: Option<Box<dyn PageHandle>>,
    row: RowRef,
}

impl PageGuard {
    fn new(page: Box<dyn PageHandle>, row: RowRef) -> Self {
        Self {
            page: Some(page),
            row,
        }
    }

    fn page(&self) -> &dyn PageHandle {
        self.page
            .as_deref()
            .expect("PageGuard: page already closed")
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take()
            && let Err(e) = page.close().await
        {
            warn!(row = self.row.get(), "Failed to close page: {:#}", e);
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        debug!(row = self.row.get(), "Page dropped without close, closing in background");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}

/// Everything a visit needs, shared by every row of a run
#[derive(Clone)]
pub struct PageSession {
    browser: Arc<dyn Browser>,
    strategy: Arc<ExtractionStrategy>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    settings: SessionSettings,
}

impl PageSession {
    pub fn new(
        browser: Arc<dyn Browser>,
        strategy: Arc<ExtractionStrategy>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            browser,
            strategy,
            diagnostics,
            settings,
        }
    }

    /// Visit one row. Blank rows are skipped without opening a page.
    pub async fn visit(&self, row: ListingRow) -> RowOutcome {
        let started = Instant::now();

        let result = match row.listing_url() {
            None => ExtractionResult::Skipped,
            Some(url) => match self.extract(row.row, url).await {
                Ok(listing) => ExtractionResult::Success(listing),
                Err(failure) => ExtractionResult::Failed {
                    reason: failure.to_string(),
                },
            },
        };

        debug!(row = row.row.get(), result = result.label(), "Visit finished");
        RowOutcome {
            row: row.row,
            url: row.url,
            result,
            elapsed: started.elapsed(),
        }
    }

    async fn extract(&self, row: RowRef, url: &str) -> Result<Listing, RowFailure> {
        let page = self
            .browser
            .open_page()
            .await
            .map_err(|e| RowFailure::PageUnavailable(format!("{e:#}")))?;

        let guard = PageGuard::new(page, row);
        let result = self.drive(row, url, guard.page()).await;
        guard.close().await;
        result
    }

    async fn drive(
        &self,
        row: RowRef,
        url: &str,
        page: &dyn PageHandle,
    ) -> Result<Listing, RowFailure> {
        debug!(row = row.get(), url, "Navigating");
        match timeout(self.settings.navigation_timeout, page.goto(url)).await {
            Err(_) => {
                return Err(RowFailure::NavigationTimeout {
                    url: url.to_string(),
                    timeout: self.settings.navigation_timeout,
                });
            }
            Ok(Err(e)) => {
                return Err(RowFailure::Navigation {
                    url: url.to_string(),
                    reason: format!("{e:#}"),
                });
            }
            Ok(Ok(())) => {}
        }

        if let Some(scroll) = &self.settings.scroll {
            scroll_to_bottom(row, page, scroll).await;
        }

        let bid_text = self.strategy.wait_for_bid(page).await?;
        let images = self.strategy.probe_images(page).await;

        if images.result == ProbeResult::NotFound {
            debug!(row = row.get(), "No image found, capturing diagnostics");
            if let Err(e) = self.diagnostics.capture(row, url, page).await {
                warn!(row = row.get(), "Diagnostics capture failed: {:#}", e);
            }
        } else {
            debug!(
                row = row.get(),
                images = images.count(),
                source = ?images.source,
                "Images found"
            );
        }

        Ok(Listing {
            bid_text,
            image_url: images.image_url(),
        })
    }
}

/// Scroll until the viewport reaches the end of the document or the step
/// budget runs out. Best effort: errors stop scrolling and nothing more.
async fn scroll_to_bottom(row: RowRef, page: &dyn PageHandle, settings: &ScrollSettings) {
    for step in 0..settings.max_steps {
        match page.scroll_by(settings.step_px).await {
            Ok(position) if position.at_bottom() => {
                debug!(row = row.get(), steps = step + 1, "Reached end of page");
                return;
            }
            Ok(_) => sleep(settings.pause).await,
            Err(e) => {
                warn!(row = row.get(), "Scrolling failed: {:#}", e);
                return;
            }
        }
    }
    debug!(row = row.get(), steps = settings.max_steps, "Scroll budget exhausted");
}
