//! Offline diagnostics for listings where no image could be found
//!
//! The page session calls into a [`DiagnosticsSink`] and ignores whatever it
//! returns beyond logging it. Diagnostics never decide a row's outcome.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use scraper::{Html, Selector};
use tracing::debug;

use crate::models::RowRef;
use crate::traits::PageHandle;

const MAX_EXCERPT_BYTES: usize = 16 * 1024;

#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    /// Record what `page` looked like for `row`.
    async fn capture(&self, row: RowRef, url: &str, page: &dyn PageHandle) -> Result<()>;
}

/// Discards everything
pub struct NoopDiagnostics;

#[async_trait]
impl DiagnosticsSink for NoopDiagnostics {
    async fn capture(&self, _row: RowRef, _url: &str, _page: &dyn PageHandle) -> Result<()> {
        Ok(())
    }
}

/// Writes `row-<n>-<timestamp>.png` and `.html` files into a directory
pub struct FileDiagnostics {
    dir: PathBuf,
    excerpt_selector: String,
}

impl FileDiagnostics {
    pub fn new(dir: impl Into<PathBuf>, excerpt_selector: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            excerpt_selector: excerpt_selector.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_screenshot(&self, stem: &str, page: &dyn PageHandle) -> Result<()> {
        let Some(png) = page.screenshot().await? else {
            return Ok(());
        };
        let path = self.dir.join(format!("{stem}.png"));
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn write_excerpt(&self, stem: &str, url: &str, page: &dyn PageHandle) -> Result<()> {
        let html = page.html().await?;
        let excerpt = excerpt_markup(&html, &self.excerpt_selector, MAX_EXCERPT_BYTES);
        let path = self.dir.join(format!("{stem}.html"));
        tokio::fs::write(&path, format!("<!-- {url} -->\n{excerpt}\n"))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[async_trait]
impl DiagnosticsSink for FileDiagnostics {
    async fn capture(&self, row: RowRef, url: &str, page: &dyn PageHandle) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let stem = format!("row-{row}-{}", Utc::now().format("%Y%m%dT%H%M%S"));

        // Both halves are attempted; the first failure is reported.
        let screenshot = self.write_screenshot(&stem, page).await;
        let excerpt = self.write_excerpt(&stem, url, page).await;

        debug!(row = row.get(), dir = %self.dir.display(), "Diagnostics captured");
        screenshot.and(excerpt)
    }
}

/// Markup of the first element matching `selector`, or the whole document
/// when nothing matches, cut to at most `max_bytes` on a char boundary.
pub fn excerpt_markup(html: &str, selector: &str, max_bytes: usize) -> String {
    let document = Html::parse_document(html);
    let markup = Selector::parse(selector)
        .ok()
        .and_then(|sel| document.select(&sel).next().map(|el| el.html()))
        .unwrap_or_else(|| document.html());

    if markup.len() <= max_bytes {
        return markup;
    }

    let mut end = max_bytes;
    while !markup.is_char_boundary(end) {
        end -= 1;
    }
    markup[..end].to_string()
}
