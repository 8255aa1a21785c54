//! Selector probing for bid prices and gallery images
//!
//! The listing pages come in two template variants. Both share the bid
//! element, but the image gallery differs, so images are probed with the
//! primary gallery selector first and the fallback selector only when the
//! primary finds nothing.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::RowFailure;
use crate::traits::{PageHandle, SiteSelectors};

const BID_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of running one selector against a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    NotFound,
    Found(Vec<String>),
}

impl ProbeResult {
    fn from_urls(urls: Vec<String>) -> Self {
        if urls.is_empty() {
            Self::NotFound
        } else {
            Self::Found(urls)
        }
    }

    pub fn first(&self) -> Option<&str> {
        match self {
            Self::NotFound => None,
            Self::Found(urls) => urls.first().map(String::as_str),
        }
    }
}

/// Which selector produced the images for a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Primary,
    Fallback,
}

/// Result of the image probe chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProbe {
    pub source: Option<ImageSource>,
    pub result: ProbeResult,
}

impl ImageProbe {
    /// First image with its query string stripped.
    pub fn image_url(&self) -> Option<String> {
        self.result.first().map(normalize_image_url)
    }

    pub fn count(&self) -> usize {
        match &self.result {
            ProbeResult::NotFound => 0,
            ProbeResult::Found(urls) => urls.len(),
        }
    }
}

/// Bid and image probing against a loaded page
#[derive(Debug, Clone)]
pub struct ExtractionStrategy {
    selectors: SiteSelectors,
    bid_timeout: Duration,
}

impl ExtractionStrategy {
    pub fn new(selectors: SiteSelectors, bid_timeout: Duration) -> Self {
        Self {
            selectors,
            bid_timeout,
        }
    }

    /// Wait for the bid element and return its trimmed text.
    ///
    /// # Errors
    /// * `RowFailure::ExtractionTimeout` - element never showed up
    /// * `RowFailure::Extraction` - the page could not evaluate the selector
    pub async fn wait_for_bid(&self, page: &dyn PageHandle) -> Result<String, RowFailure> {
        let selector = self.selectors.bid.as_str();
        let deadline = Instant::now() + self.bid_timeout;

        loop {
            let text = page
                .text_content(selector)
                .await
                .map_err(|e| RowFailure::extraction(selector, e))?;

            if let Some(bid) = text {
                return Ok(bid.trim().to_string());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RowFailure::ExtractionTimeout {
                    selector: selector.to_string(),
                    timeout: self.bid_timeout,
                });
            }
            sleep(BID_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Probe the primary gallery, then the fallback. Never fails.
    pub async fn probe_images(&self, page: &dyn PageHandle) -> ImageProbe {
        let primary = self.probe(page, &self.selectors.primary_images).await;
        if primary != ProbeResult::NotFound {
            return ImageProbe {
                source: Some(ImageSource::Primary),
                result: primary,
            };
        }

        debug!("Primary gallery empty, trying fallback selector");
        match self.probe(page, &self.selectors.fallback_images).await {
            ProbeResult::NotFound => ImageProbe {
                source: None,
                result: ProbeResult::NotFound,
            },
            found => ImageProbe {
                source: Some(ImageSource::Fallback),
                result: found,
            },
        }
    }

    async fn probe(&self, page: &dyn PageHandle, selector: &str) -> ProbeResult {
        match page.image_sources(selector).await {
            Ok(urls) => ProbeResult::from_urls(
                urls.into_iter()
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect(),
            ),
            Err(e) => {
                warn!(selector, error = %e, "Image probe failed");
                ProbeResult::NotFound
            }
        }
    }
}

/// Drop everything from the first `?` onwards.
pub fn normalize_image_url(url: &str) -> String {
    url.split_once('?').map_or(url, |(base, _)| base).to_string()
}

/// Display size of the rendered thumbnail cell image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSize {
    pub height: u32,
    pub width: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self {
            height: 60,
            width: 60,
        }
    }
}

impl std::str::FromStr for ThumbnailSize {
    type Err = anyhow::Error;

    /// Parses `HEIGHTxWIDTH`, e.g. `60x60`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (height, width) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow::anyhow!("expected HEIGHTxWIDTH, got '{s}'"))?;
        Ok(Self {
            height: height.trim().parse()?,
            width: width.trim().parse()?,
        })
    }
}

/// Sheets `IMAGE` formula rendering `url` at a fixed size (mode 4).
pub fn image_formula(url: &str, size: ThumbnailSize) -> String {
    format!(
        "=IMAGE(\"{}\", 4, {}, {})",
        url.replace('"', "\"\""),
        size.height,
        size.width
    )
}
