//! Traits and interfaces for browser-agnostic listing extraction

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// CSS selectors for the auction listing page layouts we understand
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Element holding the current bid; its text is the bid price
    pub bid: String,
    /// Gallery images used by the regular listing template
    pub primary_images: String,
    /// Images used by the alternate (single image) template
    pub fallback_images: String,
    /// Container dumped to disk when no image could be found
    pub gallery_container: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            bid: ".item-detail-current-bid span[data-currency]".to_string(),
            primary_images: ".fotorama__stage__shaft img.fotorama__img".to_string(),
            fallback_images: ".product-image img".to_string(),
            gallery_container: ".product.media".to_string(),
        }
    }
}

/// Where the viewport is after a scroll step, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    /// Bottom edge of the viewport
    pub viewport_bottom: f64,
    /// Full scrollable height of the document
    pub document_height: f64,
}

impl ScrollPosition {
    pub fn at_bottom(&self) -> bool {
        self.viewport_bottom >= self.document_height
    }
}

/// A single tab-like handle onto one listing page.
///
/// Each handle is owned by exactly one page session and is closed when the
/// session ends.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Load `url` and wait until the document is parsed.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Scroll down by `pixels` and report the new position.
    async fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition>;

    /// Text content of the first element matching `selector`, if any.
    async fn text_content(&self, selector: &str) -> Result<Option<String>>;

    /// Absolute `src` of every image matching `selector`, in document order.
    async fn image_sources(&self, selector: &str) -> Result<Vec<String>>;

    /// PNG of the full page, or `None` when the backend cannot render.
    async fn screenshot(&self) -> Result<Option<Vec<u8>>>;

    /// Current serialized markup of the page.
    async fn html(&self) -> Result<String>;

    /// Release the tab.
    async fn close(&self) -> Result<()>;
}

/// A running browser that hands out fresh pages.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a new, blank page exclusively owned by the caller.
    async fn open_page(&self) -> Result<Box<dyn PageHandle>>;

    /// Shut the browser down once every page has been closed.
    async fn close(&self) -> Result<()>;
}

/// Starts a [`Browser`] for the duration of one run.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Display name for logs
    fn name(&self) -> &'static str;

    async fn launch(&self) -> Result<Arc<dyn Browser>>;
}
