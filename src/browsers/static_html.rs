//! Plain HTTP backend: fetch the listing once and query the parsed markup
//!
//! There is no JavaScript here, so lazy-loaded content never appears and
//! screenshots are unavailable. Lazy images are picked up from `data-src`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Selector};

use crate::traits::{Browser, BrowserLauncher, PageHandle, ScrollPosition};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Launcher for the HTTP backend
pub struct StaticLauncher {
    client: Client,
}

impl StaticLauncher {
    pub fn new(navigation_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(navigation_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserLauncher for StaticLauncher {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        Ok(Arc::new(StaticBrowser {
            client: self.client.clone(),
        }))
    }
}

struct StaticBrowser {
    client: Client,
}

#[async_trait]
impl Browser for StaticBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageHandle>> {
        Ok(Box::new(StaticPage::blank(self.client.clone())))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct LoadedDocument {
    url: Url,
    html: String,
}

/// One fetched listing page
pub struct StaticPage {
    client: Client,
    document: Mutex<Option<LoadedDocument>>,
}

impl StaticPage {
    fn blank(client: Client) -> Self {
        Self {
            client,
            document: Mutex::new(None),
        }
    }

    /// Page that already holds `html` as if it had been fetched from `url`.
    #[cfg(test)]
    pub fn loaded(url: &str, html: &str) -> Self {
        let page = Self::blank(Client::new());
        page.store(LoadedDocument {
            url: Url::parse(url).expect("test url"),
            html: html.to_string(),
        });
        page
    }

    fn store(&self, document: LoadedDocument) {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(document);
    }

    // Parsing happens per query so the non-Send `Html` never lives across an await.
    fn with_document<T>(&self, f: impl FnOnce(&Url, &Html) -> T) -> Result<T> {
        let guard = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let loaded = guard
            .as_ref()
            .ok_or_else(|| anyhow!("no document loaded"))?;
        let document = Html::parse_document(&loaded.html);
        Ok(f(&loaded.url, &document))
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Failed to parse selector '{selector}': {e:?}"))
}

#[async_trait]
impl PageHandle for StaticPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP {}", response.status()));
        }

        let url = response.url().clone();
        let html = response.text().await?;
        self.store(LoadedDocument { url, html });
        Ok(())
    }

    async fn scroll_by(&self, _pixels: u32) -> Result<ScrollPosition> {
        Ok(ScrollPosition {
            viewport_bottom: 0.0,
            document_height: 0.0,
        })
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        self.with_document(|_, document| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>())
        })
    }

    async fn image_sources(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        self.with_document(|base, document| {
            document
                .select(&selector)
                .filter_map(|img| {
                    img.value()
                        .attr("data-src")
                        .or_else(|| img.value().attr("src"))
                })
                .filter_map(|src| base.join(src.trim()).ok())
                .map(String::from)
                .collect()
        })
    }

    async fn screenshot(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn html(&self) -> Result<String> {
        self.with_document(|_, document| document.html())
    }

    async fn close(&self) -> Result<()> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}
