//! Headless Chromium backend driven over the DevTools protocol

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::traits::{Browser, BrowserLauncher, PageHandle, ScrollPosition};

/// Starts one Chromium process per run
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    request_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(executable: Option<PathBuf>, request_timeout: Duration) -> Self {
        Self {
            executable,
            request_timeout,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    fn name(&self) -> &'static str {
        "chrome"
    }

    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .request_timeout(self.request_timeout);

        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!(e))
            .context("Failed to build browser config")?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .context("Failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {}", e);
                }
            }
        });

        info!("Chromium launched");
        Ok(Arc::new(ChromeBrowser {
            browser: Mutex::new(browser),
            handler_task,
        }))
    }
}

struct ChromeBrowser {
    browser: Mutex<CdpBrowser>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageHandle>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("Failed to create new page")?;

        Ok(Box::new(ChromePage { page }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("Chromium did not close cleanly: {}", e);
        }
        browser.wait().await.context("Failed to reap Chromium")?;
        self.handler_task.abort();
        Ok(())
    }
}

struct ChromePage {
    page: Page,
}

impl ChromePage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("Failed to execute JavaScript")?;

        result
            .into_value()
            .context("Failed to extract value from JS result")
    }
}

fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[async_trait]
impl PageHandle for ChromePage {
    /// Navigate and return once the DOM is parsed, without waiting for
    /// images and other subresources.
    async fn goto(&self, url: &str) -> Result<()> {
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .context("Failed to subscribe to DOMContentLoaded")?;

        let navigation = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .context("Failed to navigate")?;
        if let Some(reason) = &navigation.result.error_text {
            bail!("Failed to navigate: {reason}");
        }

        dom_ready
            .next()
            .await
            .ok_or_else(|| anyhow!("Page closed before DOMContentLoaded"))?;
        Ok(())
    }

    async fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition> {
        let [viewport_bottom, document_height]: [f64; 2] = self
            .eval(format!(
                "(() => {{ window.scrollBy(0, {pixels}); \
                 return [window.scrollY + window.innerHeight, document.body.scrollHeight]; }})()"
            ))
            .await?;

        Ok(ScrollPosition {
            viewport_bottom,
            document_height,
        })
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        let found: Vec<String> = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); \
                 return el ? [el.textContent || ''] : []; }})()",
                js_string(selector)?
            ))
            .await?;

        Ok(found.into_iter().next())
    }

    async fn image_sources(&self, selector: &str) -> Result<Vec<String>> {
        self.eval(format!(
            "Array.from(document.querySelectorAll({})).map(img => img.src).filter(Boolean)",
            js_string(selector)?
        ))
        .await
    }

    async fn screenshot(&self) -> Result<Option<Vec<u8>>> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .context("Failed to take screenshot")?;

        Ok(Some(png))
    }

    async fn html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .context("Failed to get page content")
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .context("Failed to close page")
    }
}
