//! Scripted fakes for pages, browsers, diagnostics and the sheet

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::diagnostics::DiagnosticsSink;
use crate::models::{PendingWrite, RowRef};
use crate::sheets::StoreGateway;
use crate::traits::{Browser, BrowserLauncher, PageHandle, ScrollPosition, SiteSelectors};

/// How a fake listing page behaves
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    nav_error: Option<String>,
    nav_delay: Duration,
    panic_on_goto: bool,
    bid: Option<String>,
    bid_delay: Duration,
    primary: Vec<String>,
    fallback: Vec<String>,
    broken_image_probe: bool,
    document_height: f64,
    html: String,
    screenshot: Option<Vec<u8>>,
    broken_diagnostics: bool,
}

impl PageScript {
    pub fn listing(bid: &str) -> Self {
        Self {
            bid: Some(bid.to_string()),
            html: "<html><body></body></html>".to_string(),
            ..Self::default()
        }
    }

    pub fn no_bid() -> Self {
        Self {
            bid: None,
            ..Self::listing("")
        }
    }

    pub fn nav_failure(reason: &str) -> Self {
        Self {
            nav_error: Some(reason.to_string()),
            ..Self::listing("")
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_goto: true,
            ..Self::listing("")
        }
    }

    pub fn with_nav_delay(mut self, delay: Duration) -> Self {
        self.nav_delay = delay;
        self
    }

    pub fn with_bid_delay(mut self, delay: Duration) -> Self {
        self.bid_delay = delay;
        self
    }

    pub fn with_primary(mut self, urls: &[&str]) -> Self {
        self.primary = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn with_fallback(mut self, urls: &[&str]) -> Self {
        self.fallback = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn with_broken_image_probe(mut self) -> Self {
        self.broken_image_probe = true;
        self
    }

    pub fn with_document_height(mut self, height: f64) -> Self {
        self.document_height = height;
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = Some(png);
        self
    }

    pub fn with_broken_diagnostics(mut self) -> Self {
        self.broken_diagnostics = true;
        self
    }
}

/// Page lifecycle step, in the order the fake browser saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Navigated(String),
    /// URL of the last navigation, empty when the page never navigated
    Closed(String),
}

/// Counters shared by a fake browser and all of its pages
#[derive(Debug, Default)]
pub struct BrowserStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    scroll_steps: AtomicUsize,
    browser_closes: AtomicUsize,
    events: Mutex<Vec<PageEvent>>,
}

impl BrowserStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn scroll_steps(&self) -> usize {
        self.scroll_steps.load(Ordering::SeqCst)
    }

    pub fn browser_closes(&self) -> usize {
        self.browser_closes.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: PageEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn page_opened(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
    }

    fn page_closed(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Loaded {
    script: PageScript,
    at: Instant,
    scrolled: f64,
}

/// Page whose behaviour comes from a [`PageScript`] chosen by URL
pub struct FakePage {
    routes: Arc<HashMap<String, PageScript>>,
    stats: Arc<BrowserStats>,
    loaded: Mutex<Option<Loaded>>,
    requested: Mutex<Option<String>>,
    probed: Mutex<Vec<String>>,
}

impl FakePage {
    /// Standalone page already showing `script`.
    pub fn new(script: PageScript) -> Self {
        let page = Self::blank(Arc::default(), Arc::default());
        *page.loaded.lock().unwrap() = Some(Loaded {
            script,
            at: Instant::now(),
            scrolled: 0.0,
        });
        page
    }

    fn blank(routes: Arc<HashMap<String, PageScript>>, stats: Arc<BrowserStats>) -> Self {
        Self {
            routes,
            stats,
            loaded: Mutex::new(None),
            requested: Mutex::new(None),
            probed: Mutex::new(Vec::new()),
        }
    }

    pub fn probed_selectors(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    fn script(&self) -> Result<PageScript> {
        self.loaded
            .lock()
            .unwrap()
            .as_ref()
            .map(|loaded| loaded.script.clone())
            .ok_or_else(|| anyhow!("no document loaded"))
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        *self.requested.lock().unwrap() = Some(url.to_string());
        self.stats.record(PageEvent::Navigated(url.to_string()));

        let script = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no route for {url}"))?;

        if script.panic_on_goto {
            panic!("renderer crashed on {url}");
        }
        tokio::time::sleep(script.nav_delay).await;
        if let Some(reason) = &script.nav_error {
            return Err(anyhow!("{reason}"));
        }

        *self.loaded.lock().unwrap() = Some(Loaded {
            script,
            at: Instant::now(),
            scrolled: 0.0,
        });
        Ok(())
    }

    async fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition> {
        self.stats.scroll_steps.fetch_add(1, Ordering::SeqCst);
        let mut loaded = self.loaded.lock().unwrap();
        let loaded = loaded.as_mut().ok_or_else(|| anyhow!("no document loaded"))?;
        loaded.scrolled += f64::from(pixels);

        Ok(ScrollPosition {
            viewport_bottom: loaded.scrolled,
            document_height: loaded.script.document_height,
        })
    }

    async fn text_content(&self, _selector: &str) -> Result<Option<String>> {
        let loaded_at = self
            .loaded
            .lock()
            .unwrap()
            .as_ref()
            .map(|loaded| loaded.at)
            .ok_or_else(|| anyhow!("no document loaded"))?;
        let script = self.script()?;

        Ok(script.bid.filter(|_| loaded_at.elapsed() >= script.bid_delay))
    }

    async fn image_sources(&self, selector: &str) -> Result<Vec<String>> {
        self.probed.lock().unwrap().push(selector.to_string());
        let script = self.script()?;

        if script.broken_image_probe {
            return Err(anyhow!("Execution context was destroyed"));
        }

        let selectors = SiteSelectors::default();
        Ok(if selector == selectors.primary_images {
            script.primary
        } else if selector == selectors.fallback_images {
            script.fallback
        } else {
            Vec::new()
        })
    }

    async fn screenshot(&self) -> Result<Option<Vec<u8>>> {
        let script = self.script()?;
        if script.broken_diagnostics {
            return Err(anyhow!("screenshot failed"));
        }
        Ok(script.screenshot)
    }

    async fn html(&self) -> Result<String> {
        let script = self.script()?;
        if script.broken_diagnostics {
            return Err(anyhow!("page crashed"));
        }
        Ok(script.html)
    }

    async fn close(&self) -> Result<()> {
        let url = self.requested.lock().unwrap().clone().unwrap_or_default();
        self.stats.record(PageEvent::Closed(url));
        self.stats.page_closed();
        Ok(())
    }
}

/// Browser serving [`FakePage`]s from a URL → script table
pub struct FakeBrowser {
    routes: Arc<HashMap<String, PageScript>>,
    stats: Arc<BrowserStats>,
}

impl FakeBrowser {
    pub fn new<S: Into<String>>(routes: impl IntoIterator<Item = (S, PageScript)>) -> Arc<Self> {
        Arc::new(Self {
            routes: Arc::new(routes.into_iter().map(|(url, s)| (url.into(), s)).collect()),
            stats: Arc::default(),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(Vec::<(String, PageScript)>::new())
    }

    pub fn stats(&self) -> &BrowserStats {
        &self.stats
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageHandle>> {
        self.stats.page_opened();
        Ok(Box::new(FakePage::blank(self.routes.clone(), self.stats.clone())))
    }

    async fn close(&self) -> Result<()> {
        self.stats.browser_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher handing out the same fake browser every run
pub struct FakeLauncher {
    browser: Arc<FakeBrowser>,
    launches: AtomicUsize,
    fail: bool,
}

impl FakeLauncher {
    pub fn new(browser: Arc<FakeBrowser>) -> Self {
        Self {
            browser,
            launches: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(FakeBrowser::empty())
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("Chromium not installed"));
        }
        Ok(self.browser.clone())
    }
}

/// Records which rows diagnostics were requested for
#[derive(Default)]
pub struct RecordingDiagnostics {
    rows: Mutex<Vec<RowRef>>,
    fail: bool,
}

impl RecordingDiagnostics {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<RowRef> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiagnosticsSink for RecordingDiagnostics {
    async fn capture(&self, row: RowRef, _url: &str, _page: &dyn PageHandle) -> Result<()> {
        self.rows.lock().unwrap().push(row);
        if self.fail {
            return Err(anyhow!("disk full"));
        }
        Ok(())
    }
}

/// In-memory sheet keyed by column letter
#[derive(Default)]
pub struct MemoryStore {
    columns: HashMap<String, Vec<Option<String>>>,
    reads: Mutex<Vec<String>>,
    writes: Mutex<Vec<Vec<PendingWrite>>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data cells (below the header) of `column`.
    pub fn with_column(mut self, column: &str, cells: &[&str]) -> Self {
        let cells = cells
            .iter()
            .map(|c| (!c.is_empty()).then(|| c.to_string()))
            .collect();
        self.columns.insert(column.to_string(), cells);
        self
    }

    pub fn with_failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> Vec<Vec<PendingWrite>> {
        self.writes.lock().unwrap().clone()
    }
}

/// `InHunt!T2:T9` -> (`T`, Some(8)); `InHunt!A2:A` -> (`A`, None)
fn parse_range(range: &str) -> (String, Option<usize>) {
    let cells = range.rsplit('!').next().unwrap_or(range);
    let (start, end) = cells.split_once(':').unwrap_or((cells, cells));
    let column: String = start.chars().take_while(char::is_ascii_alphabetic).collect();
    let first: usize = start[column.len()..].parse().unwrap_or(2);
    let last: Option<usize> = end[column.len()..].parse().ok();
    (column, last.map(|last| last + 1 - first))
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn read_column(&self, range: &str) -> Result<Vec<Option<String>>> {
        self.reads.lock().unwrap().push(range.to_string());
        if self.fail_reads {
            return Err(anyhow!("quota exceeded"));
        }

        let (column, len) = parse_range(range);
        let mut cells = self.columns.get(&column).cloned().unwrap_or_default();
        if let Some(len) = len {
            cells.truncate(len);
        }
        // The API drops trailing blanks.
        while cells.last().is_some_and(Option::is_none) {
            cells.pop();
        }
        Ok(cells)
    }

    async fn write_cells(&self, _sheet: &str, writes: &[PendingWrite]) -> Result<usize> {
        self.writes.lock().unwrap().push(writes.to_vec());
        if self.fail_writes {
            return Err(anyhow!("403 PERMISSION_DENIED"));
        }
        Ok(writes.len())
    }
}
