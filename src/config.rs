//! Runtime configuration, read once from the environment at start-up
//!
//! `.env` is loaded by `main` before [`Config::from_env`] runs. Every value
//! is validated here so a bad setting stops the bot before the first run
//! instead of failing halfway through one.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::aggregator::NoImagePolicy;
use crate::extraction::ThumbnailSize;
use crate::session::{ScrollSettings, SessionSettings};
use crate::sheets::SheetLayout;
use crate::sheets::auth::ServiceAccountKey;

/// Which implementation opens listing pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserBackend {
    Chrome,
    Static,
}

impl FromStr for BrowserBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Self::Chrome),
            "static" | "http" => Ok(Self::Static),
            other => bail!("unknown browser backend '{other}' (expected chrome or static)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: ServiceAccountKey,
    pub spreadsheet_id: String,
    pub layout: SheetLayout,
    pub batch_size: usize,
    pub bid_timeout: Duration,
    pub session: SessionSettings,
    pub thumbnail: ThumbnailSize,
    pub no_image_policy: NoImagePolicy,
    pub diagnostics_dir: Option<PathBuf>,
    pub browser_backend: BrowserBackend,
    pub chrome_executable: Option<PathBuf>,
    /// Cron expression with a leading seconds field
    pub schedule: String,
    pub run_once: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env { lookup };

        let credentials = ServiceAccountKey::from_json(&env.required("GOOGLE_CREDENTIALS")?)
            .context("GOOGLE_CREDENTIALS is not a valid service account key")?;

        let layout = SheetLayout {
            sheet_name: env.optional("SHEET_NAME").unwrap_or_else(|| "InHunt".to_string()),
            row_count_column: env.column("ROW_COUNT_COLUMN", "A")?,
            url_column: env.column("URL_COLUMN", "T")?,
            bid_column: env.column("BID_COLUMN", "V")?,
            image_column: env.column("IMAGE_COLUMN", "AC")?,
        };

        let batch_size: usize = env.parse_or("BATCH_SIZE", 5)?;
        if batch_size == 0 {
            bail!("BATCH_SIZE must be at least 1");
        }

        let scroll = if env.flag("SCROLL_TO_LOAD", true)? {
            Some(ScrollSettings {
                max_steps: env.parse_or("SCROLL_MAX_STEPS", ScrollSettings::default().max_steps)?,
                ..ScrollSettings::default()
            })
        } else {
            None
        };

        Ok(Self {
            credentials,
            spreadsheet_id: env.required("SPREADSHEET_ID")?,
            layout,
            batch_size,
            bid_timeout: Duration::from_millis(env.parse_or("BID_TIMEOUT_MS", 2_000)?),
            session: SessionSettings {
                navigation_timeout: Duration::from_millis(
                    env.parse_or("NAVIGATION_TIMEOUT_MS", 30_000)?,
                ),
                scroll,
            },
            thumbnail: env.parse_or("THUMBNAIL_SIZE", ThumbnailSize::default())?,
            no_image_policy: env.parse_or("NO_IMAGE_POLICY", NoImagePolicy::Blank)?,
            diagnostics_dir: env.optional("DIAGNOSTICS_DIR").map(PathBuf::from),
            browser_backend: env.parse_or("BROWSER_BACKEND", BrowserBackend::Chrome)?,
            chrome_executable: env.optional("CHROME_EXECUTABLE").map(PathBuf::from),
            schedule: env
                .optional("SCRAPE_SCHEDULE")
                .unwrap_or_else(|| "0 */15 * * * *".to_string()),
            run_once: env.flag("RUN_ONCE", false)?,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| anyhow!("{key} must be set"))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow!("invalid {key} '{raw}': {e}")),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.optional(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => bail!("invalid {key} '{v}': expected true or false"),
        }
    }

    fn column(&self, key: &str, default: &str) -> Result<String> {
        let column = self
            .optional(key)
            .unwrap_or_else(|| default.to_string())
            .to_ascii_uppercase();

        if column.is_empty() || !column.chars().all(|c| c.is_ascii_uppercase()) {
            bail!("invalid {key} '{column}': expected A1 column letters such as T or AC");
        }
        Ok(column)
    }
}
