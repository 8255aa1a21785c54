//! Browser backends that hand out listing pages

pub mod chrome;
pub mod static_html;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{BrowserBackend, Config};
use crate::traits::BrowserLauncher;

/// Build the launcher selected by `BROWSER_BACKEND`.
pub fn launcher(config: &Config) -> Result<Arc<dyn BrowserLauncher>> {
    Ok(match config.browser_backend {
        BrowserBackend::Chrome => Arc::new(chrome::ChromeLauncher::new(
            config.chrome_executable.clone(),
            config.session.navigation_timeout,
        )),
        BrowserBackend::Static => Arc::new(static_html::StaticLauncher::new(
            config.session.navigation_timeout,
        )?),
    })
}
