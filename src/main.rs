use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

mod aggregator;
mod auction_scraper;
mod batch;
mod browsers;
mod config;
mod diagnostics;
mod error;
mod extraction;
mod models;
mod session;
mod sheets;
mod traits;

#[cfg(test)]
mod test_support;

use auction_scraper::AuctionScraper;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting auction sheet scraper");

    let config = Config::from_env()?;
    let scraper = AuctionScraper::new(&config)?;

    if let Err(e) = scraper.run_once().await {
        error!("Error during initial run: {:#}", e);
        if config.run_once {
            return Err(e);
        }
    }

    if config.run_once {
        return Ok(());
    }

    let sched = JobScheduler::new().await?;

    let job_scraper = scraper.clone();
    sched
        .add(Job::new_async(config.schedule.as_str(), move |_uuid, _l| {
            let scraper = job_scraper.clone();
            Box::pin(async move {
                if let Err(e) = scraper.run_if_idle().await {
                    error!("Error during scheduled run: {:#}", e);
                }
            })
        })?)
        .await?;

    info!("Scheduler started with schedule '{}'", config.schedule);
    sched.start().await?;

    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
    }
}
