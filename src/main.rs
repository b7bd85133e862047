use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use restaurant_finder::config::AppConfig;
use restaurant_finder::restaurant_finder::RestaurantFinder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting restaurant finder");

    let config = AppConfig::from_env()?;
    let schedule = config.schedule.clone();
    let finder = RestaurantFinder::new(config)?;

    let cancel = finder.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling in-flight fetches");
            cancel.cancel();
        }
    });

    // Run once immediately
    if let Err(e) = finder.run_once().await {
        error!("Error during initial crawl: {}", e);
    }

    let Some(schedule) = schedule else {
        return Ok(());
    };

    let sched = JobScheduler::new().await?;

    let job_finder = finder.clone();
    sched
        .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let finder = job_finder.clone();
            Box::pin(async move {
                if let Err(e) = finder.run_once().await {
                    error!("Error during scheduled crawl: {}", e);
                }
            })
        })?)
        .await?;

    info!("Scheduler started - crawling on `{}`", schedule);
    sched.start().await?;

    finder.cancellation_token().cancelled().await;
    info!("Shutting down");
    Ok(())
}
