use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::discord::DiscordNotifier;
use crate::normalize::Normalizer;
use crate::output::JsonStore;
use crate::pipeline::{CrawlMetrics, MetricsSnapshot, Pipeline, SystemMemory, VisitedSet};
use crate::renderer::HttpRenderer;
use crate::sites::tripadvisor;
use crate::traits::PageRenderer;

pub const RAW_OUTPUT_FILE: &str = "restaurant_data.json";
pub const RESTAURANTS_FILE: &str = "restaurants.json";

/// What one crawl run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub site: String,
    pub listing_entries: usize,
    pub restaurants: usize,
    pub fetch_errors: usize,
    pub normalization_errors: usize,
    pub metrics: MetricsSnapshot,
    pub finished_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RestaurantFinder {
    config: AppConfig,
    pipeline: Pipeline,
    metrics: Arc<CrawlMetrics>,
    store: JsonStore,
    discord: DiscordNotifier,
}

impl RestaurantFinder {
    pub fn new(config: AppConfig) -> Result<Self> {
        let renderer = Arc::new(HttpRenderer::new()?);
        Ok(Self::with_renderer(config, renderer))
    }

    pub fn with_renderer(config: AppConfig, renderer: Arc<dyn PageRenderer>) -> Self {
        let metrics = Arc::new(CrawlMetrics::new());
        let pipeline = Pipeline::with_collaborators(
            renderer,
            config.pipeline.clone(),
            Arc::new(SystemMemory),
            metrics.clone(),
        );
        let store = JsonStore::new(config.output_dir.clone());
        let discord = DiscordNotifier::new(config.discord_webhook_url.clone());

        Self {
            config,
            pipeline,
            metrics,
            store,
            discord,
        }
    }

    /// Token that stops in-flight fetches of this finder's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.pipeline.cancellation_token()
    }

    /// Crawls, normalizes and writes both output files.
    ///
    /// Schema files are re-read on every run, so markup changes can be
    /// handled between scheduled runs.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let metrics_before = self.metrics.snapshot();
        let site = tripadvisor::site(
            &self.config.geo_id,
            self.config.max_listing_pages,
            self.config.schema_dir.as_deref(),
        )?;

        let visited = VisitedSet::new();
        let crawl = self.pipeline.crawl(&site, &visited).await;

        for e in &crawl.errors {
            warn!("Item unavailable: {}", e);
        }

        let batch = Normalizer::new(site.base_url.clone()).normalize_crawl(&crawl);

        self.store.write(RAW_OUTPUT_FILE, &crawl.items).await?;
        self.store.write(RESTAURANTS_FILE, &batch.restaurants).await?;

        let summary = RunSummary {
            site: site.name.clone(),
            listing_entries: crawl.items.len(),
            restaurants: batch.restaurants.len(),
            fetch_errors: crawl.errors.len(),
            normalization_errors: batch.errors.len(),
            metrics: self.metrics.snapshot().since(metrics_before),
            finished_at: Utc::now(),
        };

        info!(
            "Run finished: {} restaurants from {} listing entries ({} unavailable, {} skipped)",
            summary.restaurants, summary.listing_entries, summary.fetch_errors, summary.normalization_errors
        );

        if let Err(e) = self.discord.send_summary(&summary).await {
            warn!("Could not send Discord summary: {}", e);
        }

        Ok(summary)
    }
}
