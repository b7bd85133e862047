//! Extraction pipeline
//!
//! A job fetches one page through the [`PageRenderer`] and runs one or more
//! schemas against it:
//!
//! ```text
//! Pending -> Fetching -> Extracting -> Succeeded
//!    |           |            |
//!    +-----------+------------+------> Failed
//! ```
//!
//! A crawl walks the listing pages of a [`SiteSpec`] in order, then enriches
//! every listing entry with its item page. Item pages are fetched
//! concurrently through the [`Dispatcher`]; one failing item never affects
//! its siblings. Its detail and review data are marked unavailable and the
//! error is reported next to the results.

mod dispatcher;
mod metrics;

pub use dispatcher::{Dispatcher, SystemMemory, VisitedSet, normalize_url};
pub use metrics::{CrawlMetrics, MetricsSnapshot};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PipelineConfig;
use crate::error::{ExtractionError, JobError};
use crate::extract::{ExtractedRecord, extract_all};
use crate::models::SubRecord;
use crate::renderer::{ReadinessPredicate, RenderOptions, RenderedPage};
use crate::schema::Schema;
use crate::sites::SiteSpec;
use crate::traits::{JobObserver, MemoryGauge, PageRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Fetching,
    Extracting,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Pending, Failed)
                | (Fetching, Extracting)
                | (Fetching, Failed)
                | (Extracting, Succeeded)
                | (Extracting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One page fetch and the schemas to run against the result.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    url: String,
    schemas: Vec<Arc<Schema>>,
    options: RenderOptions,
    state: JobState,
}

impl ExtractionJob {
    pub fn new(url: impl Into<String>, options: RenderOptions) -> Self {
        Self {
            url: url.into(),
            schemas: Vec::new(),
            options,
            state: JobState::Pending,
        }
    }

    /// Adds a schema; results come back in the order schemas were added.
    #[must_use]
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Moves to `next`; illegal transitions are refused and return `false`.
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            error!("Refusing job transition {:?} -> {:?} for {}", self.state, next, self.url);
            return false;
        }
        debug!("Job {}: {:?} -> {:?}", self.url, self.state, next);
        self.state = next;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub url: String,
    /// One record list per schema, in the order the schemas were added.
    pub records: Vec<Vec<ExtractedRecord>>,
}

impl JobOutput {
    pub fn record_count(&self) -> usize {
        self.records.iter().map(Vec::len).sum()
    }

    /// Takes the records of the schema at `index`, leaving an empty list.
    pub fn take(&mut self, index: usize) -> Vec<ExtractedRecord> {
        self.records.get_mut(index).map(std::mem::take).unwrap_or_default()
    }
}

/// Outcome of a finished job, as seen by a [`JobObserver`].
#[derive(Debug, Clone)]
pub struct JobReport {
    pub url: String,
    pub state: JobState,
    pub records: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// A listing entry together with the data from its item page.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledItem {
    /// Relative URL from the listing, if it had one.
    pub key: Option<String>,
    pub listing: ExtractedRecord,
    pub details: SubRecord<ExtractedRecord>,
    pub reviews: SubRecord<Vec<ExtractedRecord>>,
}

impl CrawledItem {
    fn unenriched(key: Option<String>, listing: ExtractedRecord) -> Self {
        Self {
            key,
            listing,
            details: SubRecord::Unavailable,
            reviews: SubRecord::Unavailable,
        }
    }
}

// Listing fields first, then `metadata` and `reviews`.
impl Serialize for CrawledItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.listing.len() + 2))?;
        for (k, v) in self.listing.iter() {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry("metadata", &self.details)?;
        map.serialize_entry("reviews", &self.reviews)?;
        map.end()
    }
}

#[derive(Debug, Default)]
pub struct CrawlOutput {
    pub items: Vec<CrawledItem>,
    pub errors: Vec<JobError>,
}

#[derive(Clone)]
pub struct Pipeline {
    renderer: Arc<dyn PageRenderer>,
    config: PipelineConfig,
    dispatcher: Arc<Dispatcher>,
    observer: Arc<dyn JobObserver>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn with_collaborators(
        renderer: Arc<dyn PageRenderer>,
        config: PipelineConfig,
        gauge: Arc<dyn MemoryGauge>,
        observer: Arc<dyn JobObserver>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            config.max_concurrency,
            config.memory_threshold_percent,
            config.check_interval,
            gauge,
        );

        Self {
            renderer,
            config,
            dispatcher: Arc::new(dispatcher),
            observer,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to stop pending and in-flight fetches.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn render_options(&self, readiness: Option<ReadinessPredicate>) -> RenderOptions {
        RenderOptions {
            cache_policy: self.config.cache_policy,
            timeout: self.config.timeout,
            retries: self.config.retries,
            ..RenderOptions::default()
        }
        .with_readiness(readiness)
    }

    /// Runs one job to a terminal state and reports it to the observer.
    pub async fn run_job(&self, mut job: ExtractionJob) -> Result<JobOutput, JobError> {
        let started = Instant::now();
        let result = self.drive(&mut job).await;

        let report = JobReport {
            url: job.url.clone(),
            state: job.state,
            records: result.as_ref().map_or(0, JobOutput::record_count),
            elapsed: started.elapsed(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        self.observer.job_finished(&report);

        result
    }

    async fn drive(&self, job: &mut ExtractionJob) -> Result<JobOutput, JobError> {
        if self.cancel.is_cancelled() {
            job.advance(JobState::Failed);
            return Err(JobError::Cancelled { url: job.url.clone() });
        }

        job.advance(JobState::Fetching);
        let fetched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(JobError::Cancelled { url: job.url.clone() }),
            page = self.renderer.fetch(&job.url, &job.options) => page.map_err(JobError::from),
        };
        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                job.advance(JobState::Failed);
                return Err(e);
            }
        };

        // From here on the job runs to completion; extraction never suspends.
        job.advance(JobState::Extracting);
        match extract_page(&page, &job.schemas) {
            Ok(records) => {
                job.advance(JobState::Succeeded);
                Ok(JobOutput {
                    url: job.url.clone(),
                    records,
                })
            }
            Err(e) => {
                job.advance(JobState::Failed);
                Err(e.into())
            }
        }
    }

    /// Crawls the listing pages of `site` and enriches every entry with its
    /// item page. URLs already in `visited` are not fetched again.
    pub async fn crawl(&self, site: &SiteSpec, visited: &VisitedSet) -> CrawlOutput {
        let mut output = CrawlOutput::default();

        info!("Crawling {} (up to {} listing pages)", site.name, site.max_pages);
        let listings = self.crawl_listings(site, visited, &mut output.errors).await;
        info!("Found {} listing entries on {}", listings.len(), site.name);

        output.items = self.enrich(site, visited, listings, &mut output.errors).await;
        output
    }

    async fn crawl_listings(
        &self,
        site: &SiteSpec,
        visited: &VisitedSet,
        errors: &mut Vec<JobError>,
    ) -> Vec<ExtractedRecord> {
        let mut listings = Vec::new();

        for page in 0..site.max_pages {
            let url = site.listing_url(page);
            if !visited.insert(&url) {
                debug!("Listing page {} already visited", url);
                continue;
            }

            let Some(_permit) = self.dispatcher.admit(&self.cancel).await else {
                errors.push(JobError::Cancelled { url });
                break;
            };

            info!("Fetching listing page {} of {}: {}", page + 1, site.max_pages, url);
            let job = ExtractionJob::new(url, self.render_options(site.listing_readiness.clone()))
                .with_schema(site.listing_schema.clone());

            match self.run_job(job).await {
                Ok(mut output) => {
                    let records = output.take(0);
                    if records.is_empty() {
                        info!("No listings on page {}, stopping pagination", page + 1);
                        break;
                    }
                    listings.extend(records);
                }
                Err(e) => {
                    errors.push(e);
                    break;
                }
            }
        }

        listings
    }

    async fn enrich(
        &self,
        site: &SiteSpec,
        visited: &VisitedSet,
        listings: Vec<ExtractedRecord>,
        errors: &mut Vec<JobError>,
    ) -> Vec<CrawledItem> {
        let mut items = Vec::with_capacity(listings.len());
        let mut pending = HashMap::new();
        let mut tasks = JoinSet::new();

        for listing in listings {
            let key = listing
                .text(&site.join_key_field)
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string);
            let Some(path) = key else {
                debug!("Listing entry without `{}`, not enriching", site.join_key_field);
                items.push(CrawledItem::unenriched(None, listing));
                continue;
            };

            let url = site.item_url(&path);
            if !visited.insert(&url) {
                debug!("Skipping duplicate listing entry {}", url);
                continue;
            }

            let index = items.len();
            items.push(CrawledItem::unenriched(Some(path), listing));
            pending.insert(index, url.clone());

            let job = ExtractionJob::new(url, self.render_options(site.detail_readiness.clone()))
                .with_schema(site.detail_schema.clone())
                .with_schema(site.reviews_schema.clone());
            let pipeline = self.clone();

            tasks.spawn(async move {
                let result = match pipeline.dispatcher.admit(&pipeline.cancel).await {
                    Some(_permit) => pipeline.run_job(job).await,
                    None => Err(JobError::Cancelled {
                        url: job.url().to_string(),
                    }),
                };
                (index, result)
            });
        }

        let mut interrupted = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    pending.remove(&index);
                    match result {
                        Ok(mut output) => {
                            let item = &mut items[index];
                            item.details =
                                SubRecord::Available(output.take(0).into_iter().next().unwrap_or_default());
                            item.reviews = SubRecord::Available(output.take(1));
                        }
                        Err(e) => errors.push(e),
                    }
                }
                Err(e) => {
                    error!("Item task failed to complete: {}", e);
                    interrupted = Some(e.to_string());
                }
            }
        }

        // Tasks that panicked or were aborted never reported their index.
        let mut lost: Vec<_> = pending.into_iter().collect();
        lost.sort_unstable_by_key(|(index, _)| *index);
        for (_, url) in lost {
            errors.push(JobError::Interrupted {
                url,
                message: interrupted.clone().unwrap_or_else(|| "task did not complete".to_string()),
            });
        }

        items
    }
}

fn extract_page(page: &RenderedPage, schemas: &[Arc<Schema>]) -> Result<Vec<Vec<ExtractedRecord>>, ExtractionError> {
    if page.body.trim().is_empty() {
        return Err(ExtractionError::EmptyDocument { url: page.url.clone() });
    }

    let document = page.document();
    Ok(schemas.iter().map(|schema| extract_all(&document, schema)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use JobState::*;

        assert!(Pending.can_transition_to(Fetching));
        assert!(Pending.can_transition_to(Failed));
        assert!(Fetching.can_transition_to(Extracting));
        assert!(Fetching.can_transition_to(Failed));
        assert!(Extracting.can_transition_to(Succeeded));
        assert!(Extracting.can_transition_to(Failed));
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let mut job = ExtractionJob::new("https://example.org", RenderOptions::default());

        assert!(!job.advance(JobState::Extracting));
        assert_eq!(job.state(), JobState::Pending);

        assert!(job.advance(JobState::Fetching));
        assert!(!job.advance(JobState::Succeeded));
        assert!(job.advance(JobState::Failed));
        assert!(job.state().is_terminal());
        assert!(!job.advance(JobState::Fetching));
    }

    #[test]
    fn blank_page_cannot_be_traversed() {
        let page = RenderedPage::new("https://example.org/empty", "   ");
        let err = extract_page(&page, &[]).unwrap_err();

        assert_eq!(
            err,
            ExtractionError::EmptyDocument {
                url: "https://example.org/empty".into()
            }
        );
    }

    #[test]
    fn crawled_item_serializes_listing_then_sub_records() {
        let listing: ExtractedRecord = [("restaurant_name", crate::extract::FieldValue::Text("O Buraco".into()))]
            .into_iter()
            .collect();
        let item = CrawledItem {
            key: None,
            listing,
            details: SubRecord::Unavailable,
            reviews: SubRecord::Available(Vec::new()),
        };

        assert_eq!(
            serde_json::to_string(&item).unwrap(),
            r#"{"restaurant_name":"O Buraco","metadata":"unavailable","reviews":[]}"#
        );
    }
}
