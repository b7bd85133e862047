//! Traits at the seams between the pipeline and its collaborators

use async_trait::async_trait;

use crate::error::FetchError;
use crate::pipeline::JobReport;
use crate::renderer::{RenderOptions, RenderedPage};

/// Produces rendered pages for the pipeline.
///
/// Implementations own networking, caching, readiness waits and retries;
/// the pipeline only sees a finished page or a [`FetchError`].
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Fetch `url` and wait until it satisfies `options.readiness`.
    ///
    /// # Returns
    /// * `Result<RenderedPage, FetchError>` - The ready page, or why it could not be obtained
    async fn fetch(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage, FetchError>;
}

/// Resource-pressure signal polled by the dispatcher before admitting a fetch.
pub trait MemoryGauge: Send + Sync {
    /// Current memory use in percent, or `None` if it cannot be measured.
    fn used_percent(&self) -> Option<f64>;
}

/// Receives the outcome of every finished extraction job.
pub trait JobObserver: Send + Sync {
    fn job_finished(&self, report: &JobReport);
}
