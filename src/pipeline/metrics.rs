use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use super::{JobReport, JobState};
use crate::traits::JobObserver;

/// Job observer that logs every outcome and keeps running totals.
#[derive(Debug, Default)]
pub struct CrawlMetrics {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    records: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_succeeded: usize,
    pub jobs_failed: usize,
    pub records_extracted: usize,
}

impl MetricsSnapshot {
    /// Counts accumulated since `earlier` was taken.
    pub fn since(self, earlier: MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_succeeded: self.jobs_succeeded.saturating_sub(earlier.jobs_succeeded),
            jobs_failed: self.jobs_failed.saturating_sub(earlier.jobs_failed),
            records_extracted: self.records_extracted.saturating_sub(earlier.records_extracted),
        }
    }
}

impl CrawlMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_succeeded: self.succeeded.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            records_extracted: self.records.load(Ordering::Relaxed),
        }
    }
}

impl JobObserver for CrawlMetrics {
    fn job_finished(&self, report: &JobReport) {
        match (&report.state, &report.error) {
            (JobState::Succeeded, _) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.records.fetch_add(report.records, Ordering::Relaxed);
                info!(
                    "Extracted {} records from {} in {:?}",
                    report.records, report.url, report.elapsed
                );
            }
            (state, error) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Job for {} ended {:?} after {:?}: {}",
                    report.url,
                    state,
                    report.elapsed,
                    error.as_deref().unwrap_or("no error recorded")
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn report(state: JobState, records: usize, error: Option<&str>) -> JobReport {
        JobReport {
            url: "https://example.org".into(),
            state,
            records,
            elapsed: Duration::from_millis(3),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn counts_outcomes() {
        let metrics = CrawlMetrics::new();
        metrics.job_finished(&report(JobState::Succeeded, 30, None));
        metrics.job_finished(&report(JobState::Succeeded, 2, None));
        metrics.job_finished(&report(JobState::Failed, 0, Some("HTTP 503")));

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                jobs_succeeded: 2,
                jobs_failed: 1,
                records_extracted: 32,
            }
        );
    }

    #[test]
    fn snapshot_difference_covers_one_run() {
        let metrics = CrawlMetrics::new();
        metrics.job_finished(&report(JobState::Succeeded, 30, None));
        let before = metrics.snapshot();

        metrics.job_finished(&report(JobState::Succeeded, 5, None));
        metrics.job_finished(&report(JobState::Failed, 0, Some("timeout")));

        assert_eq!(
            metrics.snapshot().since(before),
            MetricsSnapshot {
                jobs_succeeded: 1,
                jobs_failed: 1,
                records_extracted: 5,
            }
        );
    }
}
