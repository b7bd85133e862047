//! Admission control for concurrent fetches

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::traits::MemoryGauge;

/// Caps in-flight fetches and holds new ones back under memory pressure.
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    gauge: Arc<dyn MemoryGauge>,
    memory_threshold_percent: f64,
    check_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        max_concurrency: usize,
        memory_threshold_percent: f64,
        check_interval: Duration,
        gauge: Arc<dyn MemoryGauge>,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            gauge,
            memory_threshold_percent,
            check_interval,
        }
    }

    /// Waits for a free slot, then for memory use to fall below the
    /// threshold. Returns `None` if `cancel` fires first.
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn admit(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            permit = self.permits.clone().acquire_owned() => permit.ok()?,
        };

        while let Some(used) = self.gauge.used_percent()
            && used >= self.memory_threshold_percent
        {
            debug!(
                "Memory at {:.1}% (limit {:.1}%), holding fetch for {:?}",
                used, self.memory_threshold_percent, self.check_interval
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(self.check_interval) => {}
            }
        }

        Some(permit)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// System memory use read from `/proc/meminfo`.
///
/// Reports nothing on platforms without it, which never throttles.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryGauge for SystemMemory {
    fn used_percent(&self) -> Option<f64> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&meminfo)
    }
}

fn parse_meminfo(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        meminfo
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse().ok())
    };

    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    if total <= 0.0 {
        return None;
    }
    Some((total - available) / total * 100.0)
}

/// URLs already scheduled, compared without their fragment.
///
/// Owned by the caller and shared by every job of a crawl; checking and
/// recording a URL is a single atomic step.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `url`; `false` if it had been recorded before.
    pub fn insert(&self, url: &str) -> bool {
        let normalized = normalize_url(url);
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalized)
    }

    pub fn contains(&self, url: &str) -> bool {
        let normalized = normalize_url(url);
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalized)
    }

    pub fn len(&self) -> usize {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strips the fragment from `url`.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}
