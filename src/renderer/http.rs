use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{CachePolicy, MAX_FETCH_TIMEOUT, RenderOptions, RenderedPage};
use crate::error::FetchError;
use crate::traits::PageRenderer;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Renderer that fetches server-side HTML over plain HTTP.
///
/// Readiness predicates are evaluated against the fetched markup; a page
/// that is not ready yet is fetched again every `poll_interval` until the
/// timeout runs out. Ready pages are kept in an in-memory cache that is
/// consulted only under [`CachePolicy::Use`].
pub struct HttpRenderer {
    client: Client,
    cache: Arc<Mutex<HashMap<String, String>>>,
}

impl HttpRenderer {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            cache: Arc::default(),
        })
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(network)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(network)
    }

    async fn get_with_retries(
        &self,
        url: &str,
        options: &RenderOptions,
        deadline: Instant,
    ) -> Result<String, FetchError> {
        let timed_out = || FetchError::Timeout {
            url: url.to_string(),
            timeout: options.timeout,
        };
        let mut attempt = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }

            let result = tokio::time::timeout(remaining, self.get_once(url))
                .await
                .map_err(|_| timed_out())?;

            match result {
                Ok(body) => return Ok(body),
                Err(e) if attempt < options.retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!("Fetch of {} failed ({}), retry {}/{}", url, e, attempt, options.retries);
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(error: &FetchError) -> bool {
    match error {
        FetchError::Network { .. } => true,
        FetchError::Status { status, .. } => *status >= 500,
        FetchError::Timeout { .. } => false,
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn fetch(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage, FetchError> {
        if options.cache_policy == CachePolicy::Use
            && let Some(body) = self.cache.lock().await.get(url).cloned()
        {
            debug!("Serving {} from cache", url);
            return Ok(RenderedPage::new(url, body));
        }

        let deadline = Instant::now() + options.timeout.min(MAX_FETCH_TIMEOUT);

        loop {
            let body = self.get_with_retries(url, options, deadline).await?;

            let ready = options
                .readiness
                .as_ref()
                .is_none_or(|predicate| predicate.is_satisfied(&body));

            if ready {
                info!("Fetched {} ({} bytes)", url, body.len());
                if options.cache_policy == CachePolicy::Use {
                    self.cache.lock().await.insert(url.to_string(), body.clone());
                }
                return Ok(RenderedPage::new(url, body));
            }

            if Instant::now() + options.poll_interval >= deadline {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout: options.timeout,
                });
            }

            debug!("{} not ready yet, polling again in {:?}", url, options.poll_interval);
            tokio::time::sleep(options.poll_interval).await;
        }
    }
}

impl Clone for HttpRenderer {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            cache: self.cache.clone(),
        }
    }
}
