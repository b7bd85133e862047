//! Site descriptions consumed by the crawl pipeline

pub mod tripadvisor;

use std::sync::Arc;

use url::Url;

use crate::renderer::ReadinessPredicate;
use crate::schema::Schema;

/// Everything the pipeline needs to crawl one site.
#[derive(Debug, Clone)]
pub struct SiteSpec {
    /// Display name for the website
    pub name: String,
    /// Base URL that relative item paths are appended to
    pub base_url: String,
    /// Listing URL with an `{offset}` placeholder
    pub listing_url_pattern: String,
    /// Items per listing page, used to compute offsets
    pub page_size: u32,
    pub max_pages: u32,
    pub listing_schema: Arc<Schema>,
    pub detail_schema: Arc<Schema>,
    pub reviews_schema: Arc<Schema>,
    pub listing_readiness: Option<ReadinessPredicate>,
    /// Waited for on item pages before the detail and review schemas run
    pub detail_readiness: Option<ReadinessPredicate>,
    /// Listing field holding the item's relative URL
    pub join_key_field: String,
}

impl SiteSpec {
    /// URL of the zero-based listing page `page`.
    pub fn listing_url(&self, page: u32) -> String {
        self.listing_url_pattern
            .replace("{offset}", &(page * self.page_size).to_string())
    }

    /// Absolute URL of an item page from its relative path.
    pub fn item_url(&self, path: &str) -> String {
        item_url(&self.base_url, path)
    }
}

/// Appends `path` to `base_url`; absolute `path`s are returned as they are.
pub fn item_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http") {
        return path.to_string();
    }

    Url::parse(base_url)
        .and_then(|base| base.join(path))
        .map_or_else(
            |_| format!("{}{}", base_url.trim_end_matches('/'), path),
            |url| url.to_string(),
        )
}
