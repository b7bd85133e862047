//! TripAdvisor restaurant listings, detail pages and reviews
//!
//! The built-in schemas track the markup revision the crawler was last
//! checked against. Class names on the site rotate; when they do, drop
//! updated `listing.json`, `detail.json` and `reviews.json` files into the
//! directory named by `SCHEMA_DIR` and the next run picks them up without a
//! rebuild.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::SiteSpec;
use crate::error::SchemaError;
use crate::renderer::ReadinessPredicate;
use crate::schema::Schema;

pub const BASE_URL: &str = "https://www.tripadvisor.com";

/// Listing entries per results page.
pub const PAGE_SIZE: u32 = 30;

/// Progress bar shown while reviews are still loading.
pub const REVIEWS_LOADING_BAR: &str = "div.TSoOh";

/// Text the site injects into otherwise useful fields.
pub const BOILERPLATE: &[&str] = &["Jump to all reviews"];

/// Field names shared by the schemas and the normalizer.
pub mod fields {
    pub const NAME: &str = "restaurant_name";
    pub const RATING: &str = "rating";
    pub const CUISINE: &str = "cuisine";
    pub const PRICE_RANGE: &str = "price_range";
    pub const URL: &str = "restaurant_url";
    pub const MICHELIN: &str = "michelin";

    pub const REVIEW_COUNT: &str = "review_count";
    pub const RANKING: &str = "ranking";
    pub const REVIEW_SUMMARY: &str = "review_summary";
    pub const AI_HIGHLIGHTS: &str = "ai_highlights";
    pub const CATEGORY: &str = "category";
    pub const VALUE: &str = "value";
    pub const SCHEDULE: &str = "schedule";
    pub const DAY: &str = "day";
    pub const TIMES: &str = "times";
    pub const ADDRESS: &str = "address";
    pub const WEBSITE: &str = "website";
    pub const DETAILED_CUISINES: &str = "detailed_cuisines";
    pub const MEAL_TYPES: &str = "meal_types";
    pub const SPECIAL_DIETS: &str = "special_diets";

    pub const REVIEW_TEXT: &str = "review_text";
}

const LISTING_SCHEMA: &str = r##"{
  "name": "Restaurant Listings",
  "baseSelector": ".XIWnB.z.y",
  "fields": [
    { "name": "restaurant_name", "selector": "div.fiohW", "type": "text" },
    { "name": "rating", "selector": "div[data-automation='bubbleRatingValue'] span", "type": "text" },
    { "name": "cuisine", "selector": "span.biGQs._P.pZUbB.hmDzD:nth-of-type(1)", "type": "text" },
    { "name": "price_range", "selector": "span.biGQs._P.pZUbB.hmDzD:nth-of-type(2)", "type": "text" },
    { "name": "restaurant_url", "selector": "a.BMQDV", "type": "attribute", "attribute": "href" },
    { "name": "michelin", "selector": "img.ktayA", "type": "attribute", "attribute": "alt" }
  ]
}"##;

const DETAIL_SCHEMA: &str = r##"{
  "name": "Restaurant Complete Info",
  "baseSelector": "body",
  "fields": [
    { "name": "restaurant_name", "selector": "h1.hzzSG", "type": "text" },
    { "name": "rating", "selector": "div[data-automation='bubbleRatingValue']", "type": "text" },
    { "name": "review_count", "selector": "[data-automation='bubbleReviewCount']", "type": "text" },
    { "name": "ranking", "selector": "span.diZaT", "type": "text" },
    { "name": "price_range", "selector": "span.cPbcf > span.bTeln:last-of-type a", "type": "text" },
    { "name": "review_summary", "selector": "div.aaQZA div.IGaaH", "type": "text" },
    {
      "name": "ai_highlights",
      "selector": "div.OykfZ div.CUmiT",
      "type": "nested_list",
      "fields": [
        { "name": "category", "selector": "span.ZNjnF", "type": "text" },
        { "name": "value", "selector": "span.ezezH", "type": "text" }
      ]
    },
    {
      "name": "schedule",
      "selector": "div[data-automation='hours-section'] div.f.e.Q3 > div.f",
      "type": "nested_list",
      "fields": [
        { "name": "day", "selector": "div.cGgaa", "type": "text" },
        { "name": "times", "selector": "div.cGgaa + div", "type": "text" }
      ]
    },
    { "name": "address", "selector": "span[data-automation='restaurantsMapLinkOnName']", "type": "text" },
    { "name": "website", "selector": "a[data-automation='restaurantsWebsiteButton']", "type": "attribute", "attribute": "href" },
    { "name": "detailed_cuisines", "selector": ".qXeDC .iPiKu:nth-child(1) .AWdfh", "type": "text" },
    { "name": "meal_types", "selector": ".qXeDC .iPiKu:nth-child(2) .AWdfh", "type": "text" },
    { "name": "special_diets", "selector": ".qXeDC .iPiKu:nth-child(3) .AWdfh", "type": "text" }
  ]
}"##;

const REVIEWS_SCHEMA: &str = r##"{
  "name": "Restaurant Reviews",
  "baseSelector": "div[data-automation='reviewCard']",
  "fields": [
    { "name": "review_text", "selector": "span.JguWG", "type": "text" }
  ]
}"##;

/// Listing URL pattern for an area, with an `{offset}` placeholder left in.
pub fn listing_url_pattern(geo_id: &str) -> String {
    format!(
        "{BASE_URL}/FindRestaurants?geo={}&offset={{offset}}&sort=FEATURED&establishmentTypes=10591&broadened=false",
        urlencoding::encode(geo_id)
    )
}

/// Builds the site description, preferring schema files from `schema_dir`.
pub fn site(geo_id: &str, max_pages: u32, schema_dir: Option<&Path>) -> Result<SiteSpec, SchemaError> {
    Ok(SiteSpec {
        name: "TripAdvisor".to_string(),
        base_url: BASE_URL.to_string(),
        listing_url_pattern: listing_url_pattern(geo_id),
        page_size: PAGE_SIZE,
        max_pages,
        listing_schema: Arc::new(load_schema(schema_dir, "listing.json", LISTING_SCHEMA)?),
        detail_schema: Arc::new(load_schema(schema_dir, "detail.json", DETAIL_SCHEMA)?),
        reviews_schema: Arc::new(load_schema(schema_dir, "reviews.json", REVIEWS_SCHEMA)?),
        listing_readiness: None,
        detail_readiness: Some(ReadinessPredicate::absent(REVIEWS_LOADING_BAR)),
        join_key_field: fields::URL.to_string(),
    })
}

fn load_schema(dir: Option<&Path>, file: &str, builtin: &str) -> Result<Schema, SchemaError> {
    if let Some(path) = dir.map(|d| d.join(file))
        && path.exists()
    {
        info!("Loading schema override from {}", path.display());
        return Schema::from_file(&path);
    }
    Schema::from_json(builtin)
}
