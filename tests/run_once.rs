// tests/run_once.rs
//
// One full run over canned TripAdvisor markup: crawl, normalize and write
// both JSON files.
//
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use restaurant_finder::config::{AppConfig, PipelineConfig};
use restaurant_finder::error::FetchError;
use restaurant_finder::renderer::{RenderOptions, RenderedPage};
use restaurant_finder::restaurant_finder::{RAW_OUTPUT_FILE, RESTAURANTS_FILE, RestaurantFinder};
use restaurant_finder::sites::tripadvisor;
use restaurant_finder::traits::PageRenderer;
use serde_json::Value;
use tempfile::tempdir;

const CAFEINA: &str = "/Restaurant_Review-g189180-d1-Reviews-Cafeina-Porto.html";
const BAD_PLACE: &str = "/Restaurant_Review-g189180-d2-Reviews-Bad_Place-Porto.html";

struct CannedPages(HashMap<String, String>);

#[async_trait]
impl PageRenderer for CannedPages {
    async fn fetch(&self, url: &str, _options: &RenderOptions) -> Result<RenderedPage, FetchError> {
        self.0
            .get(url)
            .map(|body| RenderedPage::new(url, body.as_str()))
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
    }
}

fn card(path: &str, name: &str, price: &str) -> String {
    format!(
        r#"<div class="XIWnB z y">
             <a class="BMQDV _F Gv" href="{path}"><div class="biGQs _P fiohW">{name}</div></a>
             <div data-automation="bubbleRatingValue"><span>4.5</span></div>
             <div><span class="biGQs _P pZUbB hmDzD">Portuguese</span><span class="biGQs _P pZUbB hmDzD">{price}</span></div>
           </div>"#
    )
}

fn pages() -> HashMap<String, String> {
    let site = tripadvisor::site("189180", 1, None).unwrap();
    let listing = format!(
        "<html><body>{}{}</body></html>",
        card(CAFEINA, "1. Cafeína", "$$$$"),
        card(BAD_PLACE, "2. Bad Place", "???")
    );
    let detail = r#"<html><body>
        <h1 class="hzzSG">Cafeína</h1>
        <div data-automation="bubbleRatingValue">4.5</div>
        <span data-automation="bubbleReviewCount">1,234 reviews</span>
        <div data-automation="reviewCard"><span class="JguWG">Lovely octopus</span></div>
        <div data-automation="reviewCard"><span class="JguWG">Great service</span></div>
    </body></html>"#;

    HashMap::from([
        (site.listing_url(0), listing),
        (site.item_url(CAFEINA), detail.to_string()),
    ])
}

fn read_json(path: PathBuf) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn config(output_dir: &Path) -> AppConfig {
    AppConfig {
        pipeline: PipelineConfig {
            memory_threshold_percent: 100.0,
            ..PipelineConfig::default()
        },
        output_dir: output_dir.to_path_buf(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn run_writes_raw_and_normalized_output() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path();
    let finder = RestaurantFinder::with_renderer(config(out_dir), Arc::new(CannedPages(pages())));

    let summary = finder.run_once().await.unwrap();

    assert_eq!(summary.site, "TripAdvisor");
    assert_eq!(summary.listing_entries, 2);
    assert_eq!(summary.restaurants, 1);
    assert_eq!(summary.fetch_errors, 1);
    assert_eq!(summary.normalization_errors, 1);
    assert_eq!(summary.metrics.jobs_succeeded, 2);
    assert_eq!(summary.metrics.jobs_failed, 1);

    let raw = read_json(out_dir.join(RAW_OUTPUT_FILE));
    assert_eq!(raw.as_array().unwrap().len(), 2);
    assert_eq!(raw[0]["restaurant_name"], "1. Cafeína");
    assert_eq!(raw[0]["reviews"].as_array().unwrap().len(), 2);
    assert_eq!(raw[1]["metadata"], "unavailable");
    assert_eq!(raw[1]["reviews"], "unavailable");

    let restaurants = read_json(out_dir.join(RESTAURANTS_FILE));
    let cafeina = &restaurants.as_array().unwrap()[0];
    assert_eq!(restaurants.as_array().unwrap().len(), 1);
    assert_eq!(cafeina["name"], "Cafeína");
    assert_eq!(cafeina["listing_position"], 1);
    assert_eq!(cafeina["price_range"], "luxury");
    assert_eq!(cafeina["url"], format!("{}{}", tripadvisor::BASE_URL, CAFEINA));
    assert_eq!(cafeina["details"]["review_count"], 1234);
    assert_eq!(cafeina["reviews"][1]["text"], "Great service");
}

#[tokio::test]
async fn each_run_reports_only_its_own_jobs() {
    let dir = tempdir().unwrap();
    let site = tripadvisor::site("189180", 1, None).unwrap();
    let empty_listing = HashMap::from([(site.listing_url(0), "<html><body></body></html>".to_string())]);
    let finder = RestaurantFinder::with_renderer(config(dir.path()), Arc::new(CannedPages(empty_listing)));

    let first = finder.run_once().await.unwrap();
    let second = finder.run_once().await.unwrap();

    assert_eq!(first.metrics.jobs_succeeded, 1);
    assert_eq!(second.metrics.jobs_succeeded, 1);
    assert_eq!(second.metrics.jobs_failed, 0);
    assert_eq!(second.listing_entries, 0);
}
