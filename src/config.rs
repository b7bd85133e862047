//! Runtime configuration
//!
//! Everything configurable is collected into [`AppConfig`] once, in `main`,
//! after `.env` has been loaded. Components receive the parts they need
//! through their constructors and never read the environment themselves.
//!
//! ## Environment variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `CACHE_POLICY` | `bypass` | `use` or `bypass` the renderer's page cache |
//! | `MAX_CONCURRENCY` | `10` | detail pages fetched in parallel |
//! | `MEMORY_THRESHOLD_PERCENT` | `70` | no new fetch is admitted above this memory use |
//! | `MEMORY_CHECK_INTERVAL_MS` | `1000` | how often memory pressure is re-checked |
//! | `FETCH_TIMEOUT_SECS` | `60` | per-page timeout (1 to 3600), readiness wait included |
//! | `FETCH_RETRIES` | `1` | retries after transient fetch failures |
//! | `GEO_ID` | `189180` | listing area (Porto) |
//! | `MAX_LISTING_PAGES` | `1` | listing pages to walk |
//! | `OUTPUT_DIR` | `output` | where JSON results are written |
//! | `SCHEMA_DIR` | unset | directory with `listing.json`, `detail.json`, `reviews.json` overrides |
//! | `CRAWL_SCHEDULE` | unset | cron expression for repeated runs |
//! | `DISCORD_WEBHOOK_URL` | unset | where run summaries are posted |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::renderer::{CachePolicy, MAX_FETCH_TIMEOUT};

/// Options recognized by the extraction pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub cache_policy: CachePolicy,
    pub max_concurrency: usize,
    pub memory_threshold_percent: f64,
    pub timeout: Duration,
    pub retries: u32,
    pub check_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::Bypass,
            max_concurrency: 10,
            memory_threshold_percent: 70.0,
            timeout: Duration::from_secs(60),
            retries: 1,
            check_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub geo_id: String,
    pub max_listing_pages: u32,
    pub output_dir: PathBuf,
    pub schema_dir: Option<PathBuf>,
    pub schedule: Option<String>,
    pub discord_webhook_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            geo_id: "189180".to_string(),
            max_listing_pages: 1,
            output_dir: PathBuf::from("output"),
            schema_dir: None,
            schedule: None,
            discord_webhook_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from any variable source; unset or blank
    /// variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        let pipeline = defaults.pipeline.clone();

        let max_concurrency: usize = parse_or(&get, "MAX_CONCURRENCY", pipeline.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(invalid("MAX_CONCURRENCY", "0", "must be at least 1"));
        }

        let memory_threshold_percent: f64 =
            parse_or(&get, "MEMORY_THRESHOLD_PERCENT", pipeline.memory_threshold_percent)?;
        if !(memory_threshold_percent > 0.0 && memory_threshold_percent <= 100.0) {
            return Err(invalid(
                "MEMORY_THRESHOLD_PERCENT",
                &memory_threshold_percent.to_string(),
                "must be in (0, 100]",
            ));
        }

        let timeout_secs: u64 = parse_or(&get, "FETCH_TIMEOUT_SECS", pipeline.timeout.as_secs())?;
        if !(1..=MAX_FETCH_TIMEOUT.as_secs()).contains(&timeout_secs) {
            return Err(invalid(
                "FETCH_TIMEOUT_SECS",
                &timeout_secs.to_string(),
                &format!("must be between 1 and {}", MAX_FETCH_TIMEOUT.as_secs()),
            ));
        }

        let pipeline = PipelineConfig {
            cache_policy: parse_or(&get, "CACHE_POLICY", pipeline.cache_policy)?,
            max_concurrency,
            memory_threshold_percent,
            timeout: Duration::from_secs(timeout_secs),
            retries: parse_or(&get, "FETCH_RETRIES", pipeline.retries)?,
            check_interval: Duration::from_millis(parse_or(
                &get,
                "MEMORY_CHECK_INTERVAL_MS",
                u64::try_from(pipeline.check_interval.as_millis()).unwrap_or(1000),
            )?),
        };

        Ok(Self {
            pipeline,
            geo_id: get("GEO_ID").unwrap_or(defaults.geo_id),
            max_listing_pages: parse_or(&get, "MAX_LISTING_PAGES", defaults.max_listing_pages)?,
            output_dir: get("OUTPUT_DIR").map_or(defaults.output_dir, PathBuf::from),
            schema_dir: get("SCHEMA_DIR").map(PathBuf::from),
            schedule: get("CRAWL_SCHEDULE"),
            discord_webhook_url: get("DISCORD_WEBHOOK_URL"),
        })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value.parse().map_err(|e: T::Err| invalid(var, &value, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.pipeline.max_concurrency, 10);
        assert_eq!(config.pipeline.cache_policy, CachePolicy::Bypass);
    }

    #[test]
    fn reads_all_pipeline_options() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CACHE_POLICY", "use"),
            ("MAX_CONCURRENCY", "4"),
            ("MEMORY_THRESHOLD_PERCENT", "85.5"),
            ("FETCH_TIMEOUT_SECS", "30"),
            ("FETCH_RETRIES", "3"),
            ("MAX_LISTING_PAGES", "2"),
            ("SCHEMA_DIR", "schemas"),
            ("CRAWL_SCHEDULE", "0 0 */6 * * *"),
        ]))
        .unwrap();

        assert_eq!(config.pipeline.cache_policy, CachePolicy::Use);
        assert_eq!(config.pipeline.max_concurrency, 4);
        assert!((config.pipeline.memory_threshold_percent - 85.5).abs() < f64::EPSILON);
        assert_eq!(config.pipeline.timeout, Duration::from_secs(30));
        assert_eq!(config.pipeline.retries, 3);
        assert_eq!(config.max_listing_pages, 2);
        assert_eq!(config.schema_dir, Some(PathBuf::from("schemas")));
        assert_eq!(config.schedule.as_deref(), Some("0 0 */6 * * *"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("DISCORD_WEBHOOK_URL", "  ")])).unwrap();

        assert!(config.discord_webhook_url.is_none());
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let err = AppConfig::from_lookup(lookup(&[("MAX_CONCURRENCY", "ten")])).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { var: "MAX_CONCURRENCY", .. }));
    }

    #[test]
    fn zero_concurrency_and_bad_threshold_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("MAX_CONCURRENCY", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("MEMORY_THRESHOLD_PERCENT", "120")])).is_err());
    }

    #[test]
    fn fetch_timeout_must_be_positive_and_bounded() {
        for value in ["0", "3601", "18446744073709551615"] {
            let err = AppConfig::from_lookup(lookup(&[("FETCH_TIMEOUT_SECS", value)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var: "FETCH_TIMEOUT_SECS", .. }), "{value}");
        }

        let config = AppConfig::from_lookup(lookup(&[("FETCH_TIMEOUT_SECS", "3600")])).unwrap();
        assert_eq!(config.pipeline.timeout, MAX_FETCH_TIMEOUT);
    }
}
