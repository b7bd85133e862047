//! Rendered pages and the options a renderer honors

mod http;

pub use http::HttpRenderer;

use std::time::Duration;

use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::schema::CompiledSelector;

/// Longest accepted per-page timeout.
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(3600);

/// Whether a fetch may be answered from, and stored into, the page cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    Use,
    #[default]
    Bypass,
}

impl std::str::FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "use" | "enabled" => Ok(Self::Use),
            "bypass" | "disabled" => Ok(Self::Bypass),
            other => Err(format!("expected `use` or `bypass`, got `{other}`")),
        }
    }
}

/// Condition a rendered page must meet before it counts as loaded.
#[derive(Debug, Clone)]
pub enum ReadinessPredicate {
    /// At least one element matches.
    SelectorPresent(CompiledSelector),
    /// No element matches, e.g. a loading indicator has gone away.
    SelectorAbsent(CompiledSelector),
    /// At least `count` elements match.
    MinMatches { selector: CompiledSelector, count: usize },
}

impl ReadinessPredicate {
    pub fn present(selector: &str) -> Self {
        Self::SelectorPresent(CompiledSelector::new(selector))
    }

    pub fn absent(selector: &str) -> Self {
        Self::SelectorAbsent(CompiledSelector::new(selector))
    }

    pub fn min_matches(selector: &str, count: usize) -> Self {
        Self::MinMatches {
            selector: CompiledSelector::new(selector),
            count,
        }
    }

    pub fn is_satisfied(&self, body: &str) -> bool {
        let document = Html::parse_document(body);
        let count = |selector: &CompiledSelector| {
            selector
                .selector()
                .map_or(0, |sel| document.select(sel).count())
        };

        match self {
            Self::SelectorPresent(selector) => count(selector) > 0,
            Self::SelectorAbsent(selector) => count(selector) == 0,
            Self::MinMatches { selector, count: min } => count(selector) >= *min,
        }
    }
}

/// Per-call rendering options.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub cache_policy: CachePolicy,
    pub readiness: Option<ReadinessPredicate>,
    /// Upper bound for the whole fetch, readiness wait included.
    pub timeout: Duration,
    /// Extra attempts after a network error or a 5xx answer.
    pub retries: u32,
    pub poll_interval: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::Bypass,
            readiness: None,
            timeout: Duration::from_secs(60),
            retries: 1,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl RenderOptions {
    #[must_use]
    pub fn with_readiness(mut self, readiness: Option<ReadinessPredicate>) -> Self {
        self.readiness = readiness;
        self
    }
}

/// A page as handed over by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: String,
    pub body: String,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    /// Parses the body into a queryable DOM.
    ///
    /// The DOM is not `Send`; parse it where it is used and drop it before
    /// the next `.await`.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOADING: &str = r#"<div class="TSoOh"></div><div data-automation="reviewCard">r</div>"#;
    const LOADED: &str = r#"<div data-automation="reviewCard">r1</div><div data-automation="reviewCard">r2</div>"#;

    #[test]
    fn absent_predicate_waits_for_loading_bar_to_go() {
        let predicate = ReadinessPredicate::absent("div.TSoOh");

        assert!(!predicate.is_satisfied(LOADING));
        assert!(predicate.is_satisfied(LOADED));
    }

    #[test]
    fn present_and_min_matches() {
        assert!(ReadinessPredicate::present("div[data-automation='reviewCard']").is_satisfied(LOADING));
        assert!(!ReadinessPredicate::min_matches("div[data-automation='reviewCard']", 2).is_satisfied(LOADING));
        assert!(ReadinessPredicate::min_matches("div[data-automation='reviewCard']", 2).is_satisfied(LOADED));
    }

    #[test]
    fn unparsable_predicate_selector_matches_nothing() {
        assert!(!ReadinessPredicate::present("[[[").is_satisfied(LOADED));
        assert!(ReadinessPredicate::absent("[[[").is_satisfied(LOADED));
    }

    #[test]
    fn cache_policy_parses_both_spellings() {
        assert_eq!("use".parse::<CachePolicy>(), Ok(CachePolicy::Use));
        assert_eq!("BYPASS".parse::<CachePolicy>(), Ok(CachePolicy::Bypass));
        assert!("sometimes".parse::<CachePolicy>().is_err());
    }
}
