//! Normalization of raw extracted records into [`Restaurant`]s
//!
//! Listing records are joined with detail and review records on the
//! listing's relative URL. Each listing entry either becomes a restaurant or
//! produces exactly one [`NormalizationError`]; a bad entry never stops the
//! rest of the batch.

use std::collections::HashMap;

use chrono::Utc;
use tracing::warn;

use crate::error::NormalizationError;
use crate::extract::{ExtractedRecord, FieldValue};
use crate::models::{
    Highlight, OpeningHours, PriceTier, Restaurant, RestaurantDetails, Review, SubRecord,
};
use crate::pipeline::CrawlOutput;
use crate::sites::item_url;
use crate::sites::tripadvisor::{BOILERPLATE, fields};

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub restaurants: Vec<Restaurant>,
    pub errors: Vec<NormalizationError>,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    base_url: String,
    boilerplate: Vec<String>,
}

impl Normalizer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            boilerplate: BOILERPLATE.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Joins `listings` with their detail and review records, keyed by the
    /// listing's relative URL. Entries without a match are marked unavailable.
    pub fn normalize(
        &self,
        listings: &[ExtractedRecord],
        details: &HashMap<String, SubRecord<ExtractedRecord>>,
        reviews: &HashMap<String, SubRecord<Vec<ExtractedRecord>>>,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let no_details = SubRecord::Unavailable;
        let no_reviews = SubRecord::Unavailable;

        for (position, listing) in listings.iter().enumerate() {
            let key = non_empty(listing.text(fields::URL));
            let detail = key.and_then(|k| details.get(k)).unwrap_or(&no_details);
            let review = key.and_then(|k| reviews.get(k)).unwrap_or(&no_reviews);

            match self.restaurant(position, listing, detail, review) {
                Ok(restaurant) => batch.restaurants.push(restaurant),
                Err(e) => {
                    warn!("Skipping listing entry: {}", e);
                    batch.errors.push(e);
                }
            }
        }

        batch
    }

    /// Normalizes everything a crawl produced.
    pub fn normalize_crawl(&self, output: &CrawlOutput) -> NormalizedBatch {
        let listings: Vec<ExtractedRecord> = output.items.iter().map(|i| i.listing.clone()).collect();

        let mut details = HashMap::new();
        let mut reviews = HashMap::new();
        for item in &output.items {
            if let Some(key) = &item.key {
                details.insert(key.clone(), item.details.clone());
                reviews.insert(key.clone(), item.reviews.clone());
            }
        }

        self.normalize(&listings, &details, &reviews)
    }

    fn restaurant(
        &self,
        position: usize,
        listing: &ExtractedRecord,
        detail: &SubRecord<ExtractedRecord>,
        reviews: &SubRecord<Vec<ExtractedRecord>>,
    ) -> Result<Restaurant, NormalizationError> {
        let Some(path) = non_empty(listing.text(fields::URL)) else {
            return Err(NormalizationError::MissingField {
                item: format!("listing entry #{}", position + 1),
                field: fields::URL,
            });
        };
        let item = path.to_string();

        let raw_name = non_empty(listing.text(fields::NAME))
            .or_else(|| detail.as_available().and_then(|d| non_empty(d.text(fields::NAME))))
            .ok_or_else(|| NormalizationError::MissingField {
                item: item.clone(),
                field: fields::NAME,
            })?;
        let (listing_position, name) = split_rank(raw_name);

        let price_symbols = non_empty(listing.text(fields::PRICE_RANGE))
            .or_else(|| detail.as_available().and_then(|d| non_empty(d.text(fields::PRICE_RANGE))));
        let price_range = price_symbols
            .map(|symbols| {
                PriceTier::from_symbols(symbols).ok_or_else(|| NormalizationError::UnknownPriceRange {
                    item: item.clone(),
                    value: symbols.to_string(),
                })
            })
            .transpose()?;

        let details = match detail {
            SubRecord::Available(record) => SubRecord::Available(self.details(&item, record)?),
            SubRecord::Unavailable => SubRecord::Unavailable,
        };

        Ok(Restaurant {
            id: format!("{:x}", md5::compute(path)),
            name: name.to_string(),
            listing_position,
            path: path.to_string(),
            url: item_url(&self.base_url, path),
            rating: parse_rating(&item, listing.text(fields::RATING))?,
            cuisine: non_empty(listing.text(fields::CUISINE)).map(str::to_string),
            price_range,
            michelin: non_empty(listing.text(fields::MICHELIN)).map(str::to_string),
            details,
            reviews: reviews.clone().map(|records| records.iter().filter_map(review).collect()),
            scraped_at: Utc::now(),
        })
    }

    fn details(&self, item: &str, record: &ExtractedRecord) -> Result<RestaurantDetails, NormalizationError> {
        Ok(RestaurantDetails {
            rating: parse_rating(item, record.text(fields::RATING))?,
            review_count: record.text(fields::REVIEW_COUNT).and_then(parse_count),
            ranking: non_empty(record.text(fields::RANKING)).map(str::to_string),
            summary: record
                .text(fields::REVIEW_SUMMARY)
                .map(|s| self.strip_boilerplate(s))
                .filter(|s| !s.is_empty()),
            highlights: nested(record, fields::AI_HIGHLIGHTS)
                .filter_map(|h| {
                    Some(Highlight {
                        category: non_empty(h.text(fields::CATEGORY))?.to_string(),
                        value: non_empty(h.text(fields::VALUE)).map(str::to_string),
                    })
                })
                .collect(),
            opening_hours: nested(record, fields::SCHEDULE)
                .filter_map(|s| {
                    Some(OpeningHours {
                        day: non_empty(s.text(fields::DAY))?.to_string(),
                        times: non_empty(s.text(fields::TIMES)).map(str::to_string),
                    })
                })
                .collect(),
            address: non_empty(record.text(fields::ADDRESS)).map(str::to_string),
            website: non_empty(record.text(fields::WEBSITE)).map(str::to_string),
            cuisines: split_list(record.text(fields::DETAILED_CUISINES)),
            meal_types: split_list(record.text(fields::MEAL_TYPES)),
            special_diets: split_list(record.text(fields::SPECIAL_DIETS)),
        })
    }

    fn strip_boilerplate(&self, text: &str) -> String {
        self.boilerplate
            .iter()
            .fold(text.to_string(), |acc, phrase| acc.replace(phrase.as_str(), ""))
            .trim()
            .to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `"29. Pedro Lemos"` -> `(Some(29), "Pedro Lemos")`.
fn split_rank(raw: &str) -> (Option<u32>, &str) {
    if let Some((rank, rest)) = raw.split_once(". ")
        && let Ok(rank) = rank.trim().parse()
        && !rest.trim().is_empty()
    {
        return (Some(rank), rest.trim());
    }
    (None, raw)
}

fn parse_rating(item: &str, raw: Option<&str>) -> Result<Option<f32>, NormalizationError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };

    let value: f32 = raw.parse().map_err(|_| NormalizationError::InvalidRating {
        item: item.to_string(),
        value: raw.to_string(),
    })?;

    if !(0.0..=5.0).contains(&value) {
        return Err(NormalizationError::RatingOutOfRange {
            item: item.to_string(),
            value,
        });
    }
    Ok(Some(value))
}

/// `"1,234 reviews"` -> `1234`.
fn parse_count(raw: &str) -> Option<u32> {
    let digits: String = raw
        .split_whitespace()
        .next()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    non_empty(raw)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn nested<'a>(record: &'a ExtractedRecord, field: &str) -> impl Iterator<Item = &'a ExtractedRecord> {
    record
        .get(field)
        .and_then(FieldValue::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(FieldValue::as_record)
}

fn review(record: &ExtractedRecord) -> Option<Review> {
    non_empty(record.text(fields::REVIEW_TEXT)).map(|text| Review { text: text.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &str) -> FieldValue {
        FieldValue::Text(v.to_string())
    }

    fn listing(name: &str, url: &str, rating: &str, price: Option<&str>) -> ExtractedRecord {
        [
            (fields::NAME, text(name)),
            (fields::RATING, text(rating)),
            (fields::CUISINE, text("Mediterranean, European")),
            (fields::PRICE_RANGE, price.map_or(FieldValue::Null, text)),
            (fields::URL, text(url)),
            (fields::MICHELIN, FieldValue::Null),
        ]
        .into_iter()
        .collect()
    }

    fn no_joins() -> (
        HashMap<String, SubRecord<ExtractedRecord>>,
        HashMap<String, SubRecord<Vec<ExtractedRecord>>>,
    ) {
        (HashMap::new(), HashMap::new())
    }

    #[test]
    fn four_dollars_is_luxury() {
        let (details, reviews) = no_joins();
        let batch = Normalizer::new("https://www.tripadvisor.com").normalize(
            &[listing("29. Pedro Lemos Restaurante", "/d1.html", "4.5", Some("$$$$"))],
            &details,
            &reviews,
        );

        assert!(batch.errors.is_empty());
        let restaurant = &batch.restaurants[0];
        assert_eq!(restaurant.price_range, Some(PriceTier::Luxury));
        assert_eq!(serde_json::to_value(restaurant.price_range).unwrap(), "luxury");
        assert_eq!(restaurant.name, "Pedro Lemos Restaurante");
        assert_eq!(restaurant.listing_position, Some(29));
        assert_eq!(restaurant.rating, Some(4.5));
        assert_eq!(restaurant.url, "https://www.tripadvisor.com/d1.html");
        assert_eq!(restaurant.id, format!("{:x}", md5::compute("/d1.html")));
        assert_eq!(restaurant.details, SubRecord::Unavailable);
    }

    #[test]
    fn unknown_price_is_reported_and_skipped() {
        let (details, reviews) = no_joins();
        let batch = Normalizer::new("https://www.tripadvisor.com").normalize(
            &[
                listing("A", "/a.html", "4.0", Some("???")),
                listing("B", "/b.html", "4.0", Some("$$")),
            ],
            &details,
            &reviews,
        );

        assert_eq!(batch.restaurants.len(), 1);
        assert_eq!(batch.restaurants[0].name, "B");
        assert_eq!(
            batch.errors,
            vec![NormalizationError::UnknownPriceRange {
                item: "/a.html".into(),
                value: "???".into(),
            }]
        );
    }

    #[test]
    fn bad_ratings_fail_only_their_record() {
        let (details, reviews) = no_joins();
        let batch = Normalizer::new("https://www.tripadvisor.com").normalize(
            &[
                listing("A", "/a.html", "great", None),
                listing("B", "/b.html", "7.5", None),
                listing("C", "/c.html", "3.0", None),
            ],
            &details,
            &reviews,
        );

        assert_eq!(batch.restaurants.len(), 1);
        assert!(matches!(batch.errors[0], NormalizationError::InvalidRating { .. }));
        assert!(matches!(batch.errors[1], NormalizationError::RatingOutOfRange { value, .. } if value == 7.5));
    }

    #[test]
    fn missing_join_key_is_an_error() {
        let (details, reviews) = no_joins();
        let mut record = listing("A", "", "4.0", None);
        record.insert(fields::URL, FieldValue::Null);

        let batch = Normalizer::new("https://www.tripadvisor.com").normalize(&[record], &details, &reviews);

        assert!(matches!(
            batch.errors[0],
            NormalizationError::MissingField { field: fields::URL, .. }
        ));
    }

    #[test]
    fn details_and_reviews_are_joined_by_path() {
        let highlight: ExtractedRecord = [(fields::CATEGORY, text("Food")), (fields::VALUE, text("Excellent"))]
            .into_iter()
            .collect();
        let hours: ExtractedRecord = [(fields::DAY, text("Mon")), (fields::TIMES, text("12:00 PM - 3:00 PM"))]
            .into_iter()
            .collect();
        let detail: ExtractedRecord = [
            (fields::RATING, text("4.6")),
            (fields::REVIEW_COUNT, text("1,234 reviews")),
            (fields::REVIEW_SUMMARY, text("Creative tasting menus. Jump to all reviews")),
            (fields::AI_HIGHLIGHTS, FieldValue::List(vec![FieldValue::Record(highlight)])),
            (fields::SCHEDULE, FieldValue::List(vec![FieldValue::Record(hours)])),
            (fields::ADDRESS, text("Rua Padre Luis Cabral 974, Porto")),
            (fields::DETAILED_CUISINES, text("Mediterranean, European, Portuguese")),
            (fields::SPECIAL_DIETS, FieldValue::Null),
        ]
        .into_iter()
        .collect();
        let review_record: ExtractedRecord = [(fields::REVIEW_TEXT, text("Unforgettable."))].into_iter().collect();
        let empty_review: ExtractedRecord = [(fields::REVIEW_TEXT, FieldValue::Null)].into_iter().collect();

        let details = HashMap::from([("/d1.html".to_string(), SubRecord::Available(detail))]);
        let reviews = HashMap::from([(
            "/d1.html".to_string(),
            SubRecord::Available(vec![review_record, empty_review]),
        )]);

        let batch = Normalizer::new("https://www.tripadvisor.com").normalize(
            &[listing("Pedro Lemos", "/d1.html", "4.5", Some("$$$$"))],
            &details,
            &reviews,
        );

        let restaurant = &batch.restaurants[0];
        let details = restaurant.details.as_available().unwrap();
        assert_eq!(details.rating, Some(4.6));
        assert_eq!(details.review_count, Some(1234));
        assert_eq!(details.summary.as_deref(), Some("Creative tasting menus."));
        assert_eq!(details.highlights[0].category, "Food");
        assert_eq!(details.opening_hours[0].times.as_deref(), Some("12:00 PM - 3:00 PM"));
        assert_eq!(details.cuisines, vec!["Mediterranean", "European", "Portuguese"]);
        assert!(details.special_diets.is_empty());
        assert_eq!(
            restaurant.reviews,
            SubRecord::Available(vec![Review {
                text: "Unforgettable.".into()
            }])
        );
    }

    #[test]
    fn rank_prefix_is_only_split_when_numeric() {
        assert_eq!(split_rank("1. O Buraco"), (Some(1), "O Buraco"));
        assert_eq!(split_rank("St. Peter's"), (None, "St. Peter's"));
        assert_eq!(split_rank("Cafeína"), (None, "Cafeína"));
    }
}
