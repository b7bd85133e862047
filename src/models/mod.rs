//! Data models for restaurant records and Discord webhook payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serialized form of [`SubRecord::Unavailable`].
pub const UNAVAILABLE: &str = "unavailable";

/// Data from a secondary page: either what was extracted, or a marker that
/// the page could not be obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum SubRecord<T> {
    Available(T),
    Unavailable,
}

impl<T> SubRecord<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn as_available(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SubRecord<U> {
        match self {
            Self::Available(v) => SubRecord::Available(f(v)),
            Self::Unavailable => SubRecord::Unavailable,
        }
    }
}

impl<T: Serialize> Serialize for SubRecord<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Available(v) => v.serialize(serializer),
            Self::Unavailable => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for SubRecord<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Marker(String),
            Value(T),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Marker(s) if s == UNAVAILABLE => Ok(Self::Unavailable),
            Repr::Marker(s) => Err(serde::de::Error::custom(format!(
                "expected a record or `{UNAVAILABLE}`, got `{s}`"
            ))),
            Repr::Value(v) => Ok(Self::Available(v)),
        }
    }
}

/// Price band derived from the site's dollar-sign notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceTier {
    Cheap,
    CheapModerate,
    Moderate,
    ModerateExpensive,
    Expensive,
    ExpensiveLuxury,
    Luxury,
}

impl PriceTier {
    /// Looks up a dollar-sign range such as `"$$ - $$$"`; whitespace is ignored.
    pub fn from_symbols(symbols: &str) -> Option<Self> {
        let compact: String = symbols.chars().filter(|c| !c.is_whitespace()).collect();
        let tier = match compact.as_str() {
            "$" => Self::Cheap,
            "$-$$" => Self::CheapModerate,
            "$$" => Self::Moderate,
            "$$-$$$" => Self::ModerateExpensive,
            "$$$" => Self::Expensive,
            "$$$-$$$$" => Self::ExpensiveLuxury,
            "$$$$" => Self::Luxury,
            _ => return None,
        };
        Some(tier)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::CheapModerate => "cheap-moderate",
            Self::Moderate => "moderate",
            Self::ModerateExpensive => "moderate-expensive",
            Self::Expensive => "expensive",
            Self::ExpensiveLuxury => "expensive-luxury",
            Self::Luxury => "luxury",
        }
    }
}

/// A restaurant assembled from its listing entry, detail page and reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    /// Rank shown in the listing (`"29. Pedro Lemos"` gives 29).
    pub listing_position: Option<u32>,
    /// Relative path from the listing; the join key.
    pub path: String,
    pub url: String,
    pub rating: Option<f32>,
    pub cuisine: Option<String>,
    pub price_range: Option<PriceTier>,
    pub michelin: Option<String>,
    pub details: SubRecord<RestaurantDetails>,
    pub reviews: SubRecord<Vec<Review>>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestaurantDetails {
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub ranking: Option<String>,
    pub summary: Option<String>,
    pub highlights: Vec<Highlight>,
    pub opening_hours: Vec<OpeningHours>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub cuisines: Vec<String>,
    pub meal_types: Vec<String>,
    pub special_diets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub category: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub day: String,
    pub times: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub text: String,
}

/// Discord embed structure for rich notifications
#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<DiscordField>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}
