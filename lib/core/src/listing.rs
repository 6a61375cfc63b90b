use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub type ListingId = String;

/// One rental listing of the corpus.
///
/// Field aliases accept the column names of the usual listings export
/// (`neighbourhood_cleansed`, `review_scores_rating`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: ListingId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub neighborhood_overview: Option<String>,
    /// Explicit display text; derived from name/description when absent
    #[serde(default)]
    pub display_text: Option<String>,
    pub price: f64,
    pub accommodates: u32,
    #[serde(default, alias = "minimum_nights")]
    pub min_nights: Option<u32>,
    #[serde(default, alias = "maximum_nights")]
    pub max_nights: Option<u32>,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default, alias = "neighbourhood_cleansed", alias = "neighbourhood")]
    pub neighborhood: Option<String>,
    #[serde(default, alias = "neighbourhood_group_cleansed", alias = "neighbourhood_group")]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amenities")]
    pub amenities: Vec<String>,
    #[serde(default, alias = "review_scores_rating", alias = "rating_score")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub number_of_reviews: u32,
    #[serde(default)]
    pub price_per_guest: Option<f64>,
    #[serde(default)]
    pub has_availability: Option<bool>,
}

impl Listing {
    /// Minimal listing used by tests and builders.
    pub fn new(id: impl Into<String>, price: f64, accommodates: u32) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            neighborhood_overview: None,
            display_text: None,
            price,
            accommodates,
            min_nights: None,
            max_nights: None,
            room_type: None,
            property_type: None,
            neighborhood: None,
            group: None,
            amenities: Vec::new(),
            rating: None,
            number_of_reviews: 0,
            price_per_guest: None,
            has_availability: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, neighborhood: impl Into<String>, group: impl Into<String>) -> Self {
        self.neighborhood = Some(neighborhood.into());
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_types(mut self, room_type: impl Into<String>, property_type: impl Into<String>) -> Self {
        self.room_type = Some(room_type.into());
        self.property_type = Some(property_type.into());
        self
    }

    #[must_use]
    pub fn with_amenities<I, S>(mut self, amenities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.amenities = dedup_amenities(amenities.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    #[must_use]
    pub fn with_nights(mut self, min: u32, max: u32) -> Self {
        self.min_nights = Some(min);
        self.max_nights = Some(max);
        self
    }

    /// Text indexed for semantic and lexical matching.
    pub fn display_text(&self) -> String {
        if let Some(text) = self.display_text.as_deref().map(str::trim) {
            if !text.is_empty() {
                return text.to_string();
            }
        }
        let name = self.name.as_deref().unwrap_or("").trim();
        let mut desc = self.description.as_deref().unwrap_or("").trim();
        if desc.is_empty() {
            desc = self.neighborhood_overview.as_deref().unwrap_or("").trim();
        }
        match (name.is_empty(), desc.is_empty()) {
            (true, true) => String::new(),
            (false, true) => name.to_string(),
            (true, false) => desc.to_string(),
            (false, false) => format!("{}. {}", name, desc),
        }
    }

    /// Price per guest: explicit value if present, else price / capacity.
    /// `None` when capacity is zero.
    pub fn price_per_guest(&self) -> Option<f64> {
        match self.price_per_guest {
            Some(p) if p.is_finite() => Some(p),
            _ if self.accommodates > 0 => Some(self.price / f64::from(self.accommodates)),
            _ => None,
        }
    }

    /// Data-contract checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::configuration("listing with empty id"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::configuration(format!(
                "listing {} has invalid price {}",
                self.id, self.price
            )));
        }
        Ok(())
    }
}

/// Parse a bracketed, comma-separated amenity string such as
/// `["Wifi", "Kitchen"]` or `{Wifi,Kitchen}`.
pub fn parse_amenity_list(raw: &str) -> Vec<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '{' | '}'))
        .collect();
    dedup_amenities(cleaned.split(',').map(|p| p.to_string()))
}

/// Lowercase, trim, unquote and deduplicate, keeping first occurrence.
fn dedup_amenities<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let cleaned = item
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_lowercase();
        if !cleaned.is_empty() && seen.insert(cleaned.clone()) {
            out.push(cleaned);
        }
    }
    out
}

fn deserialize_amenities<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => dedup_amenities(items.into_iter().filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        })),
        Value::String(s) => parse_amenity_list(&s),
        _ => Vec::new(),
    })
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid listing id: {other}"))),
    }
}
