//! Query parsing
//!
//! Assembles extracted entities into a [`ParsedQuerySpec`] plus a display
//! summary. Results are memoized per exact query string in a small LRU.

use crate::extract::{Entities, EntityExtractor};
use chrono::NaiveDate;
use lru::LruCache;
use nestfind_core::text::title_case;
use nestfind_core::ParsedQuerySpec;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Upper bound of the open-ended display price range
pub const OPEN_PRICE_CEILING: f64 = 9999.0;

/// Human-facing digest of a parsed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySummary {
    /// Title-cased group, else neighborhood
    pub location: Option<String>,
    pub amenities: Vec<String>,
    /// `[min, max]`, `[0, max]` or `[min, 9999]`
    pub price_range: Option<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub raw_query: String,
    #[serde(flatten)]
    pub spec: ParsedQuerySpec,
    pub summary: QuerySummary,
}

impl ParsedQuery {
    pub fn from_entities(raw_query: &str, entities: Entities) -> Self {
        let mut spec = ParsedQuerySpec {
            amenities: entities.amenities,
            neighborhoods: entities.neighborhoods,
            groups: entities.groups,
            room_type: entities.room_type,
            property_type: entities.property_type,
            guests: entities.numeric.guests,
            nights: entities.numeric.nights,
            ..Default::default()
        };
        spec.set_price(entities.numeric.price_min, entities.numeric.price_max);
        if let Some(dates) = entities.numeric.dates {
            spec.set_dates(dates.checkin, dates.checkout);
        }

        let summary = summarize(&spec);
        Self {
            raw_query: raw_query.to_string(),
            spec,
            summary,
        }
    }
}

fn summarize(spec: &ParsedQuerySpec) -> QuerySummary {
    let location = spec
        .groups
        .iter()
        .next()
        .or_else(|| spec.neighborhoods.iter().next())
        .map(|l| title_case(l));

    let mut amenities: Vec<String> = spec.amenities.iter().cloned().collect();
    amenities.sort_by(|a, b| {
        (!a.is_ascii(), a.len(), a).cmp(&(!b.is_ascii(), b.len(), b))
    });

    let price_range = match (spec.price_min, spec.price_max) {
        (Some(min), Some(max)) => Some([min, max]),
        (None, Some(max)) => Some([0.0, max]),
        (Some(min), None) => Some([min, OPEN_PRICE_CEILING]),
        (None, None) => None,
    };

    QuerySummary {
        location,
        amenities,
        price_range,
    }
}

/// Parser front end with an optional LRU memo. Entries are keyed by the
/// query and the day relative dates resolved against, so "tomorrow" is
/// never served from a previous day.
pub struct QueryParser {
    cache: Option<Mutex<LruCache<(NaiveDate, String), Arc<ParsedQuery>>>>,
}

impl QueryParser {
    /// A capacity of zero disables memoization.
    pub fn new(cache_size: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(cache_size).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn parse(&self, extractor: &EntityExtractor<'_>, query: &str) -> Arc<ParsedQuery> {
        let key = (extractor.reference_date(), query.to_string());
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(&key) {
                debug!("Query cache hit: {:?}", query);
                return Arc::clone(hit);
            }
        }

        // Extraction runs outside the lock
        let parsed = Arc::new(ParsedQuery::from_entities(query, extractor.extract(query)));

        if let Some(cache) = &self.cache {
            cache.lock().put(key, Arc::clone(&parsed));
        }
        parsed
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}

impl std::fmt::Debug for QueryParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryParser")
            .field("cached_queries", &self.cached_queries())
            .finish()
    }
}
