//! Entity extraction
//!
//! Matches query phrases against the amenity catalog and the label pools,
//! and runs the numeric extractors. A failure in one field never affects
//! another: an embedding error leaves the semantic fields empty but still
//! yields prices, counts and dates.

use crate::amenity::AmenityCanonicalizer;
use crate::config::ExtractorThresholds;
use crate::matcher::{gate_tokens, LexicalGate, Matcher, Phrase};
use crate::numeric::{extract_numeric, DateResolver, NumericFields};
use crate::phrases::candidate_phrases;
use crate::pools::{LabelPools, PoolField};
use chrono::NaiveDate;
use nestfind_core::text::normalize;
use nestfind_core::{Embedder, Result as CoreResult};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Embedded candidate phrases of one query.
#[derive(Debug, Clone)]
pub struct QueryPhrases {
    pub normalized_query: String,
    pub query_tokens: BTreeSet<String>,
    pub phrases: Vec<Phrase>,
    /// The whole query as one extra phrase, used for location and types
    pub whole_query: Phrase,
}

impl QueryPhrases {
    fn with_whole_query(&self) -> Vec<Phrase> {
        let mut all = self.phrases.clone();
        all.push(self.whole_query.clone());
        all
    }
}

/// Everything extracted from one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    pub amenities: BTreeSet<String>,
    pub neighborhoods: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub room_type: Option<String>,
    pub property_type: Option<String>,
    pub numeric: NumericFields,
}

pub struct EntityExtractor<'a> {
    embedder: &'a dyn Embedder,
    amenities: &'a AmenityCanonicalizer,
    pools: &'a LabelPools,
    thresholds: &'a ExtractorThresholds,
    dates: &'a dyn DateResolver,
}

impl<'a> EntityExtractor<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        amenities: &'a AmenityCanonicalizer,
        pools: &'a LabelPools,
        thresholds: &'a ExtractorThresholds,
        dates: &'a dyn DateResolver,
    ) -> Self {
        Self {
            embedder,
            amenities,
            pools,
            thresholds,
            dates,
        }
    }

    /// Day that relative dates in a query resolve against.
    pub fn reference_date(&self) -> NaiveDate {
        self.dates.reference()
    }

    /// Extract and embed the candidate phrases (one batch call, the whole
    /// query last).
    pub fn prepare(&self, query: &str) -> CoreResult<QueryPhrases> {
        let normalized_query = normalize(query);
        let mut texts = candidate_phrases(query);
        texts.push(normalized_query.clone());

        let mut embeddings = self.embedder.embed_batch(&texts)?;
        if embeddings.len() != texts.len() {
            return Err(nestfind_core::Error::Embedding(format!(
                "expected {} phrase embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        let whole_embedding = embeddings.pop().unwrap_or_default();
        texts.pop();

        let phrases = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| Phrase::new(text, embedding))
            .collect();
        Ok(QueryPhrases {
            query_tokens: gate_tokens(&normalized_query),
            whole_query: Phrase::new(normalized_query.clone(), whole_embedding),
            normalized_query,
            phrases,
        })
    }

    /// Representative labels of the requested amenity families.
    pub fn amenities(&self, prepared: &QueryPhrases) -> BTreeSet<String> {
        if self.amenities.is_empty() {
            return BTreeSet::new();
        }
        Matcher::new("amenity", self.thresholds.amenity, LexicalGate::Phrase)
            .with_query_fallback()
            .match_all(&prepared.phrases, &prepared.query_tokens, self.amenities.catalog())
            .into_iter()
            .map(|m| self.amenities.catalog()[m.index].representative_label.clone())
            .collect()
    }

    /// Normalized neighborhoods and groups. Neighborhoods outside every
    /// matched group are dropped.
    pub fn locations(&self, prepared: &QueryPhrases) -> (BTreeSet<String>, BTreeSet<String>) {
        let phrases = prepared.with_whole_query();
        let group_pool = self.pools.pool(PoolField::Group);
        let neighborhood_pool = self.pools.pool(PoolField::Neighborhood);

        let mut groups: BTreeSet<String> =
            Matcher::new("group", self.thresholds.group, LexicalGate::Phrase)
                .match_all(&phrases, &prepared.query_tokens, group_pool)
                .into_iter()
                .map(|m| group_pool[m.index].normalized_value.clone())
                .collect();
        let mut neighborhoods: BTreeSet<String> =
            Matcher::new("neighborhood", self.thresholds.neighborhood, LexicalGate::Phrase)
                .match_all(&phrases, &prepared.query_tokens, neighborhood_pool)
                .into_iter()
                .map(|m| neighborhood_pool[m.index].normalized_value.clone())
                .collect();

        // Literal mentions count even when the embedding gate rejects them
        let query = &prepared.normalized_query;
        groups.extend(
            self.pools
                .mentioned_in(PoolField::Group, query)
                .map(|e| e.normalized_value.clone()),
        );
        neighborhoods.extend(
            self.pools
                .mentioned_in(PoolField::Neighborhood, query)
                .map(|e| e.normalized_value.clone()),
        );

        if !groups.is_empty() {
            neighborhoods.retain(|n| {
                let keep = self
                    .pools
                    .group_of(n)
                    .map(|g| groups.contains(g))
                    .unwrap_or(false);
                if !keep {
                    debug!(neighborhood = %n, "Dropping neighborhood outside matched groups");
                }
                keep
            });
        }
        (neighborhoods, groups)
    }

    pub fn room_type(&self, prepared: &QueryPhrases) -> Option<String> {
        self.best_label(PoolField::RoomType, prepared)
    }

    pub fn property_type(&self, prepared: &QueryPhrases) -> Option<String> {
        self.best_label(PoolField::PropertyType, prepared)
    }

    fn best_label(&self, field: PoolField, prepared: &QueryPhrases) -> Option<String> {
        let (name, thresholds) = match field {
            PoolField::RoomType => ("room_type", self.thresholds.room_type),
            PoolField::PropertyType => ("property_type", self.thresholds.property_type),
            PoolField::Neighborhood => ("neighborhood", self.thresholds.neighborhood),
            PoolField::Group => ("group", self.thresholds.group),
        };
        let pool = self.pools.pool(field);
        Matcher::new(name, thresholds, LexicalGate::PhraseOrQuery)
            .match_best(&prepared.with_whole_query(), &prepared.query_tokens, pool)
            .map(|m| pool[m.index].normalized_value.clone())
    }

    /// Run every extractor over a query.
    pub fn extract(&self, query: &str) -> Entities {
        let numeric = extract_numeric(query, self.dates);
        let prepared = match self.prepare(query) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Embedding failed for query {:?}: {}", query, e);
                return Entities {
                    numeric,
                    ..Default::default()
                };
            }
        };

        let (neighborhoods, groups) = self.locations(&prepared);
        Entities {
            amenities: self.amenities(&prepared),
            neighborhoods,
            groups,
            room_type: self.room_type(&prepared),
            property_type: self.property_type(&prepared),
            numeric,
        }
    }
}
