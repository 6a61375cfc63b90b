//! Score explanations
//!
//! Every ranked hit keeps its four normalized signals. These types turn
//! them into per-signal weighted contributions for display.

use crate::config::RankWeights;
use crate::parser::ParsedQuery;
use crate::rerank::RankedHit;
use nestfind_core::{Listing, ListingId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Normalized ranking signals of one candidate, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalBreakdown {
    pub semantic: f32,
    pub lexical: f32,
    pub rating: f32,
    pub price: f32,
}

impl SignalBreakdown {
    /// Weighted sum, clamped to [0, 1].
    pub fn composite(&self, weights: &RankWeights) -> f32 {
        (weights.semantic * self.semantic
            + weights.lexical * self.lexical
            + weights.rating * self.rating
            + weights.price * self.price)
            .clamp(0.0, 1.0)
    }

    /// Per-signal contributions (already weighted)
    pub fn weighted(&self, weights: &RankWeights) -> BTreeMap<String, f32> {
        [
            ("semantic", weights.semantic * self.semantic),
            ("lexical", weights.lexical * self.lexical),
            ("rating", weights.rating * self.rating),
            ("price", weights.price * self.price),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// A ranked listing ready for output.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainedHit {
    pub id: ListingId,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<BTreeMap<String, f32>>,
}

impl ExplainedHit {
    pub fn new(hit: &RankedHit, listing: &Listing, weights: Option<&RankWeights>) -> Self {
        Self {
            id: hit.id.clone(),
            score: hit.score,
            name: listing.name.clone(),
            price: listing.price,
            rating: listing.rating,
            explain: weights.map(|w| hit.signals.weighted(w)),
        }
    }
}

/// Parsed query plus the ranked page of results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: ParsedQuery,
    /// Listings that passed the filter, before truncation
    pub total_candidates: usize,
    pub result: Vec<ExplainedHit>,
}
