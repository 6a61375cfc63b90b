//! Hybrid reranking
//!
//! Candidates are scored by a weighted sum of semantic similarity, lexical
//! similarity, rating and inverse price per guest, then ordered by score,
//! rating and price. The sort is stable, so exact ties keep input order.

use crate::config::RankWeights;
use crate::explain::SignalBreakdown;
use nestfind_core::{Listing, ListingId, Vector};
use std::cmp::Ordering;

/// Price signal when a listing's per-guest price is unknown
pub const NEUTRAL_PRICE_SIGNAL: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    /// Position in the corpus
    pub index: usize,
    pub id: ListingId,
    /// Composite score in [0, 1]
    pub score: f32,
    pub signals: SignalBreakdown,
}

/// Everything the ranker reads for one query.
pub struct RankInputs<'a> {
    pub listings: &'a [Listing],
    pub embeddings: &'a [Vector],
    pub query_embedding: &'a Vector,
    /// Min-max normalized lexical similarity of every corpus listing
    pub lexical: &'a [f32],
}

#[derive(Debug, Clone)]
pub struct HybridRanker {
    weights: RankWeights,
    rating_scale: f32,
}

impl HybridRanker {
    /// `weights` are expected to be validated and normalized.
    pub fn new(weights: RankWeights, rating_scale: f32) -> Self {
        Self {
            weights,
            rating_scale,
        }
    }

    pub fn weights(&self) -> &RankWeights {
        &self.weights
    }

    /// Score and order candidates given as corpus indices.
    pub fn rank(&self, candidates: &[usize], inputs: &RankInputs<'_>) -> Vec<RankedHit> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let per_guest: Vec<Option<f64>> = candidates
            .iter()
            .map(|&i| inputs.listings[i].price_per_guest())
            .collect();
        let (min, max) = per_guest.iter().flatten().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &p| (lo.min(p), hi.max(p)),
        );

        let mut hits: Vec<RankedHit> = candidates
            .iter()
            .zip(&per_guest)
            .map(|(&i, ppg)| {
                let listing = &inputs.listings[i];
                let signals = SignalBreakdown {
                    semantic: semantic_signal(inputs.query_embedding, inputs.embeddings.get(i)),
                    lexical: inputs.lexical.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0),
                    rating: self.rating_signal(listing),
                    price: price_signal(*ppg, min, max),
                };
                RankedHit {
                    index: i,
                    id: listing.id.clone(),
                    score: signals.composite(&self.weights),
                    signals,
                }
            })
            .collect();

        // Vec::sort_by is stable
        hits.sort_by(|a, b| {
            let (la, lb) = (&inputs.listings[a.index], &inputs.listings[b.index]);
            b.score
                .total_cmp(&a.score)
                .then_with(|| rating_of(lb).total_cmp(&rating_of(la)))
                .then_with(|| la.price.partial_cmp(&lb.price).unwrap_or(Ordering::Equal))
        });
        hits
    }

    fn rating_signal(&self, listing: &Listing) -> f32 {
        (rating_of(listing) as f32 / self.rating_scale).clamp(0.0, 1.0)
    }
}

fn rating_of(listing: &Listing) -> f64 {
    listing.rating.filter(|r| r.is_finite()).unwrap_or(0.0)
}

/// Cosine similarity rescaled from [-1, 1] to [0, 1].
fn semantic_signal(query: &Vector, listing: Option<&Vector>) -> f32 {
    listing
        .map(|v| ((query.cosine_similarity(v) + 1.0) / 2.0).clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

/// Cheaper is better. Equal prices normalize to 0 and score 1.
fn price_signal(per_guest: Option<f64>, min: f64, max: f64) -> f32 {
    match per_guest {
        Some(p) if max > min => (1.0 - ((p - min) / (max - min)).clamp(0.0, 1.0)) as f32,
        Some(_) => 1.0,
        None => NEUTRAL_PRICE_SIGNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, price: f64, accommodates: u32, rating: f64) -> Listing {
        Listing::new(id, price, accommodates).with_rating(rating)
    }

    fn unit(data: &[f32]) -> Vector {
        Vector::from_slice(data).normalized()
    }

    struct Corpus {
        listings: Vec<Listing>,
        embeddings: Vec<Vector>,
        lexical: Vec<f32>,
        query: Vector,
    }

    impl Corpus {
        fn inputs(&self) -> RankInputs<'_> {
            RankInputs {
                listings: &self.listings,
                embeddings: &self.embeddings,
                query_embedding: &self.query,
                lexical: &self.lexical,
            }
        }
    }

    fn ranker() -> HybridRanker {
        HybridRanker::new(RankWeights::default(), 100.0)
    }

    #[test]
    fn test_semantic_dominates() {
        let corpus = Corpus {
            listings: vec![listing("far", 50.0, 2, 90.0), listing("near", 50.0, 2, 90.0)],
            embeddings: vec![unit(&[0.0, 1.0]), unit(&[1.0, 0.0])],
            lexical: vec![0.0, 0.0],
            query: unit(&[1.0, 0.0]),
        };
        let hits = ranker().rank(&[0, 1], &corpus.inputs());
        assert_eq!(hits[0].id, "near");
        assert!((hits[0].signals.semantic - 1.0).abs() < 1e-6);
        assert!((hits[1].signals.semantic - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_scores_bounded() {
        let corpus = Corpus {
            listings: vec![
                listing("a", 10.0, 1, 100.0),
                listing("b", 500.0, 2, 0.0),
                Listing::new("c", 80.0, 0).with_rating(250.0),
            ],
            embeddings: vec![unit(&[1.0, 0.0]), unit(&[-1.0, 0.0]), unit(&[0.3, 0.7])],
            lexical: vec![1.0, 0.0, 0.5],
            query: unit(&[1.0, 0.0]),
        };
        for hit in ranker().rank(&[0, 1, 2], &corpus.inputs()) {
            assert!((0.0..=1.0).contains(&hit.score), "score {} out of range", hit.score);
        }
    }

    #[test]
    fn test_stable_tie_break() {
        let corpus = Corpus {
            listings: vec![
                listing("x", 100.0, 2, 90.0),
                listing("y", 100.0, 2, 90.0),
                listing("z", 100.0, 2, 90.0),
            ],
            embeddings: vec![unit(&[1.0, 0.0]); 3],
            lexical: vec![0.0; 3],
            query: unit(&[1.0, 0.0]),
        };
        let ids: Vec<String> = ranker()
            .rank(&[2, 0, 1], &corpus.inputs())
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_rating_then_price_break_score_ties() {
        // Zero weight on rating and price makes every score equal
        let ranker = HybridRanker::new(
            RankWeights {
                semantic: 1.0,
                lexical: 0.0,
                rating: 0.0,
                price: 0.0,
            },
            100.0,
        );
        let corpus = Corpus {
            listings: vec![
                listing("cheap_low", 50.0, 2, 80.0),
                listing("pricey_high", 200.0, 2, 95.0),
                listing("cheap_high", 60.0, 2, 95.0),
            ],
            embeddings: vec![unit(&[1.0, 0.0]); 3],
            lexical: vec![0.0; 3],
            query: unit(&[1.0, 0.0]),
        };
        let ids: Vec<String> = ranker
            .rank(&[0, 1, 2], &corpus.inputs())
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["cheap_high", "pricey_high", "cheap_low"]);
    }

    #[test]
    fn test_price_signal() {
        assert_eq!(price_signal(Some(10.0), 10.0, 50.0), 1.0);
        assert_eq!(price_signal(Some(50.0), 10.0, 50.0), 0.0);
        assert_eq!(price_signal(Some(30.0), 30.0, 30.0), 1.0);
        assert_eq!(price_signal(None, 10.0, 50.0), NEUTRAL_PRICE_SIGNAL);
    }

    #[test]
    fn test_zero_capacity_gets_neutral_price() {
        let corpus = Corpus {
            listings: vec![Listing::new("nobody", 100.0, 0), listing("two", 100.0, 2, 0.0)],
            embeddings: vec![unit(&[1.0]); 2],
            lexical: vec![0.0; 2],
            query: unit(&[1.0]),
        };
        let hits = ranker().rank(&[0, 1], &corpus.inputs());
        let nobody = hits.iter().find(|h| h.id == "nobody").unwrap();
        assert_eq!(nobody.signals.price, NEUTRAL_PRICE_SIGNAL);
    }

    #[test]
    fn test_empty_candidates() {
        let corpus = Corpus {
            listings: Vec::new(),
            embeddings: Vec::new(),
            lexical: Vec::new(),
            query: unit(&[1.0]),
        };
        assert!(ranker().rank(&[], &corpus.inputs()).is_empty());
    }
}
