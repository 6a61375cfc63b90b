//! Similarity + margin + lexical-gate matching
//!
//! A phrase is matched against a pool of labelled targets. The best target
//! is accepted only when its similarity clears an absolute threshold, beats
//! the runner-up by a margin, and shares at least one token with the phrase.

use crate::config::MatchThresholds;
use nestfind_core::text::{content_tokens, word_tokens};
use nestfind_core::Vector;
use std::collections::BTreeSet;
use tracing::debug;

/// Anything a phrase can be matched against.
pub trait MatchTarget {
    fn label(&self) -> &str;
    fn embedding(&self) -> &Vector;
    fn gate_tokens(&self) -> &BTreeSet<String>;
}

/// Tokens used by the lexical gate: content tokens, or every word when the
/// text has no content tokens (short labels such as "tv").
pub fn gate_tokens(text: &str) -> BTreeSet<String> {
    let tokens = content_tokens(text);
    if tokens.is_empty() {
        word_tokens(text).into_iter().collect()
    } else {
        tokens
    }
}

/// Best and second-best similarity over a target pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestTwo {
    pub index: usize,
    pub best: f32,
    /// -1.0 when the pool has a single target
    pub second: f32,
}

impl BestTwo {
    pub fn margin(&self) -> f32 {
        if self.second < 0.0 {
            f32::INFINITY
        } else {
            self.best - self.second
        }
    }

    fn passes(&self, thresholds: MatchThresholds) -> bool {
        self.best >= thresholds.absolute
            && (self.second < 0.0 || self.best - self.second >= thresholds.margin)
    }
}

/// Ties keep the lowest index.
pub fn best_two<T: MatchTarget>(query: &Vector, targets: &[T]) -> Option<BestTwo> {
    let mut iter = targets
        .iter()
        .map(|t| query.cosine_similarity(t.embedding()))
        .enumerate();
    let (first_idx, first_sim) = iter.next()?;
    let mut top = BestTwo {
        index: first_idx,
        best: first_sim,
        second: -1.0,
    };
    let mut have_second = false;
    for (i, sim) in iter {
        if sim > top.best {
            top.second = top.best;
            top.best = sim;
            top.index = i;
        } else if !have_second || sim > top.second {
            top.second = sim;
        }
        have_second = true;
    }
    Some(top)
}

/// Which token set corroborates a semantic match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalGate {
    /// Phrase tokens must intersect the label tokens
    Phrase,
    /// Phrase tokens or, failing that, whole-query tokens
    PhraseOrQuery,
}

/// How a match was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    /// Similarity, margin and lexical gate all held
    Semantic,
    /// Only the whole query shares tokens with the best label
    QueryTokens,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub index: usize,
    pub similarity: f32,
    pub evidence: Evidence,
}

/// A query phrase ready for matching.
#[derive(Debug, Clone)]
pub struct Phrase {
    pub text: String,
    pub tokens: BTreeSet<String>,
    pub embedding: Vector,
}

impl Phrase {
    pub fn new(text: impl Into<String>, embedding: Vector) -> Self {
        let text = text.into();
        let tokens = gate_tokens(&text);
        Self {
            text,
            tokens,
            embedding,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    field: &'static str,
    thresholds: MatchThresholds,
    gate: LexicalGate,
    query_fallback: bool,
}

impl Matcher {
    pub fn new(field: &'static str, thresholds: MatchThresholds, gate: LexicalGate) -> Self {
        Self {
            field,
            thresholds,
            gate,
            query_fallback: false,
        }
    }

    /// Also accept the best label whenever the whole query shares a token
    /// with it, regardless of similarity.
    #[must_use]
    pub fn with_query_fallback(mut self) -> Self {
        self.query_fallback = true;
        self
    }

    pub fn thresholds(&self) -> MatchThresholds {
        self.thresholds
    }

    pub fn match_phrase<T: MatchTarget>(
        &self,
        phrase: &Phrase,
        query_tokens: &BTreeSet<String>,
        targets: &[T],
    ) -> Option<Match> {
        let top = best_two(&phrase.embedding, targets)?;
        let target = &targets[top.index];
        let label_tokens = target.gate_tokens();
        let query_overlap = || !query_tokens.is_disjoint(label_tokens);

        if top.passes(self.thresholds) {
            let phrase_overlap = !phrase.tokens.is_disjoint(label_tokens);
            let gated = match self.gate {
                LexicalGate::Phrase => phrase_overlap,
                LexicalGate::PhraseOrQuery => phrase_overlap || query_overlap(),
            };
            if gated {
                return Some(Match {
                    index: top.index,
                    similarity: top.best,
                    evidence: Evidence::Semantic,
                });
            }
            debug!(
                field = self.field,
                phrase = %phrase.text,
                label = target.label(),
                similarity = top.best,
                "Near miss: no lexical overlap"
            );
        } else if top.best >= self.thresholds.absolute {
            debug!(
                field = self.field,
                phrase = %phrase.text,
                label = target.label(),
                similarity = top.best,
                margin = top.margin(),
                "Near miss: ambiguous match rejected"
            );
        }

        if self.query_fallback && query_overlap() {
            return Some(Match {
                index: top.index,
                similarity: top.best,
                evidence: Evidence::QueryTokens,
            });
        }
        None
    }

    /// Distinct accepted target indices over all phrases, in first-accepted order.
    pub fn match_all<T: MatchTarget>(
        &self,
        phrases: &[Phrase],
        query_tokens: &BTreeSet<String>,
        targets: &[T],
    ) -> Vec<Match> {
        let mut seen = BTreeSet::new();
        phrases
            .iter()
            .filter_map(|p| self.match_phrase(p, query_tokens, targets))
            .filter(|m| seen.insert(m.index))
            .collect()
    }

    /// Single best accepted target over all phrases, by similarity.
    /// Earlier phrases win ties.
    pub fn match_best<T: MatchTarget>(
        &self,
        phrases: &[Phrase],
        query_tokens: &BTreeSet<String>,
        targets: &[T],
    ) -> Option<Match> {
        phrases
            .iter()
            .filter_map(|p| self.match_phrase(p, query_tokens, targets))
            .fold(None, |best: Option<Match>, m| match best {
                Some(b) if b.similarity >= m.similarity => Some(b),
                _ => Some(m),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Target {
        label: String,
        embedding: Vector,
        tokens: BTreeSet<String>,
    }

    impl Target {
        fn new(label: &str, embedding: &[f32]) -> Self {
            Self {
                label: label.to_string(),
                embedding: Vector::from_slice(embedding).normalized(),
                tokens: gate_tokens(label),
            }
        }
    }

    impl MatchTarget for Target {
        fn label(&self) -> &str {
            &self.label
        }
        fn embedding(&self) -> &Vector {
            &self.embedding
        }
        fn gate_tokens(&self) -> &BTreeSet<String> {
            &self.tokens
        }
    }

    fn phrase(text: &str, embedding: &[f32]) -> Phrase {
        Phrase::new(text, Vector::from_slice(embedding).normalized())
    }

    fn pool() -> Vec<Target> {
        vec![
            Target::new("pool", &[1.0, 0.0, 0.0]),
            Target::new("tool shed", &[0.9, 0.43, 0.0]),
            Target::new("kitchen", &[0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn test_best_two() {
        let top = best_two(&Vector::from_slice(&[1.0, 0.0, 0.0]), &pool()).unwrap();
        assert_eq!(top.index, 0);
        assert!((top.best - 1.0).abs() < 1e-6);
        assert!(top.second > 0.8 && top.second < 1.0);

        let single = vec![Target::new("kitchen", &[0.0, 0.0, 1.0])];
        let top = best_two(&Vector::from_slice(&[0.0, 0.0, 1.0]), &single).unwrap();
        assert_eq!(top.second, -1.0);

        let empty: Vec<Target> = Vec::new();
        assert!(best_two(&Vector::from_slice(&[1.0]), &empty).is_none());
    }

    #[test]
    fn test_margin_rejects_ambiguous() {
        let matcher = Matcher::new("amenity", MatchThresholds::new(0.6, 0.2), LexicalGate::Phrase);
        let p = phrase("pool", &[1.0, 0.0, 0.0]);
        assert!(matcher.match_phrase(&p, &p.tokens, &pool()).is_none());

        let loose = Matcher::new("amenity", MatchThresholds::new(0.6, 0.01), LexicalGate::Phrase);
        let m = loose.match_phrase(&p, &p.tokens, &pool()).unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.evidence, Evidence::Semantic);
    }

    #[test]
    fn test_lexical_gate_required() {
        let matcher = Matcher::new("amenity", MatchThresholds::new(0.5, 0.0), LexicalGate::Phrase);
        // Embeds close to "pool" but shares no token with it
        let p = phrase("swimming", &[1.0, 0.0, 0.0]);
        let query_tokens = gate_tokens("swimming");
        assert!(matcher.match_phrase(&p, &query_tokens, &pool()).is_none());
    }

    #[test]
    fn test_query_gate_fallback() {
        let matcher = Matcher::new("room_type", MatchThresholds::new(0.5, 0.0), LexicalGate::PhraseOrQuery);
        let p = phrase("swimming", &[1.0, 0.0, 0.0]);
        let query_tokens = gate_tokens("swimming pool");
        assert_eq!(matcher.match_phrase(&p, &query_tokens, &pool()).unwrap().index, 0);
    }

    #[test]
    fn test_query_token_fallback_ignores_thresholds() {
        let matcher = Matcher::new("amenity", MatchThresholds::new(0.99, 0.5), LexicalGate::Phrase)
            .with_query_fallback();
        let p = phrase("kitchenette", &[0.1, 0.0, 1.0]);
        let query_tokens = gate_tokens("kitchen kitchenette");
        let m = matcher.match_phrase(&p, &query_tokens, &pool()).unwrap();
        assert_eq!(m.index, 2);
        assert_eq!(m.evidence, Evidence::QueryTokens);
    }

    #[test]
    fn test_margin_monotonicity() {
        let phrases = vec![
            phrase("pool", &[1.0, 0.0, 0.0]),
            phrase("tool shed", &[0.9, 0.43, 0.0]),
            phrase("kitchen", &[0.1, 0.0, 1.0]),
            phrase("pool kitchen", &[0.7, 0.0, 0.7]),
        ];
        let query_tokens = gate_tokens("pool tool shed kitchen");
        let mut previous = usize::MAX;
        for margin in [0.0, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0] {
            let matcher =
                Matcher::new("amenity", MatchThresholds::new(0.5, margin), LexicalGate::Phrase)
                    .with_query_fallback();
            let accepted = matcher.match_all(&phrases, &query_tokens, &pool()).len();
            assert!(accepted <= previous);
            previous = accepted;
        }
    }

    #[test]
    fn test_match_best_prefers_highest_similarity() {
        let matcher = Matcher::new("room_type", MatchThresholds::new(0.5, 0.0), LexicalGate::Phrase);
        let phrases = vec![
            phrase("pool kitchen", &[0.6, 0.0, 0.8]),
            phrase("kitchen", &[0.0, 0.0, 1.0]),
        ];
        let query_tokens = gate_tokens("pool kitchen");
        let m = matcher.match_best(&phrases, &query_tokens, &pool()).unwrap();
        assert_eq!(m.index, 2);
        assert!((m.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gate_tokens_short_labels() {
        assert_eq!(gate_tokens("TV"), ["tv".to_string()].into_iter().collect());
        assert_eq!(gate_tokens("Private room"), ["private".to_string()].into_iter().collect());
    }
}
