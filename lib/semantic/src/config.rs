//! Engine configuration
//!
//! Every field has a serde default so a partial JSON document only needs
//! to name what it overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Acceptance thresholds of the similarity + margin protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MatchThresholds {
    /// Minimum best-match cosine similarity
    pub absolute: f32,
    /// Minimum gap between best and second-best similarity
    #[serde(default)]
    pub margin: f32,
}

impl MatchThresholds {
    pub const fn new(absolute: f32, margin: f32) -> Self {
        Self { absolute, margin }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractorThresholds {
    pub amenity: MatchThresholds,
    pub neighborhood: MatchThresholds,
    pub group: MatchThresholds,
    pub room_type: MatchThresholds,
    pub property_type: MatchThresholds,
}

impl Default for ExtractorThresholds {
    fn default() -> Self {
        Self {
            amenity: MatchThresholds::new(0.60, 0.06),
            neighborhood: MatchThresholds::new(0.68, 0.06),
            group: MatchThresholds::new(0.60, 0.0),
            room_type: MatchThresholds::new(0.58, 0.05),
            property_type: MatchThresholds::new(0.58, 0.05),
        }
    }
}

impl ExtractorThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("amenity", self.amenity),
            ("neighborhood", self.neighborhood),
            ("group", self.group),
            ("room_type", self.room_type),
            ("property_type", self.property_type),
        ];
        for (name, t) in all {
            if !(-1.0..=1.0).contains(&t.absolute) || !(0.0..=2.0).contains(&t.margin) {
                return Err(ConfigError::ThresholdOutOfRange(name));
            }
        }
        Ok(())
    }
}

/// Weights of the four ranking signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankWeights {
    pub semantic: f32,
    pub lexical: f32,
    pub rating: f32,
    pub price: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            semantic: 0.55,
            lexical: 0.20,
            rating: 0.15,
            price: 0.10,
        }
    }
}

impl RankWeights {
    pub fn sum(&self) -> f32 {
        self.semantic + self.lexical + self.rating + self.price
    }

    /// Reject negative weights and rescale so the weights sum to 1.0,
    /// which keeps the composite score inside [0, 1].
    pub fn validate_and_normalize(&mut self) -> Result<(), ConfigError> {
        for (name, w) in [
            ("semantic", self.semantic),
            ("lexical", self.lexical),
            ("rating", self.rating),
            ("price", self.price),
        ] {
            if w < 0.0 || !w.is_finite() {
                return Err(ConfigError::NegativeWeight(name));
            }
        }

        let total = self.sum();
        if total <= 0.0 {
            return Err(ConfigError::ZeroTotalWeight);
        }
        if (total - 1.0).abs() > 0.001 {
            self.semantic /= total;
            self.lexical /= total;
            self.rating /= total;
            self.price /= total;
        }
        Ok(())
    }
}

/// Amenity clustering parameters. The cluster count is
/// `clamp(|V| / tokens_per_cluster, min_clusters, max_clusters)`, capped at
/// the vocabulary size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterParams {
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub tokens_per_cluster: usize,
    pub seed: u64,
    pub max_iterations: usize,
    /// Clusters whose centroids are at least this similar are unioned
    pub merge_similarity: f32,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_clusters: 60,
            max_clusters: 300,
            tokens_per_cluster: 8,
            seed: 42,
            max_iterations: 100,
            merge_similarity: 0.92,
        }
    }
}

impl ClusterParams {
    pub fn cluster_count(&self, vocabulary_size: usize) -> usize {
        let raw = vocabulary_size / self.tokens_per_cluster.max(1);
        raw.clamp(self.min_clusters, self.max_clusters)
            .min(vocabulary_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: ExtractorThresholds,
    pub weights: RankWeights,
    pub clustering: ClusterParams,
    /// Maximum listing rating (100 for percentage scores, 5 for stars)
    pub rating_scale: f32,
    /// Minimum document frequency of lexical index terms
    pub lexical_min_df: usize,
    /// Distinct query strings memoized by the parser; 0 disables the cache
    pub query_cache_size: usize,
    /// Reject corpora where a neighborhood appears under two groups.
    /// When false, the last pairing seen wins and a warning is logged.
    pub strict_geography: bool,
    /// Default number of hits returned by `SearchIndex::search`
    pub result_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ExtractorThresholds::default(),
            weights: RankWeights::default(),
            clustering: ClusterParams::default(),
            rating_scale: 100.0,
            lexical_min_df: 2,
            query_cache_size: 50,
            strict_geography: true,
            result_limit: 50,
        }
    }
}

impl EngineConfig {
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.weights.validate_and_normalize()?;
        if !(self.rating_scale > 0.0) {
            return Err(ConfigError::NonPositiveRatingScale);
        }
        if self.clustering.min_clusters > self.clustering.max_clusters {
            return Err(ConfigError::InvertedClusterBounds {
                min: self.clustering.min_clusters,
                max: self.clustering.max_clusters,
            });
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let mut weights = RankWeights::default();
        weights.validate_and_normalize().unwrap();
        assert!((weights.sum() - 1.0).abs() < 1e-6);
        assert!((weights.semantic - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_weights_normalized() {
        let mut weights = RankWeights {
            semantic: 2.0,
            lexical: 1.0,
            rating: 1.0,
            price: 0.0,
        };
        weights.validate_and_normalize().unwrap();
        assert!((weights.semantic - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut weights = RankWeights {
            price: -0.1,
            ..Default::default()
        };
        assert_eq!(
            weights.validate_and_normalize(),
            Err(ConfigError::NegativeWeight("price"))
        );
    }

    #[test]
    fn test_cluster_count_scaling() {
        let params = ClusterParams::default();
        assert_eq!(params.cluster_count(3), 3);
        assert_eq!(params.cluster_count(200), 60);
        assert_eq!(params.cluster_count(1600), 200);
        assert_eq!(params.cluster_count(10_000), 300);
        assert_eq!(params.cluster_count(0), 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(
            r#"{"rating_scale": 5.0, "thresholds": {"amenity": {"absolute": 0.7}}}"#,
        )
        .unwrap();
        assert_eq!(config.rating_scale, 5.0);
        assert_eq!(config.thresholds.amenity.absolute, 0.7);
        assert_eq!(config.thresholds.amenity.margin, 0.0);
        assert_eq!(config.thresholds.neighborhood, MatchThresholds::new(0.68, 0.06));
        assert_eq!(config.query_cache_size, 50);
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let mut config = EngineConfig {
            rating_scale: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveRatingScale));
    }
}
