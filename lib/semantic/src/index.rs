//! The frozen search index
//!
//! [`SearchIndex`] is built once from a listing corpus and is read-only
//! afterwards. Every query operation takes `&self`; the only interior
//! mutability is the parser's memo, which never changes results.

use crate::amenity::{AmenityAssignment, AmenityCanonicalizer};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::explain::{ExplainedHit, SearchResponse};
use crate::extract::EntityExtractor;
use crate::numeric::{ChronoDateResolver, DateResolver};
use crate::parser::{ParsedQuery, QueryParser};
use crate::pools::LabelPools;
use crate::rerank::{HybridRanker, RankInputs, RankedHit};
use crate::Result;
use ahash::AHashMap;
use nestfind_core::text::normalize;
use nestfind_core::{
    Embedder, Error as CoreError, LexicalIndex, Listing, ListingFilter, ListingId, ParsedQuerySpec, Vector,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum review count for featured listings
const FEATURED_MIN_REVIEWS: u32 = 5;
const FEATURED_RATING_SHARE: f64 = 0.9;
const FEATURED_RELAXED_RATING_SHARE: f64 = 0.8;

/// The expensive, model-dependent part of a build. Persisting it lets a
/// restart skip embedding the corpus and clustering amenities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexArtifacts {
    pub listing_embeddings: Vec<Vector>,
    pub amenities: AmenityAssignment,
}

/// Read-only view of one indexed listing.
#[derive(Debug, Clone, Copy)]
pub struct ListingIndexEntry<'a> {
    pub listing: &'a Listing,
    pub display_text: &'a str,
    pub embedding: &'a Vector,
    pub lexical_row: &'a [(usize, f32)],
    pub amenities: &'a BTreeSet<String>,
}

pub struct SearchIndex {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    date_resolver: Arc<dyn DateResolver>,
    listings: Vec<Listing>,
    positions: AHashMap<ListingId, usize>,
    display_texts: Vec<String>,
    embeddings: Vec<Vector>,
    amenity_sets: Vec<BTreeSet<String>>,
    lexical: LexicalIndex,
    canonicalizer: AmenityCanonicalizer,
    assignment: AmenityAssignment,
    pools: LabelPools,
    parser: QueryParser,
    ranker: HybridRanker,
}

impl SearchIndex {
    /// Build every index from scratch.
    pub fn build(listings: Vec<Listing>, embedder: Arc<dyn Embedder>, config: EngineConfig) -> Result<Self> {
        Self::assemble(listings, embedder, config, None)
    }

    /// Build reusing persisted embeddings and amenity clustering.
    pub fn from_artifacts(
        listings: Vec<Listing>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
        artifacts: IndexArtifacts,
    ) -> Result<Self> {
        Self::assemble(listings, embedder, config, Some(artifacts))
    }

    fn assemble(
        listings: Vec<Listing>,
        embedder: Arc<dyn Embedder>,
        mut config: EngineConfig,
        artifacts: Option<IndexArtifacts>,
    ) -> Result<Self> {
        config.validate()?;

        let mut positions = AHashMap::with_capacity(listings.len());
        for (i, listing) in listings.iter().enumerate() {
            listing.validate()?;
            if positions.insert(listing.id.clone(), i).is_some() {
                return Err(CoreError::configuration(format!("duplicate listing id {}", listing.id)).into());
            }
        }
        info!("Building search index over {} listings", listings.len());

        let display_texts: Vec<String> = listings.iter().map(|l| normalize(&l.display_text())).collect();

        let (embeddings, assignment) = match artifacts {
            Some(artifacts) => {
                check_embeddings(&artifacts.listing_embeddings, listings.len(), embedder.dim())?;
                debug!("Reusing persisted listing embeddings and amenity clusters");
                (artifacts.listing_embeddings, artifacts.amenities)
            }
            None => {
                let amenity_lists: Vec<&[String]> = listings.iter().map(|l| l.amenities.as_slice()).collect();
                let assignment = AmenityAssignment::compute(&amenity_lists, embedder.as_ref(), &config.clustering)?;
                info!("Embedding {} listing texts", display_texts.len());
                let embeddings = embedder.embed_batch(&display_texts)?;
                check_embeddings(&embeddings, listings.len(), embedder.dim())?;
                (embeddings, assignment)
            }
        };

        let canonicalizer = AmenityCanonicalizer::from_assignment(&assignment)?;
        let amenity_sets: Vec<BTreeSet<String>> = listings
            .iter()
            .map(|l| canonicalizer.canonicalize_all(&l.amenities))
            .collect();
        let pools = LabelPools::build(&listings, embedder.as_ref(), config.strict_geography)?;
        let lexical = LexicalIndex::build(&display_texts, config.lexical_min_df);
        info!(
            "Lexical index: {} documents, {} terms",
            lexical.len(),
            lexical.vocabulary_size()
        );

        Ok(Self {
            parser: QueryParser::new(config.query_cache_size),
            ranker: HybridRanker::new(config.weights, config.rating_scale),
            date_resolver: Arc::new(ChronoDateResolver::live()),
            config,
            embedder,
            listings,
            positions,
            display_texts,
            embeddings,
            amenity_sets,
            lexical,
            canonicalizer,
            assignment,
            pools,
        })
    }

    /// Replace the date resolver (for a fixed reference date).
    #[must_use]
    pub fn with_date_resolver(mut self, resolver: Arc<dyn DateResolver>) -> Self {
        self.date_resolver = resolver;
        self.parser.clear_cache();
        self
    }

    /// Copy of the persistable build products.
    pub fn artifacts(&self) -> IndexArtifacts {
        IndexArtifacts {
            listing_embeddings: self.embeddings.clone(),
            amenities: self.assignment.clone(),
        }
    }

    fn extractor(&self) -> EntityExtractor<'_> {
        EntityExtractor::new(
            self.embedder.as_ref(),
            &self.canonicalizer,
            &self.pools,
            &self.config.thresholds,
            self.date_resolver.as_ref(),
        )
    }

    /// Structured spec and summary of a free-text query.
    pub fn parse_query(&self, query: &str) -> Arc<ParsedQuery> {
        self.parser.parse(&self.extractor(), query)
    }

    /// Ids of listings satisfying every predicate of `spec`, in corpus order.
    pub fn filter_listings(&self, spec: &ParsedQuerySpec) -> Result<Vec<ListingId>> {
        Ok(self
            .filter_indices(spec)?
            .into_iter()
            .map(|i| self.listings[i].id.clone())
            .collect())
    }

    fn filter_indices(&self, spec: &ParsedQuerySpec) -> Result<Vec<usize>> {
        Ok(ListingFilter::from_spec(spec).apply(&self.listings, Some(&self.amenity_sets))?)
    }

    /// Order candidates by hybrid score for a query.
    pub fn rank_listings(&self, candidates: &[ListingId], query: &str) -> Result<Vec<RankedHit>> {
        let indices = candidates
            .iter()
            .map(|id| {
                self.positions
                    .get(id)
                    .copied()
                    .ok_or_else(|| CoreError::ListingNotFound(id.clone()))
            })
            .collect::<std::result::Result<Vec<usize>, _>>()?;
        self.rank_indices(&indices, query)
    }

    fn rank_indices(&self, indices: &[usize], query: &str) -> Result<Vec<RankedHit>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(&normalize(query))?;
        let lexical = self.lexical.normalized_similarities(query);
        let inputs = RankInputs {
            listings: &self.listings,
            embeddings: &self.embeddings,
            query_embedding: &query_embedding,
            lexical: &lexical,
        };
        Ok(self.ranker.rank(indices, &inputs))
    }

    /// Parse, filter and rank; keep the top `limit` hits (the configured
    /// default when `None`).
    pub fn search(&self, query: &str, limit: Option<usize>, explain: bool) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let parsed = self.parse_query(query);
        let candidates = self.filter_indices(&parsed.spec)?;
        let total_candidates = candidates.len();
        let mut hits = self.rank_indices(&candidates, query)?;
        hits.truncate(limit.unwrap_or(self.config.result_limit));

        debug!(
            "Query {:?}: {} candidates, returning {}",
            query,
            total_candidates,
            hits.len()
        );

        let weights = explain.then(|| self.ranker.weights());
        Ok(SearchResponse {
            query: (*parsed).clone(),
            total_candidates,
            result: hits
                .iter()
                .map(|hit| ExplainedHit::new(hit, &self.listings[hit.index], weights))
                .collect(),
        })
    }

    /// Up to `n` well-reviewed listings, best rated first, corpus order on
    /// ties. Relaxes the rating bar when too few qualify.
    pub fn featured(&self, n: usize) -> Vec<&Listing> {
        let scale = f64::from(self.config.rating_scale);
        let strict: Vec<&Listing> = self
            .listings
            .iter()
            .filter(|l| {
                l.rating.is_some_and(|r| r >= FEATURED_RATING_SHARE * scale)
                    && l.number_of_reviews >= FEATURED_MIN_REVIEWS
            })
            .collect();
        let mut pool = if strict.len() >= n {
            strict
        } else {
            self.listings
                .iter()
                .filter(|l| l.rating.is_some_and(|r| r >= FEATURED_RELAXED_RATING_SHARE * scale))
                .collect()
        };
        pool.sort_by(|a, b| b.rating.unwrap_or(0.0).total_cmp(&a.rating.unwrap_or(0.0)));
        pool.truncate(n);
        pool
    }

    pub fn listing(&self, id: &str) -> Option<&Listing> {
        self.positions.get(id).map(|&i| &self.listings[i])
    }

    pub fn entry(&self, id: &str) -> Option<ListingIndexEntry<'_>> {
        let i = *self.positions.get(id)?;
        Some(ListingIndexEntry {
            listing: &self.listings[i],
            display_text: &self.display_texts[i],
            embedding: &self.embeddings[i],
            lexical_row: self.lexical.row(i).unwrap_or(&[]),
            amenities: &self.amenity_sets[i],
        })
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn amenities(&self) -> &AmenityCanonicalizer {
        &self.canonicalizer
    }

    pub fn pools(&self) -> &LabelPools {
        &self.pools
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn cached_queries(&self) -> usize {
        self.parser.cached_queries()
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("listings", &self.listings.len())
            .field("embedder", &self.embedder.id())
            .field("amenity_families", &self.canonicalizer.len())
            .field("parser", &self.parser)
            .finish()
    }
}

fn check_embeddings(embeddings: &[Vector], expected: usize, dim: usize) -> Result<()> {
    if embeddings.len() != expected {
        return Err(CoreError::configuration(format!(
            "{} listing embeddings for {} listings",
            embeddings.len(),
            expected
        ))
        .into());
    }
    if let Some(bad) = embeddings.iter().find(|v| v.dim() != dim) {
        return Err(CoreError::InvalidDimension {
            expected: dim,
            actual: bad.dim(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordEmbedder;
    use chrono::NaiveDate;
    use nestfind_core::HashEmbedder;

    fn scenario_listings() -> Vec<Listing> {
        vec![
            Listing::new("A", 60.0, 2)
                .with_name("Bright flat")
                .with_description("Cosy flat with wifi and a full kitchen")
                .with_rating(96.0)
                .with_amenities(["WiFi", "Kitchen"]),
            Listing::new("B", 150.0, 2)
                .with_name("Large loft")
                .with_description("Loft with wifi")
                .with_rating(84.0)
                .with_amenities(["WiFi"]),
        ]
    }

    fn index(listings: Vec<Listing>) -> SearchIndex {
        SearchIndex::build(listings, Arc::new(KeywordEmbedder::default()), EngineConfig::default())
            .unwrap()
            .with_date_resolver(Arc::new(ChronoDateResolver::new(
                NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            )))
    }

    #[test]
    fn test_wifi_under_budget_scenario() {
        let index = index(scenario_listings());
        let parsed = index.parse_query("under 100 euros with wifi");
        assert_eq!(parsed.spec.amenities, ["wifi".to_string()].into_iter().collect());
        assert_eq!(parsed.spec.price_max, Some(100.0));
        assert_eq!(parsed.spec.price_min, None);

        let filtered = index.filter_listings(&parsed.spec).unwrap();
        assert_eq!(filtered, vec!["A".to_string()]);

        let ranked = index.rank_listings(&filtered, "under 100 euros with wifi").unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "A");

        let response = index.search("under 100 euros with wifi", None, true).unwrap();
        assert_eq!(response.total_candidates, 1);
        assert_eq!(response.result[0].id, "A");
        assert!(response.result[0].explain.is_some());
        assert_eq!(response.query.summary.price_range, Some([0.0, 100.0]));
    }

    #[test]
    fn test_centro_group_keeps_centro_neighborhood() {
        let listings = vec![
            Listing::new("1", 80.0, 2).with_location("Centro", "Centro"),
            Listing::new("2", 90.0, 2).with_location("Sol", "Centro"),
            Listing::new("3", 70.0, 2).with_location("Recoletos", "Salamanca"),
        ];
        let index = index(listings);
        let parsed = index.parse_query("Centro");
        assert!(parsed.spec.groups.contains("centro"));
        assert!(parsed.spec.neighborhoods.contains("centro"));
        assert_eq!(parsed.summary.location.as_deref(), Some("Centro"));
        assert_eq!(index.filter_listings(&parsed.spec).unwrap(), vec!["1".to_string()]);
    }

    #[test]
    fn test_removing_predicate_never_shrinks_result() {
        let index = index(scenario_listings());
        let full = ParsedQuerySpec::new()
            .with_amenity("wifi")
            .with_price(None, Some(100.0))
            .with_guests(2);
        let base = index.filter_listings(&full).unwrap();

        let mut relaxed = full.clone();
        relaxed.price_max = None;
        let wider = index.filter_listings(&relaxed).unwrap();
        assert!(base.iter().all(|id| wider.contains(id)));
        assert_eq!(wider.len(), 2);

        let unconstrained = index.filter_listings(&ParsedQuerySpec::new()).unwrap();
        assert_eq!(unconstrained.len(), 2);
    }

    #[test]
    fn test_unknown_amenity_filters_everything() {
        let index = index(scenario_listings());
        let spec = ParsedQuerySpec::new().with_amenity("sauna");
        assert!(index.filter_listings(&spec).unwrap().is_empty());
        assert!(index.rank_listings(&[], "sauna").unwrap().is_empty());
    }

    #[test]
    fn test_rank_unknown_listing() {
        let index = index(scenario_listings());
        let err = index.rank_listings(&["Z".to_string()], "wifi").unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::ListingNotFound(ref id)) if id == "Z"));
    }

    #[test]
    fn test_empty_query_rejected() {
        let index = index(scenario_listings());
        assert!(matches!(index.search("   ", None, false), Err(Error::EmptyQuery)));
    }

    #[test]
    fn test_parse_is_memoized() {
        let index = index(scenario_listings());
        let first = index.parse_query("wifi for 2 guests");
        let second = index.parse_query("wifi for 2 guests");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(index.cached_queries(), 1);
    }

    #[test]
    fn test_cache_miss_matches_fresh_parse() {
        let cached = index(scenario_listings());
        let uncached = SearchIndex::build(
            scenario_listings(),
            Arc::new(KeywordEmbedder::default()),
            EngineConfig {
                query_cache_size: 0,
                ..Default::default()
            },
        )
        .unwrap()
        .with_date_resolver(Arc::new(ChronoDateResolver::new(
            NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        )));
        let query = "wifi from June 2 to June 6 under 120 euros";
        let a = cached.parse_query(query);
        let b = cached.parse_query(query);
        let c = uncached.parse_query(query);
        assert_eq!(*a, *b);
        assert_eq!(*a, *c);
        assert_eq!(c.spec.nights, Some(4));
        assert_eq!(uncached.cached_queries(), 0);
    }

    #[test]
    fn test_rebuild_from_artifacts() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
        let built = SearchIndex::build(scenario_listings(), embedder.clone(), EngineConfig::default()).unwrap();
        let restored = SearchIndex::from_artifacts(
            scenario_listings(),
            embedder,
            EngineConfig::default(),
            built.artifacts(),
        )
        .unwrap();
        assert_eq!(built.amenities().catalog(), restored.amenities().catalog());
        let a = built.rank_listings(&["A".into(), "B".into()], "loft with wifi").unwrap();
        let b = restored.rank_listings(&["A".into(), "B".into()], "loft with wifi").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_artifacts_for_wrong_corpus_rejected() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let built = SearchIndex::build(scenario_listings(), embedder.clone(), EngineConfig::default()).unwrap();
        let mut listings = scenario_listings();
        listings.push(Listing::new("C", 70.0, 1));
        let err = SearchIndex::from_artifacts(listings, embedder, EngineConfig::default(), built.artifacts())
            .unwrap_err();
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut listings = scenario_listings();
        listings.push(Listing::new("A", 10.0, 1));
        let err = SearchIndex::build(listings, Arc::new(HashEmbedder::new(16)), EngineConfig::default())
            .unwrap_err();
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_featured() {
        let mut listings: Vec<Listing> = (0..4)
            .map(|i| {
                let mut l = Listing::new(format!("L{i}"), 50.0, 2).with_rating(90.0 + i as f64);
                l.number_of_reviews = 10;
                l
            })
            .collect();
        listings.push(Listing::new("low", 50.0, 2).with_rating(82.0));
        let index = SearchIndex::build(listings, Arc::new(HashEmbedder::new(16)), EngineConfig::default()).unwrap();

        let ids: Vec<&str> = index.featured(3).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["L3", "L2", "L1"]);

        // Not enough strict matches: relaxed bar admits the 82-rated listing
        let ids: Vec<&str> = index.featured(8).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["L3", "L2", "L1", "L0", "low"]);
    }

    #[test]
    fn test_entry_view() {
        let index = index(scenario_listings());
        let entry = index.entry("A").unwrap();
        assert!(entry.display_text.starts_with("bright flat."));
        assert!(entry.amenities.contains("wifi"));
        assert!(entry.amenities.contains("kitchen"));
        assert!(index.entry("missing").is_none());
    }
}
