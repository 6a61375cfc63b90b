//! # nestfind Semantic
//!
//! Query understanding and hybrid ranking on top of `nestfind-core`.
//!
//! ## Build phase
//!
//! - [`AmenityCanonicalizer`] - Clusters raw amenity strings into canonical families
//! - [`LabelPools`] - Embedded value pools for neighborhoods, groups and types
//! - [`SearchIndex`] - Frozen product of a build, shared by every query
//!
//! ## Query phase
//!
//! - [`EntityExtractor`] - Similarity + margin + lexical-gate matching and
//!   regex extraction of prices, counts and dates
//! - [`QueryParser`] - Assembles a [`ParsedQuerySpec`] and a display summary,
//!   memoizing recent queries
//! - [`HybridRanker`] - Semantic, lexical, rating and price signals in one score
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nestfind_core::{HashEmbedder, Listing};
//! use nestfind_semantic::{EngineConfig, SearchIndex};
//!
//! let listings = vec![
//!     Listing::new("1", 60.0, 2).with_name("Flat with wifi").with_amenities(["Wifi"]),
//!     Listing::new("2", 150.0, 4).with_name("Loft").with_amenities(["Wifi", "Pool"]),
//! ];
//! let index = SearchIndex::build(listings, Arc::new(HashEmbedder::new(64)), EngineConfig::default())?;
//! let response = index.search("flat under 100 euros", None, false)?;
//! assert_eq!(response.query.spec.price_max, Some(100.0));
//! assert!(response.result.iter().all(|hit| hit.price <= 100.0));
//! # Ok::<(), nestfind_semantic::Error>(())
//! ```

pub mod amenity;
pub mod config;
pub mod error;
pub mod explain;
pub mod extract;
pub mod index;
pub mod matcher;
pub mod numeric;
pub mod parser;
pub mod phrases;
pub mod pools;
pub mod rerank;

#[cfg(test)]
pub(crate) mod testing;

pub use amenity::{AmenityAssignment, AmenityCanonicalizer, CanonicalAmenity};
pub use config::{ClusterParams, EngineConfig, ExtractorThresholds, MatchThresholds, RankWeights};
pub use error::{ConfigError, Error, Result};
pub use explain::{ExplainedHit, SearchResponse, SignalBreakdown};
pub use extract::{Entities, EntityExtractor};
pub use index::{IndexArtifacts, ListingIndexEntry, SearchIndex};
pub use matcher::{BestTwo, Evidence, LexicalGate, Match, MatchTarget, Matcher, Phrase};
pub use numeric::{ChronoDateResolver, DateResolver, NumericFields, StayDates};
pub use parser::{ParsedQuery, QueryParser, QuerySummary};
pub use pools::{LabelPoolEntry, LabelPools, PoolField};
pub use rerank::{HybridRanker, RankInputs, RankedHit};

pub use nestfind_core::ParsedQuerySpec;
