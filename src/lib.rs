//! # nestfind
//!
//! Natural-language search over short-term rental listings.
//!
//! A query such as "cheap private room in Centro with wifi for 2 guests"
//! is turned into a structured specification (amenities, neighborhoods,
//! room type, price range, guests, dates), the corpus is filtered by it,
//! and the survivors are ranked by a weighted blend of semantic
//! similarity, lexical overlap, rating and price per guest.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nestfind::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let listings = load_corpus("listings.jsonl")?;
//! let store = IndexStore::open("./cache")?;
//! let (index, _) = store.load_or_build(listings, Arc::new(HashEmbedder::default()), EngineConfig::default())?;
//!
//! let response = index.search("quiet flat in salamanca with a kitchen under 90", Some(10), false)?;
//! for hit in &response.result {
//!     println!("{} {:.3}", hit.id, hit.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - `nestfind-core` - vectors, text normalization, the embedder contract,
//!   listings, filtering, TF-IDF and k-means
//! - `nestfind-semantic` - amenity canonicalization, entity extraction,
//!   query parsing and hybrid ranking
//! - `nestfind-storage` - corpus loading and persisted build artifacts

pub mod service;

pub use nestfind_core::{
    Embedder, HashEmbedder, Listing, ListingFilter, ListingId, ParsedQuerySpec, Vector, DEFAULT_HASH_DIM,
};
pub use nestfind_semantic::{
    AmenityCanonicalizer, ChronoDateResolver, DateResolver, EngineConfig, Error, ExplainedHit, ParsedQuery,
    QuerySummary, RankWeights, RankedHit, Result, SearchIndex, SearchResponse,
};
pub use nestfind_storage::{load_corpus, BuildOutcome, IndexStore};
pub use service::{SearchService, ServiceError};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        load_corpus, BuildOutcome, ChronoDateResolver, DateResolver, Embedder, EngineConfig, Error, HashEmbedder,
        IndexStore, Listing, ParsedQuery, Result, SearchIndex, SearchResponse, SearchService, ServiceError,
    };
}
