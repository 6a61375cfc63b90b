//! # nestfind Core
//!
//! Core library for the nestfind listing search engine.
//!
//! This crate provides the building blocks the query-understanding layer
//! sits on:
//!
//! - [`Vector`] - Dense embedding vector with cosine similarity
//! - [`text`] - Canonical normalization and content-token extraction
//! - [`Embedder`] - Batched embedding provider contract, plus [`HashEmbedder`]
//! - [`Listing`] - A corpus record
//! - [`ParsedQuerySpec`] - Structured filter specification
//! - [`ListingFilter`] - Conjunctive predicate evaluation over the corpus
//! - [`LexicalIndex`] - TF-IDF index for lexical similarity
//! - [`KMeans`] - Seeded clustering used for amenity canonicalization
//!
//! ## Example
//!
//! ```rust
//! use nestfind_core::{Listing, ListingFilter, ParsedQuerySpec};
//!
//! let listings = vec![
//!     Listing::new("a", 60.0, 2),
//!     Listing::new("b", 150.0, 4),
//! ];
//! let spec = ParsedQuerySpec::new().with_price(None, Some(100.0));
//! let hits = ListingFilter::from_spec(&spec).apply(&listings, None).unwrap();
//! assert_eq!(hits, vec![0]);
//! ```

pub mod embedder;
pub mod error;
pub mod filter;
pub mod kmeans;
pub mod lexical;
pub mod listing;
pub mod query_spec;
pub mod text;
pub mod vector;

pub use embedder::{Embedder, HashEmbedder, DEFAULT_HASH_DIM};
pub use error::{Error, Result};
pub use filter::{Candidate, Filter, ListingFilter, ListingPredicate};
pub use kmeans::{Clustering, KMeans, KMeansConfig};
pub use lexical::LexicalIndex;
pub use listing::{parse_amenity_list, Listing, ListingId};
pub use query_spec::ParsedQuerySpec;
pub use vector::{dot_product, Vector};
