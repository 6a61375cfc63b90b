//! Storage layer for nestfind: loading listing corpora and persisting the
//! expensive parts of an index build so restarts can skip them.

pub mod artifacts;
pub mod corpus;
pub mod manager;

pub use artifacts::{ArtifactStore, PersistedArtifacts, StaleReason, ARTIFACT_FORMAT_VERSION};
pub use corpus::{corpus_fingerprint, load_corpus, parse_corpus};
pub use manager::{BuildOutcome, IndexStore, RebuildReason};
