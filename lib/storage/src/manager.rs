use crate::artifacts::{ArtifactStore, PersistedArtifacts, StaleReason};
use crate::corpus::corpus_fingerprint;
use anyhow::Result;
use nestfind_core::{Embedder, Listing};
use nestfind_semantic::{EngineConfig, SearchIndex};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// How `IndexStore::load_or_build` produced its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Persisted artifacts were reused.
    Restored,
    Rebuilt { reason: RebuildReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// Nothing persisted for this embedder yet
    Missing,
    Stale(StaleReason),
    /// The artifact file could not be decoded
    Unreadable(String),
    /// Artifacts decoded but did not fit the corpus
    Rejected(String),
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::Missing => write!(f, "no persisted artifacts"),
            RebuildReason::Stale(reason) => write!(f, "stale artifacts: {}", reason),
            RebuildReason::Unreadable(e) => write!(f, "unreadable artifacts: {}", e),
            RebuildReason::Rejected(e) => write!(f, "rejected artifacts: {}", e),
        }
    }
}

/// Builds search indexes, reusing persisted artifacts when the corpus and
/// embedder are unchanged since they were written.
pub struct IndexStore {
    artifacts: ArtifactStore,
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        Ok(Self {
            artifacts: ArtifactStore::new(cache_dir)?,
        })
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn load_or_build(
        &self,
        listings: Vec<Listing>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Result<(SearchIndex, BuildOutcome)> {
        // configuration faults are fatal whatever the artifacts hold
        config.clone().validate()?;

        let corpus_hash = corpus_fingerprint(&listings)?;
        let embedder_id = embedder.id().to_string();
        let dim = embedder.dim();

        let reason = match self.artifacts.load(&embedder_id) {
            Ok(None) => RebuildReason::Missing,
            Err(e) => {
                warn!("Discarding unreadable artifacts for {}: {:#}", embedder_id, e);
                RebuildReason::Unreadable(e.to_string())
            }
            Ok(Some(persisted)) => match persisted.check_fresh(&corpus_hash, &embedder_id, dim, &config.clustering) {
                Err(stale) => {
                    info!("Persisted artifacts are stale: {}", stale);
                    RebuildReason::Stale(stale)
                }
                Ok(()) => {
                    match SearchIndex::from_artifacts(
                        listings.clone(),
                        embedder.clone(),
                        config.clone(),
                        persisted.artifacts,
                    ) {
                        Ok(index) => {
                            info!("Restored index artifacts built at {}", persisted.created_at);
                            return Ok((index, BuildOutcome::Restored));
                        }
                        // a bad corpus fails again in the rebuild below
                        Err(e) => {
                            warn!("Discarding persisted artifacts: {}", e);
                            RebuildReason::Rejected(e.to_string())
                        }
                    }
                }
            },
        };

        info!("Building index ({})", reason);
        let index = SearchIndex::build(listings, embedder, config)?;
        let persisted = PersistedArtifacts::new(
            corpus_hash,
            embedder_id,
            dim,
            index.config().clustering.clone(),
            index.artifacts(),
        );
        match self.artifacts.save(&persisted) {
            Ok(path) => info!("Saved index artifacts to {}", path.display()),
            Err(e) => warn!("Failed to persist index artifacts: {:#}", e),
        }
        Ok((index, BuildOutcome::Rebuilt { reason }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestfind_core::HashEmbedder;
    use nestfind_semantic::ClusterParams;
    use std::fs;
    use tempfile::tempdir;

    fn corpus() -> Vec<Listing> {
        vec![
            Listing::new("1", 80.0, 2)
                .with_name("Bright flat near Retiro")
                .with_location("Retiro", "Retiro")
                .with_types("Entire home/apt", "Entire rental unit")
                .with_amenities(["Wifi", "Kitchen"])
                .with_rating(92.0),
            Listing::new("2", 45.0, 1)
                .with_name("Cozy room in Malasaña")
                .with_location("Universidad", "Centro")
                .with_types("Private room", "Private room in rental unit")
                .with_amenities(["Wi-Fi", "Washer"])
                .with_rating(88.0),
        ]
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashEmbedder::new(32))
    }

    #[test]
    fn test_build_then_restore() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();

        let (first, outcome) = store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();
        assert_eq!(outcome, BuildOutcome::Rebuilt { reason: RebuildReason::Missing });

        let (second, outcome) = store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();
        assert_eq!(outcome, BuildOutcome::Restored);
        assert_eq!(first.artifacts(), second.artifacts());
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn test_changed_corpus_rebuilds() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();

        let mut changed = corpus();
        changed[0].price = 95.0;
        let (_, outcome) = store.load_or_build(changed, embedder(), EngineConfig::default()).unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Rebuilt {
                reason: RebuildReason::Stale(StaleReason::CorpusChanged)
            }
        );
    }

    #[test]
    fn test_corrupt_artifacts_rebuild() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        let path = store.artifacts().path_for(embedder().id());
        fs::write(&path, b"garbage").unwrap();

        let (index, outcome) = store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();
        assert!(matches!(
            outcome,
            BuildOutcome::Rebuilt {
                reason: RebuildReason::Unreadable(_)
            }
        ));
        assert_eq!(index.len(), 2);

        // the rebuild overwrote the corrupt file
        let (_, outcome) = store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();
        assert_eq!(outcome, BuildOutcome::Restored);
    }

    #[test]
    fn test_changed_clustering_rebuilds() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        let (cached, _) = store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();

        let coarse = EngineConfig {
            clustering: ClusterParams {
                min_clusters: 1,
                max_clusters: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let (index, outcome) = store.load_or_build(corpus(), embedder(), coarse.clone()).unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Rebuilt {
                reason: RebuildReason::Stale(StaleReason::ClusteringChanged)
            }
        );
        let fresh = SearchIndex::build(corpus(), embedder(), coarse).unwrap();
        assert_eq!(index.amenities().len(), fresh.amenities().len());
        assert_eq!(index.artifacts(), fresh.artifacts());
        assert_ne!(index.amenities().len(), cached.amenities().len());
    }

    #[test]
    fn test_inconsistent_artifacts_rebuild() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();

        let mut persisted = store.artifacts().load(embedder().id()).unwrap().unwrap();
        persisted.artifacts.amenities.labels.pop();
        store.artifacts().save(&persisted).unwrap();

        let (index, outcome) = store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();
        assert!(matches!(
            outcome,
            BuildOutcome::Rebuilt {
                reason: RebuildReason::Rejected(_)
            }
        ));
        assert_eq!(index.amenities().vocabulary_size(), 4);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        store.load_or_build(corpus(), embedder(), EngineConfig::default()).unwrap();

        let mut config = EngineConfig::default();
        config.weights.price = -1.0;
        assert!(store.load_or_build(corpus(), embedder(), config).is_err());
    }

    #[test]
    fn test_configuration_fault_is_fatal() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        let mut listings = corpus();
        listings[1].id = listings[0].id.clone();
        assert!(store.load_or_build(listings, embedder(), EngineConfig::default()).is_err());
    }
}
