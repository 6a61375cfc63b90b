// Persisted build artifacts: listing embeddings and amenity clusters,
// tagged with the corpus fingerprint and embedder they were built from.
use anyhow::{anyhow, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use nestfind_semantic::{ClusterParams, IndexArtifacts};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bumped whenever the persisted layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedArtifacts {
    pub format_version: u32,
    pub corpus_hash: String,
    pub embedder_id: String,
    pub dim: usize,
    /// Parameters the amenity clustering was computed with
    pub clustering: ClusterParams,
    pub created_at: DateTime<Utc>,
    pub artifacts: IndexArtifacts,
}

/// Why persisted artifacts cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleReason {
    #[error("artifact format {found} does not match {expected}")]
    FormatVersion { found: u32, expected: u32 },

    #[error("corpus fingerprint changed")]
    CorpusChanged,

    #[error("built with embedder '{found}', expected '{expected}'")]
    EmbedderChanged { found: String, expected: String },

    #[error("embedding dimension {found} does not match {expected}")]
    DimensionChanged { found: usize, expected: usize },

    #[error("amenity clustering parameters changed")]
    ClusteringChanged,
}

impl PersistedArtifacts {
    pub fn new(
        corpus_hash: impl Into<String>,
        embedder_id: impl Into<String>,
        dim: usize,
        clustering: ClusterParams,
        artifacts: IndexArtifacts,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            corpus_hash: corpus_hash.into(),
            embedder_id: embedder_id.into(),
            dim,
            clustering,
            created_at: Utc::now(),
            artifacts,
        }
    }

    /// Check these artifacts were built from this corpus with this embedder
    /// and clustering configuration.
    pub fn check_fresh(
        &self,
        corpus_hash: &str,
        embedder_id: &str,
        dim: usize,
        clustering: &ClusterParams,
    ) -> std::result::Result<(), StaleReason> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(StaleReason::FormatVersion {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        if self.corpus_hash != corpus_hash {
            return Err(StaleReason::CorpusChanged);
        }
        if self.embedder_id != embedder_id {
            return Err(StaleReason::EmbedderChanged {
                found: self.embedder_id.clone(),
                expected: embedder_id.to_string(),
            });
        }
        if self.dim != dim {
            return Err(StaleReason::DimensionChanged { found: self.dim, expected: dim });
        }
        if self.clustering != *clustering {
            return Err(StaleReason::ClusteringChanged);
        }
        Ok(())
    }
}

/// One artifact file per embedder under a cache directory.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, embedder_id: &str) -> PathBuf {
        let safe: String = embedder_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("index-{}.bin", safe))
    }

    /// Write atomically: readers see the old file or the new one, never a mix.
    pub fn save(&self, artifacts: &PersistedArtifacts) -> Result<PathBuf> {
        let path = self.path_for(&artifacts.embedder_id);
        let data = bincode::serialize(artifacts).map_err(|e| anyhow!("Serialization error: {}", e))?;
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite).write(|f| f.write_all(&data))?;
        Ok(path)
    }

    /// `Ok(None)` when nothing has been saved for this embedder.
    pub fn load(&self, embedder_id: &str) -> Result<Option<PersistedArtifacts>> {
        let path = self.path_for(embedder_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let artifacts = bincode::deserialize(&data).map_err(|e| anyhow!("Deserialization error: {}", e))?;
        Ok(Some(artifacts))
    }

    pub fn remove(&self, embedder_id: &str) -> Result<bool> {
        let path = self.path_for(embedder_id);
        if path.exists() {
            fs::remove_file(path)?;
            return Ok(true);
        }
        Ok(false)
    }
}
