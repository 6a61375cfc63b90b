//! Embedding provider contract and a deterministic hashing implementation.
//!
//! Any model can back the engine as long as it returns one unit-length
//! vector per input string, deterministically for a fixed model.

use crate::text::normalize;
use crate::{Error, Result, Vector};

/// Default dimension for the hashing embedder
pub const DEFAULT_HASH_DIM: usize = 256;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Batched text embedding provider.
pub trait Embedder: Send + Sync {
    /// Stable identifier; persisted artifacts are keyed by it.
    fn id(&self) -> &str;

    /// Output dimension.
    fn dim(&self) -> usize;

    /// Embed a batch of strings. Output order matches input order and every
    /// vector is unit-normalized (or all-zero for inputs with no features).
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Embed a single string.
    fn embed(&self, text: &str) -> Result<Vector> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        out.pop()
            .ok_or_else(|| Error::Embedding("provider returned an empty batch".to_string()))
    }
}

/// Feature-hashing embedder over character trigrams and whole words.
///
/// Captures surface-form overlap rather than meaning, which is enough for
/// spelling variants ("wifi", "wi-fi") and keeps builds reproducible
/// without model downloads.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self {
            dim,
            id: format!("fnv1a-trigram-{dim}"),
        }
    }

    fn fnv1a_hash(bytes: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = Self::fnv1a_hash(feature.as_bytes());
        let idx = (hash % self.dim as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign * weight;
    }

    fn embed_one(&self, text: &str) -> Vector {
        let mut data = vec![0.0f32; self.dim];
        let normalized = normalize(text);

        let padded: Vec<char> = format!("  {}  ", normalized).chars().collect();
        for window in padded.windows(3) {
            let trigram: String = window.iter().collect();
            if trigram.trim().is_empty() {
                continue;
            }
            self.add_feature(&mut data, &trigram, 1.0);
        }

        // Words contribute more than trigrams
        for word in normalized.split(|c: char| !c.is_alphanumeric()) {
            if word.len() >= 2 {
                self.add_feature(&mut data, &format!("w:{word}"), 2.0);
            }
        }

        let mut vector = Vector::new(data);
        vector.normalize();
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
