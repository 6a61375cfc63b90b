// Deterministic embedders for unit tests.
use nestfind_core::text::normalize;
use nestfind_core::{Embedder, Result, Vector};
use parking_lot::Mutex;
use std::collections::HashMap;

const FREE_SLOTS: usize = 512;

/// Maps texts containing a concept keyword onto that concept's axis.
/// Texts without any keyword get a fresh axis of their own, so unrelated
/// strings are orthogonal.
pub struct KeywordEmbedder {
    concepts: Vec<Vec<&'static str>>,
    slots: Mutex<HashMap<String, usize>>,
}

impl KeywordEmbedder {
    pub fn new(concepts: Vec<Vec<&'static str>>) -> Self {
        Self {
            concepts,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// No concepts: every distinct text is orthogonal to every other.
    pub fn orthogonal() -> Self {
        Self::new(Vec::new())
    }

    fn embed_one(&self, text: &str) -> Vector {
        let text = normalize(text);
        let mut data = vec![0.0f32; self.concepts.len() + FREE_SLOTS];
        let mut hit = false;
        for (axis, keywords) in self.concepts.iter().enumerate() {
            if keywords.iter().any(|k| text.contains(k)) {
                data[axis] = 1.0;
                hit = true;
            }
        }
        if !hit {
            let mut slots = self.slots.lock();
            let next = slots.len();
            let slot = *slots.entry(text).or_insert(next);
            data[self.concepts.len() + slot % FREE_SLOTS] = 1.0;
        }
        Vector::new(data).normalized()
    }
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self::new(vec![
            vec!["wifi", "wi-fi", "wi fi", "internet"],
            vec!["kitchen"],
            vec!["pool"],
            vec!["parking"],
            vec!["centro"],
            vec!["salamanca"],
            vec!["private room"],
            vec!["entire home", "entire apartment"],
        ])
    }
}

impl Embedder for KeywordEmbedder {
    fn id(&self) -> &str {
        "keyword-test"
    }

    fn dim(&self) -> usize {
        self.concepts.len() + FREE_SLOTS
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
