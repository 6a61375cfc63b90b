// TF-IDF index over listing display text for lexical similarity
use crate::text::normalize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Sparse, L2-normalized TF-IDF rows with smoothed IDF
/// (`ln((1 + n) / (1 + df)) + 1`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexicalIndex {
    // term -> column
    vocabulary: HashMap<String, usize>,
    // column -> idf weight
    idf: Vec<f32>,
    // doc -> sorted (column, weight)
    rows: Vec<Vec<(usize, f32)>>,
    min_df: usize,
}

impl LexicalIndex {
    /// Tokenize for lexical indexing: normalized text split into
    /// `[a-z0-9_]` runs.
    #[inline]
    pub fn tokenize(text: &str) -> Vec<String> {
        normalize(text)
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Build from the corpus texts. Terms appearing in fewer than `min_df`
    /// documents are dropped.
    pub fn build<S: AsRef<str>>(texts: &[S], min_df: usize) -> Self {
        let tokenized: Vec<Vec<String>> = texts.iter().map(|t| Self::tokenize(t.as_ref())).collect();
        let total_docs = tokenized.len();

        // BTreeMap keeps column assignment independent of hash order
        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            let mut unique: Vec<&str> = tokens.iter().map(String::as_str).collect();
            unique.sort_unstable();
            unique.dedup();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let mut vocabulary = HashMap::new();
        let mut idf = Vec::new();
        for (term, df) in doc_freq {
            if df >= min_df.max(1) {
                vocabulary.insert(term.to_string(), idf.len());
                idf.push(((1.0 + total_docs as f32) / (1.0 + df as f32)).ln() + 1.0);
            }
        }

        let mut index = Self {
            vocabulary,
            idf,
            rows: Vec::with_capacity(total_docs),
            min_df,
        };
        let rows: Vec<Vec<(usize, f32)>> = tokenized.iter().map(|t| index.weigh(t)).collect();
        index.rows = rows;
        index
    }

    fn weigh(&self, tokens: &[String]) -> Vec<(usize, f32)> {
        let mut tf: BTreeMap<usize, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(&col) = self.vocabulary.get(token) {
                *tf.entry(col).or_insert(0.0) += 1.0;
            }
        }
        let mut row: Vec<(usize, f32)> = tf
            .into_iter()
            .map(|(col, count)| (col, count * self.idf[col]))
            .collect();
        let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for (_, w) in &mut row {
                *w /= norm;
            }
        }
        row
    }

    /// Weighted, normalized row of an arbitrary text.
    pub fn transform(&self, text: &str) -> Vec<(usize, f32)> {
        self.weigh(&Self::tokenize(text))
    }

    /// Raw cosine similarity of the query against every document.
    pub fn similarities(&self, query: &str) -> Vec<f32> {
        let q: HashMap<usize, f32> = self.transform(query).into_iter().collect();
        self.rows
            .iter()
            .map(|row| {
                if q.is_empty() {
                    return 0.0;
                }
                row.iter()
                    .filter_map(|(col, w)| q.get(col).map(|qw| qw * w))
                    .sum()
            })
            .collect()
    }

    /// Similarities min-max scaled across the whole index. When every
    /// document scores the same the result is uniformly 0.
    pub fn normalized_similarities(&self, query: &str) -> Vec<f32> {
        let sims = self.similarities(query);
        let (min, max) = sims
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        if sims.is_empty() || max <= min {
            return vec![0.0; sims.len()];
        }
        sims.iter().map(|s| ((s - min) / (max - min)).clamp(0.0, 1.0)).collect()
    }

    pub fn row(&self, doc: usize) -> Option<&[(usize, f32)]> {
        self.rows.get(doc).map(Vec::as_slice)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn min_df(&self) -> usize {
        self.min_df
    }
}
