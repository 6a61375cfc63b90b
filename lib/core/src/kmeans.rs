//! Seeded k-means over unit vectors.
//!
//! k-means++ seeding with a fixed RNG seed and a sequential update step
//! make the result a pure function of (vectors, k, seed). The assignment
//! step runs on rayon; each point is independent so the output does not
//! depend on thread count.

use crate::{Error, Result, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub seed: u64,
    /// Stop once no centroid moves more than this (squared L2)
    pub tolerance: f32,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 8,
            max_iterations: 100,
            seed: 42,
            tolerance: 1e-6,
        }
    }
}

/// Cluster assignment: `labels[i]` indexes into `centroids`.
/// Labels are compact: every centroid has at least one member.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vector>,
}

impl Clustering {
    pub fn num_clusters(&self) -> usize {
        self.centroids.len()
    }

    /// Member indices of each cluster.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.centroids.len()];
        for (i, &label) in self.labels.iter().enumerate() {
            out[label].push(i);
        }
        out
    }

    /// Union clusters whose centroids have cosine similarity of at least
    /// `threshold`, then recompute centroids from the member vectors.
    pub fn merge_similar(&mut self, vectors: &[Vector], threshold: f32) {
        let n = self.centroids.len();
        let mut parent: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], x: usize) -> usize {
            let mut root = x;
            while parent[root] != root {
                root = parent[root];
            }
            let mut cur = x;
            while parent[cur] != root {
                let next = parent[cur];
                parent[cur] = root;
                cur = next;
            }
            root
        }

        for a in 0..n {
            for b in (a + 1)..n {
                if self.centroids[a].cosine_similarity(&self.centroids[b]) >= threshold {
                    let ra = find(&mut parent, a);
                    let rb = find(&mut parent, b);
                    if ra != rb {
                        parent[ra.max(rb)] = ra.min(rb);
                    }
                }
            }
        }

        let roots: Vec<usize> = (0..n).map(|c| find(&mut parent, c)).collect();
        let labels: Vec<usize> = self.labels.iter().map(|&l| roots[l]).collect();
        *self = compact(labels, vectors);
    }
}

/// Renumber labels densely (in order of first appearance) and compute
/// unit-length centroids from the members.
fn compact(labels: Vec<usize>, vectors: &[Vector]) -> Clustering {
    let mut remap = std::collections::BTreeMap::new();
    let mut dense = Vec::with_capacity(labels.len());
    for &label in &labels {
        let next = remap.len();
        dense.push(*remap.entry(label).or_insert(next));
    }
    let mut groups: Vec<Vec<&Vector>> = vec![Vec::new(); remap.len()];
    for (i, &label) in dense.iter().enumerate() {
        groups[label].push(&vectors[i]);
    }
    let centroids = groups
        .into_iter()
        .map(|members| Vector::centroid(members).unwrap_or_default())
        .collect();
    Clustering {
        labels: dense,
        centroids,
    }
}

pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, vectors: &[Vector]) -> Result<Clustering> {
        if vectors.is_empty() {
            return Ok(Clustering {
                labels: Vec::new(),
                centroids: Vec::new(),
            });
        }
        if self.config.k == 0 {
            return Err(Error::Clustering("k must be positive".to_string()));
        }
        let dim = vectors[0].dim();
        if let Some(bad) = vectors.iter().find(|v| v.dim() != dim) {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: bad.dim(),
            });
        }

        let mut centroids = self.seed_centroids(vectors);
        let mut labels = vec![0usize; vectors.len()];

        for _ in 0..self.config.max_iterations.max(1) {
            labels = assign(vectors, &centroids);

            let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
            let mut counts = vec![0usize; centroids.len()];
            for (v, &label) in vectors.iter().zip(labels.iter()) {
                counts[label] += 1;
                for (acc, x) in sums[label].iter_mut().zip(v.as_slice()) {
                    *acc += x;
                }
            }

            let mut shift = 0.0f32;
            for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
                // Empty clusters keep their previous centroid
                if count == 0 {
                    continue;
                }
                let mut updated = Vector::new(sum);
                updated.normalize();
                shift = shift.max(updated.squared_l2_distance(&centroids[c]));
                centroids[c] = updated;
            }

            if shift <= self.config.tolerance {
                break;
            }
        }

        labels = assign(vectors, &centroids);
        Ok(compact(labels, vectors))
    }

    /// k-means++ seeding. Stops early when every remaining point coincides
    /// with an existing seed, so duplicates never get clusters of their own.
    fn seed_centroids(&self, vectors: &[Vector]) -> Vec<Vector> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let k = self.config.k.min(vectors.len());

        let first = rng.random_range(0..vectors.len());
        let mut centroids = vec![vectors[first].clone()];
        let mut nearest: Vec<f32> = vectors
            .iter()
            .map(|v| v.squared_l2_distance(&centroids[0]))
            .collect();

        while centroids.len() < k {
            let total: f64 = nearest.iter().map(|d| f64::from(*d)).sum();
            if total <= f64::from(f32::EPSILON) {
                break;
            }
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0f64;
            let mut chosen = vectors.len() - 1;
            for (i, d) in nearest.iter().enumerate() {
                acc += f64::from(*d);
                if acc >= target && *d > 0.0 {
                    chosen = i;
                    break;
                }
            }
            if nearest[chosen] <= 0.0 {
                // Rounding landed on a zero-distance tail; take the farthest point
                chosen = nearest
                    .iter()
                    .enumerate()
                    .fold((0, f32::MIN), |best, (i, &d)| if d > best.1 { (i, d) } else { best })
                    .0;
            }
            let seed = vectors[chosen].clone();
            for (d, v) in nearest.iter_mut().zip(vectors) {
                *d = d.min(v.squared_l2_distance(&seed));
            }
            centroids.push(seed);
        }

        centroids
    }
}

fn assign(vectors: &[Vector], centroids: &[Vector]) -> Vec<usize> {
    vectors
        .par_iter()
        .map(|v| {
            let mut best = 0;
            let mut best_dist = f32::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = v.squared_l2_distance(centroid);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(data: &[f32]) -> Vector {
        Vector::from_slice(data).normalized()
    }

    fn two_blobs() -> Vec<Vector> {
        vec![
            v(&[1.0, 0.05, 0.0]),
            v(&[1.0, 0.0, 0.05]),
            v(&[0.95, 0.05, 0.05]),
            v(&[0.0, 1.0, 0.05]),
            v(&[0.05, 1.0, 0.0]),
            v(&[0.0, 0.95, 0.05]),
        ]
    }

    #[test]
    fn test_separates_blobs() {
        let clustering = KMeans::new(KMeansConfig { k: 2, ..Default::default() })
            .fit(&two_blobs())
            .unwrap();
        assert_eq!(clustering.num_clusters(), 2);
        assert_eq!(clustering.labels[0], clustering.labels[1]);
        assert_eq!(clustering.labels[0], clustering.labels[2]);
        assert_eq!(clustering.labels[3], clustering.labels[5]);
        assert_ne!(clustering.labels[0], clustering.labels[3]);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let config = KMeansConfig { k: 3, ..Default::default() };
        let a = KMeans::new(config.clone()).fit(&two_blobs()).unwrap();
        let b = KMeans::new(config).fit(&two_blobs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_k_larger_than_points_is_capped() {
        let clustering = KMeans::new(KMeansConfig { k: 60, ..Default::default() })
            .fit(&two_blobs())
            .unwrap();
        assert!(clustering.num_clusters() <= 6);
        assert_eq!(clustering.labels.len(), 6);
    }

    #[test]
    fn test_duplicates_share_a_cluster() {
        let same = vec![v(&[1.0, 0.0]), v(&[1.0, 0.0]), v(&[1.0, 0.0])];
        let clustering = KMeans::new(KMeansConfig { k: 3, ..Default::default() })
            .fit(&same)
            .unwrap();
        assert_eq!(clustering.num_clusters(), 1);
    }

    #[test]
    fn test_merge_similar_unions_close_centroids() {
        let mut clustering = KMeans::new(KMeansConfig { k: 6, ..Default::default() })
            .fit(&two_blobs())
            .unwrap();
        clustering.merge_similar(&two_blobs(), 0.9);
        assert_eq!(clustering.num_clusters(), 2);
        for members in clustering.members() {
            assert!(!members.is_empty());
        }
    }

    #[test]
    fn test_empty_input() {
        let clustering = KMeans::new(KMeansConfig::default()).fit(&[]).unwrap();
        assert_eq!(clustering.num_clusters(), 0);
    }
}
