//! Amenity canonicalization
//!
//! Raw amenity strings are normalized into a vocabulary, embedded, and
//! clustered into families. Each family is named after its most frequent
//! member. Families whose names reduce to the same content words once
//! generic modifiers are stripped and hyphens collapsed ("wi-fi", "wifi")
//! are then merged into one. Finally a multi-word family that names a
//! single-word family ("wifi router", "high speed wifi") is folded into it.
//!
//! The clustering result is captured in an [`AmenityAssignment`], which can
//! be persisted and replayed without re-embedding the vocabulary.

use crate::config::ClusterParams;
use crate::matcher::{gate_tokens, MatchTarget};
use crate::Result;
use ahash::AHashMap;
use nestfind_core::text::{is_content_token, normalize};
use nestfind_core::{Embedder, Error as CoreError, KMeans, KMeansConfig, Vector};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Modifiers ignored when deciding whether two family names are duplicates
const GENERIC_MODIFIERS: &[&str] = &["standard", "estandar", "basic", "regular", "general"];

static ESCAPED_UNICODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\u[0-9a-fA-F]{4}").expect("valid regex"));

/// A family of raw amenity variants under one representative label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalAmenity {
    pub id: usize,
    pub representative_label: String,
    pub member_tokens: BTreeSet<String>,
    /// Unit-length mean of the member embeddings
    pub centroid: Vector,
    pub content_tokens: BTreeSet<String>,
    /// Total corpus occurrences of all members
    pub frequency: usize,
}

impl MatchTarget for CanonicalAmenity {
    fn label(&self) -> &str {
        &self.representative_label
    }

    fn embedding(&self) -> &Vector {
        &self.centroid
    }

    fn gate_tokens(&self) -> &BTreeSet<String> {
        &self.content_tokens
    }
}

/// Build-time clustering output: the sorted vocabulary with corpus
/// frequencies, token embeddings, and a cluster label per token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmenityAssignment {
    pub vocabulary: Vec<String>,
    pub frequencies: Vec<usize>,
    pub embeddings: Vec<Vector>,
    pub labels: Vec<usize>,
}

impl AmenityAssignment {
    /// Count normalized tokens across per-listing amenity lists, embed the
    /// vocabulary and cluster it.
    pub fn compute<L, S>(
        amenity_lists: &[L],
        embedder: &dyn Embedder,
        params: &ClusterParams,
    ) -> Result<Self>
    where
        L: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for list in amenity_lists {
            for raw in list.as_ref() {
                let token = normalize(raw.as_ref());
                if !token.is_empty() {
                    *counts.entry(token).or_insert(0) += 1;
                }
            }
        }
        let (vocabulary, frequencies): (Vec<String>, Vec<usize>) = counts.into_iter().unzip();
        if vocabulary.is_empty() {
            return Ok(Self {
                vocabulary,
                frequencies,
                embeddings: Vec::new(),
                labels: Vec::new(),
            });
        }

        info!("Embedding {} unique amenity tokens", vocabulary.len());
        let embeddings = embedder.embed_batch(&vocabulary)?;
        if embeddings.len() != vocabulary.len() {
            return Err(CoreError::Embedding(format!(
                "expected {} embeddings, got {}",
                vocabulary.len(),
                embeddings.len()
            ))
            .into());
        }

        let k = params.cluster_count(vocabulary.len());
        info!("Clustering amenity vocabulary into {} families", k);
        let mut clustering = KMeans::new(KMeansConfig {
            k,
            max_iterations: params.max_iterations,
            seed: params.seed,
            ..Default::default()
        })
        .fit(&embeddings)?;
        clustering.merge_similar(&embeddings, params.merge_similarity);
        debug!(
            "{} clusters after centroid merge",
            clustering.num_clusters()
        );

        Ok(Self {
            vocabulary,
            frequencies,
            embeddings,
            labels: clustering.labels,
        })
    }

    fn validate(&self) -> Result<()> {
        let n = self.vocabulary.len();
        if self.frequencies.len() != n || self.embeddings.len() != n || self.labels.len() != n {
            return Err(CoreError::configuration(format!(
                "amenity assignment is inconsistent: {} tokens, {} frequencies, {} embeddings, {} labels",
                n,
                self.frequencies.len(),
                self.embeddings.len(),
                self.labels.len()
            ))
            .into());
        }
        Ok(())
    }
}

/// Frozen raw-token to canonical-family index.
#[derive(Debug, Clone, Default)]
pub struct AmenityCanonicalizer {
    catalog: Vec<CanonicalAmenity>,
    by_token: AHashMap<String, usize>,
}

impl AmenityCanonicalizer {
    /// Cluster the amenities of a corpus and build the index.
    pub fn build<L, S>(
        amenity_lists: &[L],
        embedder: &dyn Embedder,
        params: &ClusterParams,
    ) -> Result<(Self, AmenityAssignment)>
    where
        L: AsRef<[S]>,
        S: AsRef<str>,
    {
        let assignment = AmenityAssignment::compute(amenity_lists, embedder, params)?;
        let canonicalizer = Self::from_assignment(&assignment)?;
        Ok((canonicalizer, assignment))
    }

    /// Replay a clustering: pick representatives, then merge duplicate names.
    pub fn from_assignment(assignment: &AmenityAssignment) -> Result<Self> {
        assignment.validate()?;

        let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (token, &label) in assignment.labels.iter().enumerate() {
            clusters.entry(label).or_default().push(token);
        }

        // One family per merge key of its representative
        let mut merged: BTreeMap<Vec<String>, Vec<(String, Vec<usize>)>> = BTreeMap::new();
        for members in clusters.into_values() {
            let representative = pick_representative(&members, assignment);
            merged
                .entry(merge_key(&representative))
                .or_default()
                .push((representative, members));
        }

        let families: Vec<(String, Vec<usize>)> = merged
            .into_values()
            .map(|group| {
                let labels: Vec<&str> = group.iter().map(|(label, _)| label.as_str()).collect();
                let representative = prefer_label(&labels, assignment).to_string();
                let members = group.into_iter().flat_map(|(_, m)| m).collect();
                (representative, members)
            })
            .collect();
        let mut families = fold_into_anchors(families, assignment);
        families.sort_by(|a, b| a.0.cmp(&b.0));

        let mut catalog = Vec::with_capacity(families.len());
        let mut by_token = AHashMap::with_capacity(assignment.vocabulary.len());
        for (id, (representative, members)) in families.into_iter().enumerate() {
            let centroid = Vector::centroid(members.iter().map(|&t| &assignment.embeddings[t]))
                .ok_or_else(|| CoreError::Clustering(format!("family '{}' has no centroid", representative)))?;
            let member_tokens: BTreeSet<String> = members
                .iter()
                .map(|&t| assignment.vocabulary[t].clone())
                .collect();
            for token in &member_tokens {
                by_token.insert(token.clone(), id);
            }
            let mut content_tokens = gate_tokens(&representative);
            content_tokens.extend(variant_words(&representative));
            catalog.push(CanonicalAmenity {
                id,
                content_tokens,
                frequency: members.iter().map(|&t| assignment.frequencies[t]).sum(),
                representative_label: representative,
                member_tokens,
                centroid,
            });
        }

        info!(
            "Built {} canonical amenity families from {} tokens",
            catalog.len(),
            assignment.vocabulary.len()
        );
        Ok(Self { catalog, by_token })
    }

    /// Family of a raw amenity string, if it was seen at build time.
    pub fn canonicalize(&self, raw: &str) -> Option<&CanonicalAmenity> {
        self.by_token
            .get(&normalize(raw))
            .map(|&id| &self.catalog[id])
    }

    /// Representative labels of a listing's raw amenities.
    pub fn canonicalize_all<S: AsRef<str>>(&self, raw: &[S]) -> BTreeSet<String> {
        raw.iter()
            .filter_map(|a| self.canonicalize(a.as_ref()))
            .map(|family| family.representative_label.clone())
            .collect()
    }

    /// Families ordered by representative label.
    pub fn catalog(&self) -> &[CanonicalAmenity] {
        &self.catalog
    }

    pub fn get(&self, id: usize) -> Option<&CanonicalAmenity> {
        self.catalog.get(id)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.by_token.len()
    }
}

/// Most frequent member, then shortest, then lexicographic.
fn pick_representative(members: &[usize], assignment: &AmenityAssignment) -> String {
    members
        .iter()
        .min_by(|&&a, &&b| {
            let (ta, tb) = (&assignment.vocabulary[a], &assignment.vocabulary[b]);
            assignment.frequencies[b]
                .cmp(&assignment.frequencies[a])
                .then(ta.len().cmp(&tb.len()))
                .then(ta.cmp(tb))
        })
        .map(|&t| assignment.vocabulary[t].clone())
        .unwrap_or_default()
}

/// Whitespace-separated words of a label with inner punctuation removed,
/// so "wi-fi" and "wi fi" differ but "wi-fi" and "wifi" agree.
fn variant_words(label: &str) -> BTreeSet<String> {
    normalize(label)
        .split_whitespace()
        .map(|w| w.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
        .filter(|w| is_content_token(w) && !GENERIC_MODIFIERS.contains(&w.as_str()))
        .collect()
}

fn merge_key(label: &str) -> Vec<String> {
    let words = variant_words(label);
    if words.is_empty() {
        vec![normalize(label)]
    } else {
        words.into_iter().collect()
    }
}

/// Fold every family whose name contains the single word naming another
/// family into that family. Anchors never absorb each other, so this does
/// not chain. When several anchors apply the most frequent wins.
fn fold_into_anchors(
    families: Vec<(String, Vec<usize>)>,
    assignment: &AmenityAssignment,
) -> Vec<(String, Vec<usize>)> {
    let frequency = |members: &[usize]| members.iter().map(|&t| assignment.frequencies[t]).sum::<usize>();

    let mut anchors: BTreeMap<String, usize> = BTreeMap::new();
    for (i, (label, _)) in families.iter().enumerate() {
        let words = variant_words(label);
        if words.len() == 1 {
            if let Some(word) = words.into_iter().next() {
                anchors.insert(word, i);
            }
        }
    }
    if anchors.is_empty() {
        return families;
    }

    let mut target: Vec<usize> = (0..families.len()).collect();
    for (i, (label, members)) in families.iter().enumerate() {
        if anchors.values().any(|&a| a == i) {
            continue;
        }
        let best = variant_words(label)
            .iter()
            .filter_map(|w| anchors.get(w).copied())
            .min_by(|&a, &b| {
                frequency(&families[b].1)
                    .cmp(&frequency(&families[a].1))
                    .then(families[a].0.cmp(&families[b].0))
            });
        if let Some(anchor) = best {
            debug!(
                "Folding amenity family '{}' ({} members) into '{}'",
                label,
                members.len(),
                families[anchor].0
            );
            target[i] = anchor;
        }
    }

    let mut folded: BTreeMap<usize, (Vec<String>, Vec<usize>)> = BTreeMap::new();
    for (i, (label, members)) in families.into_iter().enumerate() {
        let entry = folded.entry(target[i]).or_default();
        entry.0.push(label);
        entry.1.extend(members);
    }
    folded
        .into_values()
        .map(|(labels, members)| {
            if labels.len() == 1 {
                return (labels.into_iter().next().unwrap_or_default(), members);
            }
            let tokens: Vec<&str> = members.iter().map(|&t| assignment.vocabulary[t].as_str()).collect();
            let representative = prefer_label(&tokens, assignment).to_string();
            (representative, members)
        })
        .collect()
}

/// No escaped-unicode artifact, then ASCII, then frequency, then shortest.
fn prefer_label<'a>(labels: &[&'a str], assignment: &AmenityAssignment) -> &'a str {
    let frequency = |label: &str| {
        assignment
            .vocabulary
            .binary_search_by(|t| t.as_str().cmp(label))
            .map(|i| assignment.frequencies[i])
            .unwrap_or(0)
    };
    labels
        .iter()
        .copied()
        .min_by_key(|&label| {
            (
                ESCAPED_UNICODE.is_match(label),
                !label.is_ascii(),
                std::cmp::Reverse(frequency(label)),
                label.len(),
                normalize(label),
            )
        })
        .unwrap_or_default()
}
