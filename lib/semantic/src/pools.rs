//! Label pools for categorical listing fields
//!
//! Each pool holds the distinct normalized values of one field with their
//! embeddings and gate tokens. The neighborhood/group hierarchy is derived
//! from which values co-occur on the same listing.

use crate::error::Error;
use crate::matcher::{gate_tokens, MatchTarget};
use crate::Result;
use nestfind_core::text::{contains_words, normalize};
use nestfind_core::{Embedder, Error as CoreError, Listing, Vector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolField {
    Neighborhood,
    Group,
    RoomType,
    PropertyType,
}

impl PoolField {
    pub const ALL: [PoolField; 4] = [
        PoolField::Neighborhood,
        PoolField::Group,
        PoolField::RoomType,
        PoolField::PropertyType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolField::Neighborhood => "neighborhood",
            PoolField::Group => "group",
            PoolField::RoomType => "room_type",
            PoolField::PropertyType => "property_type",
        }
    }

    fn value<'a>(&self, listing: &'a Listing) -> Option<&'a str> {
        match self {
            PoolField::Neighborhood => listing.neighborhood.as_deref(),
            PoolField::Group => listing.group.as_deref(),
            PoolField::RoomType => listing.room_type.as_deref(),
            PoolField::PropertyType => listing.property_type.as_deref(),
        }
    }
}

impl fmt::Display for PoolField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelPoolEntry {
    /// First raw spelling seen (in sorted order)
    pub raw_value: String,
    /// Unique within its pool
    pub normalized_value: String,
    pub embedding: Vector,
    pub content_tokens: BTreeSet<String>,
}

impl MatchTarget for LabelPoolEntry {
    fn label(&self) -> &str {
        &self.normalized_value
    }

    fn embedding(&self) -> &Vector {
        &self.embedding
    }

    fn gate_tokens(&self) -> &BTreeSet<String> {
        &self.content_tokens
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelPools {
    pools: BTreeMap<PoolField, Vec<LabelPoolEntry>>,
    neighborhood_group: BTreeMap<String, String>,
    group_neighborhoods: BTreeMap<String, BTreeSet<String>>,
}

impl LabelPools {
    /// Collect, normalize and embed every categorical value of the corpus.
    ///
    /// With `strict_geography`, a neighborhood paired with two different
    /// groups is an error. Otherwise the last pairing seen wins.
    pub fn build(listings: &[Listing], embedder: &dyn Embedder, strict_geography: bool) -> Result<Self> {
        let neighborhood_group = derive_geography(listings, strict_geography)?;
        let mut group_neighborhoods: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (neighborhood, group) in &neighborhood_group {
            group_neighborhoods
                .entry(group.clone())
                .or_default()
                .insert(neighborhood.clone());
        }

        let mut pools = BTreeMap::new();
        for field in PoolField::ALL {
            pools.insert(field, build_pool(field, listings, embedder)?);
        }

        info!(
            "Label pools: {} neighborhoods, {} groups, {} room types, {} property types",
            pools[&PoolField::Neighborhood].len(),
            pools[&PoolField::Group].len(),
            pools[&PoolField::RoomType].len(),
            pools[&PoolField::PropertyType].len()
        );

        Ok(Self {
            pools,
            neighborhood_group,
            group_neighborhoods,
        })
    }

    /// Entries of one field, sorted by raw value.
    pub fn pool(&self, field: PoolField) -> &[LabelPoolEntry] {
        self.pools.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry(&self, field: PoolField, value: &str) -> Option<&LabelPoolEntry> {
        let value = normalize(value);
        self.pool(field).iter().find(|e| e.normalized_value == value)
    }

    /// Normalized group a neighborhood belongs to.
    pub fn group_of(&self, neighborhood: &str) -> Option<&str> {
        self.neighborhood_group
            .get(&normalize(neighborhood))
            .map(String::as_str)
    }

    /// Normalized neighborhoods of a group; empty for unknown groups.
    pub fn neighborhoods_of(&self, group: &str) -> BTreeSet<&str> {
        self.group_neighborhoods
            .get(&normalize(group))
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Entries whose normalized value occurs as whole words in `text`.
    pub fn mentioned_in<'a>(&'a self, field: PoolField, text: &'a str) -> impl Iterator<Item = &'a LabelPoolEntry> + 'a {
        self.pool(field)
            .iter()
            .filter(move |e| contains_words(text, &e.normalized_value))
    }
}

fn build_pool(field: PoolField, listings: &[Listing], embedder: &dyn Embedder) -> Result<Vec<LabelPoolEntry>> {
    let raw: BTreeSet<&str> = listings
        .iter()
        .filter_map(|l| field.value(l))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    let mut seen = BTreeSet::new();
    let mut values: Vec<(String, String)> = Vec::with_capacity(raw.len());
    for value in raw {
        let normalized = normalize(value);
        if seen.insert(normalized.clone()) {
            values.push((value.to_string(), normalized));
        }
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let normalized: Vec<String> = values.iter().map(|(_, n)| n.clone()).collect();
    let embeddings = embedder.embed_batch(&normalized)?;
    if embeddings.len() != values.len() {
        return Err(CoreError::Embedding(format!(
            "{} pool: expected {} embeddings, got {}",
            field,
            values.len(),
            embeddings.len()
        ))
        .into());
    }

    Ok(values
        .into_iter()
        .zip(embeddings)
        .map(|((raw_value, normalized_value), embedding)| LabelPoolEntry {
            content_tokens: gate_tokens(&normalized_value),
            raw_value,
            normalized_value,
            embedding,
        })
        .collect())
}

fn derive_geography(listings: &[Listing], strict: bool) -> Result<BTreeMap<String, String>> {
    let mut mapping: BTreeMap<String, String> = BTreeMap::new();
    for listing in listings {
        let (Some(neighborhood), Some(group)) = (listing.neighborhood.as_deref(), listing.group.as_deref()) else {
            continue;
        };
        let (neighborhood, group) = (normalize(neighborhood), normalize(group));
        if neighborhood.is_empty() || group.is_empty() {
            continue;
        }
        match mapping.get(&neighborhood) {
            Some(existing) if *existing != group => {
                if strict {
                    return Err(Error::InconsistentGeography {
                        neighborhood,
                        first_group: existing.clone(),
                        second_group: group,
                    });
                }
                warn!(
                    "Neighborhood '{}' appears under groups '{}' and '{}'; keeping '{}'",
                    neighborhood, existing, group, group
                );
                mapping.insert(neighborhood, group);
            }
            Some(_) => {}
            None => {
                mapping.insert(neighborhood, group);
            }
        }
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestfind_core::HashEmbedder;

    fn corpus() -> Vec<Listing> {
        vec![
            Listing::new("1", 80.0, 2)
                .with_location("Sol", "Centro")
                .with_types("Private room", "Private room in rental unit"),
            Listing::new("2", 120.0, 4)
                .with_location("Centro", "Centro")
                .with_types("Entire home/apt", "Entire rental unit"),
            Listing::new("3", 95.0, 3)
                .with_location("Recoletos", "Salamanca")
                .with_types("Entire home/apt", "Entire loft"),
            Listing::new("4", 70.0, 2).with_location("Sol", "CENTRO"),
        ]
    }

    #[test]
    fn test_pools_are_unique_and_sorted() {
        let pools = LabelPools::build(&corpus(), &HashEmbedder::new(32), true).unwrap();
        let groups: Vec<&str> = pools
            .pool(PoolField::Group)
            .iter()
            .map(|e| e.normalized_value.as_str())
            .collect();
        assert_eq!(groups, vec!["centro", "salamanca"]);
        assert_eq!(pools.pool(PoolField::Group)[0].raw_value, "CENTRO");
        assert_eq!(pools.pool(PoolField::RoomType).len(), 2);
        assert_eq!(pools.pool(PoolField::Neighborhood).len(), 3);
        for entry in pools.pool(PoolField::PropertyType) {
            assert_eq!(entry.embedding.dim(), 32);
            assert!(!entry.content_tokens.is_empty());
        }
    }

    #[test]
    fn test_geography() {
        let pools = LabelPools::build(&corpus(), &HashEmbedder::new(16), true).unwrap();
        assert_eq!(pools.group_of("Sol"), Some("centro"));
        assert_eq!(pools.group_of("centro"), Some("centro"));
        assert_eq!(pools.group_of("Atlantis"), None);
        let centro = pools.neighborhoods_of("Centro");
        assert!(centro.contains("sol"));
        assert!(centro.contains("centro"));
        assert!(!centro.contains("recoletos"));
        assert!(pools.neighborhoods_of("nowhere").is_empty());
    }

    #[test]
    fn test_inconsistent_geography_strict() {
        let mut listings = corpus();
        listings.push(Listing::new("5", 60.0, 2).with_location("Sol", "Salamanca"));
        let err = LabelPools::build(&listings, &HashEmbedder::new(16), true).unwrap_err();
        match err {
            Error::InconsistentGeography {
                neighborhood,
                first_group,
                second_group,
            } => {
                assert_eq!(neighborhood, "sol");
                assert_eq!(first_group, "centro");
                assert_eq!(second_group, "salamanca");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inconsistent_geography_lenient_last_wins() {
        let mut listings = corpus();
        listings.push(Listing::new("5", 60.0, 2).with_location("Sol", "Salamanca"));
        let pools = LabelPools::build(&listings, &HashEmbedder::new(16), false).unwrap();
        assert_eq!(pools.group_of("sol"), Some("salamanca"));
        assert!(!pools.neighborhoods_of("centro").contains("sol"));
        assert!(pools.neighborhoods_of("salamanca").contains("sol"));
    }

    #[test]
    fn test_mentioned_in() {
        let pools = LabelPools::build(&corpus(), &HashEmbedder::new(16), true).unwrap();
        let query = normalize("a quiet flat near Recoletos");
        let hits: Vec<&str> = pools
            .mentioned_in(PoolField::Neighborhood, &query)
            .map(|e| e.normalized_value.as_str())
            .collect();
        assert_eq!(hits, vec!["recoletos"]);
        // "sol" inside "solar" is not a whole-word mention
        assert_eq!(pools.mentioned_in(PoolField::Neighborhood, "solar panels").count(), 0);
        assert_eq!(
            pools.entry(PoolField::RoomType, "PRIVATE ROOM").map(|e| e.raw_value.as_str()),
            Some("Private room")
        );
    }
}
