// Listing predicates: a parsed query spec compiled into a conjunction.
use crate::text::normalize;
use crate::{Error, Listing, ParsedQuerySpec, Result};
use std::collections::BTreeSet;

/// A listing together with its precomputed canonical amenity set, if any.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub listing: &'a Listing,
    pub amenities: Option<&'a BTreeSet<String>>,
}

pub trait Filter {
    fn matches(&self, candidate: &Candidate<'_>) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListingPredicate {
    /// Normalized group is one of the set
    GroupIn(BTreeSet<String>),
    /// Normalized neighborhood is one of the set
    NeighborhoodIn(BTreeSet<String>),
    MinCapacity(u32),
    /// Requested nights lie within the listing's [min, max] when both are known
    NightsWithin(u32),
    PriceAtLeast(f64),
    PriceAtMost(f64),
    RoomTypeEquals(String),
    /// Case-insensitive substring match on the property type
    PropertyTypeContains(String),
    /// Listing's canonical amenity set is a superset
    HasAllAmenities(BTreeSet<String>),
    /// Excludes listings explicitly flagged unavailable
    Available,
    And(Vec<ListingPredicate>),
    Not(Box<ListingPredicate>),
}

impl ListingPredicate {
    fn requires_amenities(&self) -> bool {
        match self {
            ListingPredicate::HasAllAmenities(_) => true,
            ListingPredicate::And(inner) => inner.iter().any(Self::requires_amenities),
            ListingPredicate::Not(inner) => inner.requires_amenities(),
            _ => false,
        }
    }
}

fn normalized_opt(value: &Option<String>) -> Option<String> {
    value.as_deref().map(normalize)
}

impl Filter for ListingPredicate {
    fn matches(&self, candidate: &Candidate<'_>) -> bool {
        let listing = candidate.listing;
        match self {
            ListingPredicate::GroupIn(groups) => normalized_opt(&listing.group)
                .map(|g| groups.contains(&g))
                .unwrap_or(false),
            ListingPredicate::NeighborhoodIn(neighborhoods) => normalized_opt(&listing.neighborhood)
                .map(|n| neighborhoods.contains(&n))
                .unwrap_or(false),
            ListingPredicate::MinCapacity(guests) => listing.accommodates >= *guests,
            ListingPredicate::NightsWithin(nights) => match (listing.min_nights, listing.max_nights) {
                (Some(min), Some(max)) => min <= *nights && *nights <= max,
                _ => true,
            },
            ListingPredicate::PriceAtLeast(min) => listing.price >= *min,
            ListingPredicate::PriceAtMost(max) => listing.price <= *max,
            ListingPredicate::RoomTypeEquals(room_type) => normalized_opt(&listing.room_type)
                .map(|r| r == normalize(room_type))
                .unwrap_or(false),
            ListingPredicate::PropertyTypeContains(property_type) => {
                normalized_opt(&listing.property_type)
                    .map(|p| p.contains(&normalize(property_type)))
                    .unwrap_or(false)
            }
            ListingPredicate::HasAllAmenities(required) => {
                if required.is_empty() {
                    return true;
                }
                candidate
                    .amenities
                    .map(|have| required.is_subset(have))
                    .unwrap_or(false)
            }
            ListingPredicate::Available => listing.has_availability != Some(false),
            ListingPredicate::And(predicates) => predicates.iter().all(|p| p.matches(candidate)),
            ListingPredicate::Not(predicate) => !predicate.matches(candidate),
        }
    }
}

/// Conjunction of the predicates a spec asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFilter {
    predicate: ListingPredicate,
}

impl ListingFilter {
    pub fn new(predicate: ListingPredicate) -> Self {
        Self { predicate }
    }

    /// Compile a spec. Absent fields contribute no predicate.
    pub fn from_spec(spec: &ParsedQuerySpec) -> Self {
        let mut predicates = vec![ListingPredicate::Available];

        if !spec.groups.is_empty() {
            predicates.push(ListingPredicate::GroupIn(
                spec.groups.iter().map(|g| normalize(g)).collect(),
            ));
        }
        if !spec.neighborhoods.is_empty() {
            predicates.push(ListingPredicate::NeighborhoodIn(
                spec.neighborhoods.iter().map(|n| normalize(n)).collect(),
            ));
        }
        if let Some(guests) = spec.guests {
            predicates.push(ListingPredicate::MinCapacity(guests));
        }
        if let Some(nights) = spec.nights {
            predicates.push(ListingPredicate::NightsWithin(nights));
        }
        if let Some(min) = spec.price_min {
            predicates.push(ListingPredicate::PriceAtLeast(min));
        }
        if let Some(max) = spec.price_max {
            predicates.push(ListingPredicate::PriceAtMost(max));
        }
        if let Some(room_type) = &spec.room_type {
            predicates.push(ListingPredicate::RoomTypeEquals(room_type.clone()));
        }
        if let Some(property_type) = &spec.property_type {
            predicates.push(ListingPredicate::PropertyTypeContains(property_type.clone()));
        }
        if !spec.amenities.is_empty() {
            predicates.push(ListingPredicate::HasAllAmenities(spec.amenities.clone()));
        }

        Self::new(ListingPredicate::And(predicates))
    }

    pub fn predicate(&self) -> &ListingPredicate {
        &self.predicate
    }

    pub fn requires_amenities(&self) -> bool {
        self.predicate.requires_amenities()
    }

    /// Indices of matching listings, in corpus order.
    ///
    /// Fails when amenity filtering is requested but no canonical amenity
    /// sets were supplied (or they do not line up with the listings).
    pub fn apply(
        &self,
        listings: &[Listing],
        amenity_sets: Option<&[BTreeSet<String>]>,
    ) -> Result<Vec<usize>> {
        if let Some(sets) = amenity_sets {
            if sets.len() != listings.len() {
                return Err(Error::configuration(format!(
                    "canonical amenity sets cover {} listings, corpus has {}",
                    sets.len(),
                    listings.len()
                )));
            }
        } else if self.requires_amenities() {
            return Err(Error::configuration(
                "amenity filtering requested but canonical amenity sets were not built",
            ));
        }

        Ok(listings
            .iter()
            .enumerate()
            .filter(|(i, listing)| {
                let candidate = Candidate {
                    listing,
                    amenities: amenity_sets.map(|sets| &sets[*i]),
                };
                self.predicate.matches(&candidate)
            })
            .map(|(i, _)| i)
            .collect())
    }
}

impl Filter for ListingFilter {
    fn matches(&self, candidate: &Candidate<'_>) -> bool {
        self.predicate.matches(candidate)
    }
}
