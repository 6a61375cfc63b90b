//! Structured filter specification produced by query parsing.
//!
//! Every field is independently optional. An absent field (or an empty set)
//! means "no constraint", never "exclude everything".

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuerySpec {
    /// Required canonical amenity labels; a listing must carry all of them
    #[serde(default, rename = "amenities_all")]
    pub amenities: BTreeSet<String>,
    /// Candidate neighborhoods (normalized names)
    #[serde(default)]
    pub neighborhoods: BTreeSet<String>,
    /// Candidate neighborhood groups (normalized names)
    #[serde(default, rename = "neigh_groups")]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub guests: Option<u32>,
    #[serde(default)]
    pub nights: Option<u32>,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    #[serde(default)]
    pub checkin: Option<NaiveDate>,
    #[serde(default)]
    pub checkout: Option<NaiveDate>,
}

impl ParsedQuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field constrains the result.
    pub fn is_unconstrained(&self) -> bool {
        self.amenities.is_empty()
            && self.neighborhoods.is_empty()
            && self.groups.is_empty()
            && self.room_type.is_none()
            && self.property_type.is_none()
            && self.guests.is_none()
            && self.nights.is_none()
            && self.price_min.is_none()
            && self.price_max.is_none()
    }

    /// Set price bounds, swapping them if given out of order.
    pub fn set_price(&mut self, min: Option<f64>, max: Option<f64>) {
        match (min, max) {
            (Some(lo), Some(hi)) if lo > hi => {
                self.price_min = Some(hi);
                self.price_max = Some(lo);
            }
            _ => {
                self.price_min = min;
                self.price_max = max;
            }
        }
    }

    /// Set the stay range; a checkout not after checkin becomes checkin + 1 day.
    pub fn set_dates(&mut self, checkin: NaiveDate, checkout: NaiveDate) {
        let checkout = if checkout <= checkin {
            checkin + Duration::days(1)
        } else {
            checkout
        };
        self.checkin = Some(checkin);
        self.checkout = Some(checkout);
    }

    /// Nights spanned by the stay range, if both dates are present.
    pub fn stay_length(&self) -> Option<u32> {
        match (self.checkin, self.checkout) {
            (Some(a), Some(b)) => u32::try_from((b - a).num_days()).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn with_amenity(mut self, label: impl Into<String>) -> Self {
        self.amenities.insert(label.into());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    #[must_use]
    pub fn with_neighborhood(mut self, neighborhood: impl Into<String>) -> Self {
        self.neighborhoods.insert(neighborhood.into());
        self
    }

    #[must_use]
    pub fn with_price(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.set_price(min, max);
        self
    }

    #[must_use]
    pub fn with_guests(mut self, guests: u32) -> Self {
        self.guests = Some(guests);
        self
    }

    #[must_use]
    pub fn with_nights(mut self, nights: u32) -> Self {
        self.nights = Some(nights);
        self
    }

    #[must_use]
    pub fn with_room_type(mut self, room_type: impl Into<String>) -> Self {
        self.room_type = Some(room_type.into());
        self
    }

    #[must_use]
    pub fn with_property_type(mut self, property_type: impl Into<String>) -> Self {
        self.property_type = Some(property_type.into());
        self
    }
}
