//! # Listing and Filter Data Model
//!
//! This module defines the records the bot works with: the per-user filter criteria
//! collected through the menu, the raw listings produced by the listing source and the
//! delivered-listing history rows.
//!
//! ## Core Concepts
//!
//! - **FilterCriteria**: the constraint set a subscriber applies to incoming listings
//! - **RawListing**: one listing as produced by the listing source for a single tick
//! - **SeenListing**: durable record marking a listing as delivered to a user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted filter criteria of a single user
///
/// Every field is optional; `None` means the dimension is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FilterCriteria {
    /// Lower price bound in whole currency units
    pub min_price: Option<i64>,
    /// Upper price bound in whole currency units
    pub max_price: Option<i64>,
    /// Number of rooms the listing title must mention
    pub rooms: Option<i32>,
    /// Substring of the metro station name
    pub metro: Option<String>,
    /// `Some(true)` requires a listing near a metro station
    pub near_metro: Option<bool>,
}

impl FilterCriteria {
    /// True when no field constrains anything
    pub fn is_empty(&self) -> bool {
        self.min_price.is_none()
            && self.max_price.is_none()
            && self.rooms.is_none()
            && self.metro.is_none()
            && self.near_metro.is_none()
    }

    /// Clear one field group, leaving the others untouched
    pub fn clear(&mut self, field: FilterField) {
        match field {
            FilterField::Price => {
                self.min_price = None;
                self.max_price = None;
            }
            FilterField::Rooms => self.rooms = None,
            FilterField::Metro => self.metro = None,
            FilterField::NearMetro => self.near_metro = None,
        }
    }
}

/// Independently resettable groups of filter fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterField {
    /// `min_price` and `max_price` together
    Price,
    Rooms,
    Metro,
    NearMetro,
}

/// A single filter write produced by the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    /// Both bounds are always written together
    PriceRange { min_price: i64, max_price: i64 },
    Rooms(i32),
    Metro(String),
    NearMetro(bool),
}

impl FilterUpdate {
    /// Apply the update on top of an existing record
    pub fn apply_to(&self, criteria: &mut FilterCriteria) {
        match self {
            FilterUpdate::PriceRange {
                min_price,
                max_price,
            } => {
                criteria.min_price = Some(*min_price);
                criteria.max_price = Some(*max_price);
            }
            FilterUpdate::Rooms(rooms) => criteria.rooms = Some(*rooms),
            FilterUpdate::Metro(metro) => criteria.metro = Some(metro.clone()),
            FilterUpdate::NearMetro(near) => criteria.near_metro = Some(*near),
        }
    }
}

/// Price as supplied by the listing source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawPrice {
    /// Human-readable price text, e.g. "1 250 р."
    Text(String),
    /// Integer amount in minor units (kopecks)
    MinorUnits(i64),
}

/// One listing as produced by the listing source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub external_id: String,
    pub title: String,
    pub price: RawPrice,
    /// Metro station label, `None` when the source has no metro information
    pub metro_label: Option<String>,
    pub link: String,
}

/// A raw listing with its price normalized to whole currency units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedListing {
    pub listing: RawListing,
    pub price: i64,
}

/// Durable record of a listing delivered to a user
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SeenListing {
    pub user_id: i64,
    pub external_id: String,
    pub seen_at: DateTime<Utc>,
}
