//! # Listing Filter Module
//!
//! Price normalization and per-user filtering of raw listings.
//!
//! Prices reach the bot either as minor units (kopecks) or as free text such as
//! `"1 250 р."`. Both are normalized to whole currency units before comparison.
//! Listings whose price cannot be normalized never pass a filter.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::listing_model::{FilterCriteria, NormalizedListing, RawListing, RawPrice};

lazy_static! {
    // Integer part of the first number, allowing space/nbsp/thin-space group separators
    static ref PRICE_REGEX: Regex = Regex::new(r"\d+(?:[ \x{00A0}\x{202F}]\d{3})*")
        .expect("Price pattern should be valid");
    static ref NUMBER_TOKEN_REGEX: Regex =
        Regex::new(r"\d+").expect("Number token pattern should be valid");
}

/// Normalize a raw price into whole currency units
///
/// Returns `None` when the price carries no usable number.
pub fn normalize_price(price: &RawPrice) -> Option<i64> {
    match price {
        RawPrice::MinorUnits(value) if *value >= 0 => Some(value / 100),
        RawPrice::MinorUnits(_) => None,
        RawPrice::Text(text) => {
            let matched = PRICE_REGEX.find(text)?;
            let digits: String = matched
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
    }
}

/// Normalize all listings, dropping (and reporting) those without a usable price
pub fn normalize_listings(listings: Vec<RawListing>) -> Vec<NormalizedListing> {
    listings
        .into_iter()
        .filter_map(|listing| match normalize_price(&listing.price) {
            Some(price) => Some(NormalizedListing { listing, price }),
            None => {
                warn!(
                    external_id = %listing.external_id,
                    price = ?listing.price,
                    "Excluding listing with unparseable price"
                );
                None
            }
        })
        .collect()
}

/// Check whether the title mentions `rooms` as a standalone number
fn title_mentions_rooms(title: &str, rooms: i32) -> bool {
    NUMBER_TOKEN_REGEX
        .find_iter(&title.to_lowercase())
        .any(|token| token.as_str().parse::<i32>().ok() == Some(rooms))
}

/// Check a single normalized listing against the criteria
pub fn matches_criteria(listing: &NormalizedListing, criteria: &FilterCriteria) -> bool {
    if criteria.min_price.is_some_and(|min| listing.price < min) {
        return false;
    }
    if criteria.max_price.is_some_and(|max| listing.price > max) {
        return false;
    }
    if let Some(rooms) = criteria.rooms {
        if !title_mentions_rooms(&listing.listing.title, rooms) {
            return false;
        }
    }

    let metro_label = listing
        .listing
        .metro_label
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();

    if let Some(metro) = criteria.metro.as_deref() {
        if !metro_label
            .to_lowercase()
            .contains(&metro.trim().to_lowercase())
        {
            return false;
        }
    }
    if criteria.near_metro == Some(true) && metro_label.is_empty() {
        return false;
    }

    true
}

/// Narrow listings to those matching the user's criteria, keeping source order
///
/// With no criteria, or criteria with every field unset, every listing passes.
pub fn apply_filter(
    listings: Vec<NormalizedListing>,
    criteria: Option<&FilterCriteria>,
) -> Vec<NormalizedListing> {
    let Some(criteria) = criteria.filter(|criteria| !criteria.is_empty()) else {
        return listings;
    };

    let before = listings.len();
    let passed: Vec<NormalizedListing> = listings
        .into_iter()
        .filter(|listing| matches_criteria(listing, criteria))
        .collect();
    debug!(before, after = passed.len(), "Applied filter criteria");
    passed
}

/// Render a price for a notification message
///
/// Minor-unit prices render as `1 250,00 BYN`; textual prices are shown as given.
pub fn format_price(price: &RawPrice) -> String {
    match price {
        RawPrice::Text(text) => text.trim().to_string(),
        RawPrice::MinorUnits(value) => {
            let whole = (value / 100).abs();
            let minor = (value % 100).abs();
            let digits = whole.to_string();
            let mut grouped = String::new();
            for (i, c) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    grouped.push(' ');
                }
                grouped.push(c);
            }
            let sign = if *value < 0 { "-" } else { "" };
            format!("{sign}{grouped},{minor:02} BYN")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: &str, price: RawPrice, metro: Option<&str>) -> NormalizedListing {
        let raw = RawListing {
            external_id: "1".to_string(),
            title: title.to_string(),
            price,
            metro_label: metro.map(str::to_string),
            link: "https://re.kufar.by/vi/1".to_string(),
        };
        let price = normalize_price(&raw.price).unwrap();
        NormalizedListing {
            listing: raw,
            price,
        }
    }

    #[test]
    fn test_normalize_price_forms() {
        assert_eq!(normalize_price(&RawPrice::MinorUnits(50000)), Some(500));
        assert_eq!(normalize_price(&RawPrice::Text("500".to_string())), Some(500));
        assert_eq!(normalize_price(&RawPrice::Text("1 250 р.".to_string())), Some(1250));
        assert_eq!(
            normalize_price(&RawPrice::Text("1\u{a0}250,50 р.".to_string())),
            Some(1250)
        );
        assert_eq!(normalize_price(&RawPrice::Text("$ 700.99".to_string())), Some(700));
    }

    #[test]
    fn test_normalize_price_rejects_garbage() {
        assert_eq!(normalize_price(&RawPrice::Text("Договорная".to_string())), None);
        assert_eq!(normalize_price(&RawPrice::Text(String::new())), None);
        assert_eq!(normalize_price(&RawPrice::MinorUnits(-5)), None);
    }

    #[test]
    fn test_price_bounds() {
        let flat = listing("2-комн. квартира", RawPrice::Text("500".to_string()), None);

        let min_only = FilterCriteria {
            min_price: Some(600),
            ..Default::default()
        };
        assert!(!matches_criteria(&flat, &min_only));

        let max_only = FilterCriteria {
            max_price: Some(600),
            ..Default::default()
        };
        assert!(matches_criteria(&flat, &max_only));
        assert!(matches_criteria(&flat, &FilterCriteria::default()));

        let exact = FilterCriteria {
            min_price: Some(500),
            max_price: Some(500),
            ..Default::default()
        };
        assert!(matches_criteria(&flat, &exact));
    }

    #[test]
    fn test_rooms_match_is_token_based() {
        let criteria = FilterCriteria {
            rooms: Some(2),
            ..Default::default()
        };
        let two_rooms = listing("2-room apartment", RawPrice::MinorUnits(1000), None);
        let studio = listing("studio", RawPrice::MinorUnits(1000), None);
        let big_area = listing("1-room, 52 m²", RawPrice::MinorUnits(1000), None);

        assert!(matches_criteria(&two_rooms, &criteria));
        assert!(!matches_criteria(&studio, &criteria));
        assert!(!matches_criteria(&big_area, &criteria));
    }

    #[test]
    fn test_metro_is_case_insensitive_substring() {
        let criteria = FilterCriteria {
            metro: Some("немига".to_string()),
            ..Default::default()
        };
        let near = listing("flat", RawPrice::MinorUnits(1000), Some("Станция Немига"));
        let far = listing("flat", RawPrice::MinorUnits(1000), Some("Уручье"));
        let none = listing("flat", RawPrice::MinorUnits(1000), None);

        assert!(matches_criteria(&near, &criteria));
        assert!(!matches_criteria(&far, &criteria));
        assert!(!matches_criteria(&none, &criteria));
    }

    #[test]
    fn test_near_metro_requires_label_only_when_true() {
        let with_label = listing("flat", RawPrice::MinorUnits(1000), Some("Уручье"));
        let blank_label = listing("flat", RawPrice::MinorUnits(1000), Some("  "));
        let without = listing("flat", RawPrice::MinorUnits(1000), None);

        let required = FilterCriteria {
            near_metro: Some(true),
            ..Default::default()
        };
        let not_important = FilterCriteria {
            near_metro: Some(false),
            ..Default::default()
        };

        assert!(matches_criteria(&with_label, &required));
        assert!(!matches_criteria(&blank_label, &required));
        assert!(!matches_criteria(&without, &required));
        assert!(matches_criteria(&without, &not_important));
    }

    #[test]
    fn test_unparseable_prices_are_dropped_before_filtering() {
        let raw = vec![
            RawListing {
                external_id: "a".to_string(),
                title: "flat".to_string(),
                price: RawPrice::Text("Договорная".to_string()),
                metro_label: None,
                link: "https://re.kufar.by/vi/a".to_string(),
            },
            RawListing {
                external_id: "b".to_string(),
                title: "flat".to_string(),
                price: RawPrice::Text("450 р.".to_string()),
                metro_label: None,
                link: "https://re.kufar.by/vi/b".to_string(),
            },
        ];

        let normalized = normalize_listings(raw);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].listing.external_id, "b");

        let passed = apply_filter(normalized, None);
        assert_eq!(passed.len(), 1);
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(&RawPrice::MinorUnits(125050)), "1 250,50 BYN");
        assert_eq!(format_price(&RawPrice::MinorUnits(50000)), "500,00 BYN");
        assert_eq!(format_price(&RawPrice::MinorUnits(123456700)), "1 234 567,00 BYN");
        assert_eq!(format_price(&RawPrice::Text(" 700 р. ".to_string())), "700 р.");
    }

    #[test]
    fn test_cleared_criteria_pass_everything() {
        let listings = vec![
            listing("studio", RawPrice::MinorUnits(40000), None),
            listing("3-room", RawPrice::MinorUnits(90000), Some("Восток")),
        ];
        let mut criteria = FilterCriteria {
            rooms: Some(2),
            ..Default::default()
        };
        criteria.clear(crate::listing_model::FilterField::Rooms);
        assert!(criteria.is_empty());

        let passed = apply_filter(listings.clone(), Some(&criteria));
        assert_eq!(passed, listings);
    }
}
