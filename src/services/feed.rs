// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory narrowing and ordering of a fetched listing page.
//!
//! The store returns a bounded page ordered by `createdAt` descending,
//! optionally restricted to one category. Everything here is pure: the same
//! snapshot and parameters always give the same result.

use crate::models::Listing;
use serde::Deserialize;
use std::cmp::Reverse;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize text for comparison: strip accents, lowercase, `&` → `e`,
/// collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    let folded: String = input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c == '&' { 'e' } else { c })
        .collect::<String>()
        .to_lowercase();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a free-form price into whole currency units.
///
/// A trailing decimal part of one or two digits is dropped, every other
/// non-digit is treated as a separator: `"1 500,00"`, `"1.500"` and `"1500"`
/// all give 1500. Returns `None` when no digits remain.
pub fn parse_price(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();

    let integral = match trimmed.rfind(['.', ',']) {
        Some(pos) => {
            let fraction = &trimmed[pos + 1..];
            if (1..=2).contains(&fraction.len()) && fraction.bytes().all(|b| b.is_ascii_digit())
            {
                &trimmed[..pos]
            } else {
                trimmed
            }
        }
        None => trimmed,
    };

    let digits: String = integral.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Loose format check applied to prices on input.
///
/// Accepts digits grouped by spaces, dots or commas (`"1500"`, `"1 500,00"`).
pub fn is_valid_price_format(raw: &str) -> bool {
    let s = raw.trim();
    let starts_with_digit = s.chars().next().is_some_and(|c| c.is_ascii_digit());
    let ends_with_digit = s.chars().last().is_some_and(|c| c.is_ascii_digit());

    starts_with_digit
        && ends_with_digit
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '.' | ','))
}

/// Feed ordering requested via the `sort` query parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Newest first (store order)
    #[default]
    Recent,
    /// Oldest first
    Old,
    PriceAsc,
    PriceDesc,
}

impl SortOrder {
    /// Parse a query value. Unknown or missing values fall back to `Recent`.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("old") => SortOrder::Old,
            Some("price_asc") => SortOrder::PriceAsc,
            Some("price_desc") => SortOrder::PriceDesc,
            _ => SortOrder::Recent,
        }
    }
}

/// Conjunction of optional feed predicates. Unset predicates pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilter {
    category_key: Option<String>,
    text: Option<String>,
    min_price: Option<u64>,
    max_price: Option<u64>,
}

impl FeedFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one category (compared after normalization).
    pub fn category(mut self, category: &str) -> Self {
        self.category_key = Some(normalize_text(category)).filter(|k| !k.is_empty());
        self
    }

    /// Substring search over title, description, location and category.
    pub fn text(mut self, query: &str) -> Self {
        self.text = Some(normalize_text(query)).filter(|q| !q.is_empty());
        self
    }

    /// Inclusive price bounds. Listings without a parsable price never match
    /// an active bound.
    pub fn price_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    /// Normalized category, for pushing the equality into the store query.
    pub fn category_key(&self) -> Option<&str> {
        self.category_key.as_deref()
    }

    pub fn has_price_bounds(&self) -> bool {
        self.min_price.is_some() || self.max_price.is_some()
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(key) = &self.category_key {
            if normalize_text(&listing.category) != *key {
                return false;
            }
        }

        if let Some(needle) = &self.text {
            let haystack = normalize_text(&format!(
                "{} {} {} {}",
                listing.title, listing.description, listing.location, listing.category
            ));
            if !haystack.contains(needle.as_str()) {
                return false;
            }
        }

        if self.has_price_bounds() {
            let Some(price) = listing.price.as_deref().and_then(parse_price) else {
                return false;
            };
            if self.min_price.is_some_and(|min| price < min) {
                return false;
            }
            if self.max_price.is_some_and(|max| price > max) {
                return false;
            }
        }

        true
    }
}

/// Keep the listings matching every set predicate, preserving order.
pub fn filter_listings(listings: Vec<Listing>, filter: &FeedFilter) -> Vec<Listing> {
    listings.into_iter().filter(|l| filter.matches(l)).collect()
}

/// Stable sort; ties keep their incoming order.
pub fn sort_listings(listings: &mut [Listing], order: SortOrder) {
    // Missing prices compare as 0.
    let price_key = |l: &Listing| l.price.as_deref().and_then(parse_price).unwrap_or(0);

    match order {
        SortOrder::Recent => listings.sort_by_key(|l| Reverse(l.created_at)),
        SortOrder::Old => listings.sort_by_key(|l| l.created_at),
        SortOrder::PriceAsc => listings.sort_by_key(price_key),
        SortOrder::PriceDesc => listings.sort_by_key(|l| Reverse(price_key(l))),
    }
}

/// Filter then sort a fetched snapshot.
pub fn apply(listings: Vec<Listing>, filter: &FeedFilter, order: SortOrder) -> Vec<Listing> {
    let mut narrowed = filter_listings(listings, filter);
    sort_listings(&mut narrowed, order);
    narrowed
}
