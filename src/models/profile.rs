// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile model and subscription plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Total listings a user may ever create while on the free plan.
pub const MAX_FREE_LISTINGS: u32 = 2;

/// Subscription tier gating listing count and photo count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
}

impl Plan {
    /// Maximum photos accepted per listing on this plan.
    pub fn max_photos(self) -> usize {
        match self {
            Plan::Free => 3,
            Plan::Pro => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
        }
    }
}

/// User profile stored in Firestore (`users/{subject_id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Identity-provider subject (also used as document ID)
    #[serde(default)]
    pub id: String,
    /// Email from the identity provider, refreshed on sign-in
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    /// Free listings ever created. Never decremented by listing deletion.
    #[serde(default)]
    pub free_listings_used: u32,
    /// Contact number used as the default for new listings
    #[serde(default)]
    pub whatsapp: Option<String>,
    /// When the profile was first created
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Fresh free-plan profile for a first sign-in.
    pub fn new(id: &str, email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            email,
            plan: Plan::Free,
            free_listings_used: 0,
            whatsapp: None,
            created_at: now,
        }
    }

    /// Free listings still available, or `None` on the pro plan.
    pub fn free_listings_remaining(&self) -> Option<u32> {
        match self.plan {
            Plan::Free => Some(MAX_FREE_LISTINGS.saturating_sub(self.free_listings_used)),
            Plan::Pro => None,
        }
    }
}

/// Outcome of an atomic free-quota check-and-increment.
#[derive(Debug, Clone)]
pub enum QuotaReservation {
    /// A slot was taken; the profile reflects the incremented counter.
    Reserved(UserProfile),
    /// The counter was already at the limit; nothing was written.
    Exhausted(UserProfile),
}
