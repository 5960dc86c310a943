// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod category;
pub mod listing;
pub mod profile;

pub use listing::{
    Condition, Listing, ListingKind, ListingPatch, ListingStatus, NewListing, ServiceType,
};
pub use profile::{Plan, QuotaReservation, UserProfile, MAX_FREE_LISTINGS};
