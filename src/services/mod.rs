// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod account;
pub mod contact;
pub mod feed;
pub mod identity;
pub mod listing;
pub mod profile_hub;
pub mod storage;

pub use account::AccountService;
pub use identity::{Identity, IdentityVerifier};
pub use listing::{FeedQuery, ListingForm, ListingService};
pub use profile_hub::{ProfileHub, ProfileSubscription};
pub use storage::{FirebaseStorage, InMemoryStorage, ObjectStorage, PhotoUpload};
