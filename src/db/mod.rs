// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore, plus an in-memory store for tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::InMemoryDb;

use crate::error::AppError;
use crate::models::{Listing, ListingPatch, NewListing, QuotaReservation, UserProfile};
use async_trait::async_trait;
use ring::rand::{SecureRandom, SystemRandom};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const LISTINGS: &str = "listings";
}

const DOCUMENT_ID_LEN: usize = 20;
const DOCUMENT_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random 20-character document ID in the Firestore auto-ID style.
pub fn new_document_id() -> Result<String, AppError> {
    let mut bytes = [0u8; DOCUMENT_ID_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))?;

    Ok(bytes
        .iter()
        .map(|b| DOCUMENT_ID_ALPHABET[*b as usize % DOCUMENT_ID_ALPHABET.len()] as char)
        .collect())
}

/// User profile documents (`users/{subject_id}`).
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError>;

    /// Create the profile on first sign-in, or refresh its email.
    ///
    /// Never resets `plan`, `freeListingsUsed` or `createdAt` of an existing profile.
    async fn merge_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<UserProfile, AppError>;

    async fn set_whatsapp(
        &self,
        user_id: &str,
        whatsapp: Option<String>,
    ) -> Result<UserProfile, AppError>;

    /// Atomically check `freeListingsUsed < limit` and increment it.
    async fn reserve_free_listing(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<QuotaReservation, AppError>;

    /// Give back a reservation whose listing was never completed.
    async fn release_free_listing(&self, user_id: &str) -> Result<UserProfile, AppError>;
}

/// Listing documents (`listings/{id}`).
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Persist a new listing, assigning its ID and creation time.
    async fn create_listing(&self, draft: NewListing) -> Result<Listing, AppError>;

    async fn get_listing(&self, listing_id: &str) -> Result<Option<Listing>, AppError>;

    /// Write only the fields set in `patch` and return the stored listing.
    ///
    /// Other fields are left as stored. A missing listing is `NotFound`, never recreated.
    async fn update_listing(
        &self,
        listing_id: &str,
        patch: ListingPatch,
    ) -> Result<Listing, AppError>;

    /// Replace `images` and `imagePaths` of an existing listing, leaving other fields alone.
    async fn set_listing_media(
        &self,
        listing_id: &str,
        images: Vec<String>,
        image_paths: Vec<String>,
    ) -> Result<(), AppError>;

    async fn delete_listing(&self, listing_id: &str) -> Result<(), AppError>;

    /// Active listings, newest first, optionally restricted to one normalized category.
    async fn recent_listings(
        &self,
        category_key: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Listing>, AppError>;

    /// All listings of one owner (any status), newest first.
    async fn listings_for_owner(&self, owner_id: &str, limit: u32)
        -> Result<Vec<Listing>, AppError>;
}
