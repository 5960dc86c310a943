// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory document store with the same semantics as Firestore.
//!
//! Used by tests and by `--in-memory` local runs. Read-modify-write
//! operations hold the map shard lock for their whole duration, which makes
//! the quota reservation atomic.

use crate::db::{new_document_id, ListingStore, ProfileStore};
use crate::error::AppError;
use crate::models::{
    Listing, ListingPatch, ListingStatus, NewListing, QuotaReservation, UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct InMemoryDb {
    profiles: DashMap<String, UserProfile>,
    listings: DashMap<String, Listing>,
    fail_media_updates: AtomicBool,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile directly (test setup).
    pub fn put_profile(&self, profile: UserProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Make `set_listing_media` fail, simulating a lost patch-back.
    pub fn fail_media_updates(&self, fail: bool) {
        self.fail_media_updates.store(fail, Ordering::SeqCst);
    }

    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }
}

#[async_trait]
impl ProfileStore for InMemoryDb {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    async fn merge_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<UserProfile, AppError> {
        let mut entry = self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id, None, Utc::now()));

        if let Some(email) = email {
            entry.email = Some(email.to_string());
        }
        Ok(entry.clone())
    }

    async fn set_whatsapp(
        &self,
        user_id: &str,
        whatsapp: Option<String>,
    ) -> Result<UserProfile, AppError> {
        let mut profile = self
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        profile.whatsapp = whatsapp;
        Ok(profile.clone())
    }

    async fn reserve_free_listing(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<QuotaReservation, AppError> {
        let mut profile = self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id, None, Utc::now()));

        if profile.free_listings_used >= limit {
            return Ok(QuotaReservation::Exhausted(profile.clone()));
        }
        profile.free_listings_used += 1;
        Ok(QuotaReservation::Reserved(profile.clone()))
    }

    async fn release_free_listing(&self, user_id: &str) -> Result<UserProfile, AppError> {
        let mut profile = self
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        profile.free_listings_used = profile.free_listings_used.saturating_sub(1);
        Ok(profile.clone())
    }
}

#[async_trait]
impl ListingStore for InMemoryDb {
    async fn create_listing(&self, draft: NewListing) -> Result<Listing, AppError> {
        let listing = draft.into_listing(new_document_id()?, Utc::now());
        self.listings.insert(listing.id.clone(), listing.clone());
        Ok(listing)
    }

    async fn get_listing(&self, listing_id: &str) -> Result<Option<Listing>, AppError> {
        Ok(self.listings.get(listing_id).map(|l| l.clone()))
    }

    async fn update_listing(
        &self,
        listing_id: &str,
        patch: ListingPatch,
    ) -> Result<Listing, AppError> {
        let mut listing = self
            .listings
            .get_mut(listing_id)
            .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", listing_id)))?;
        patch.apply_to(&mut listing);
        Ok(listing.clone())
    }

    async fn set_listing_media(
        &self,
        listing_id: &str,
        images: Vec<String>,
        image_paths: Vec<String>,
    ) -> Result<(), AppError> {
        if self.fail_media_updates.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("injected media update failure".to_string()));
        }

        let mut listing = self
            .listings
            .get_mut(listing_id)
            .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", listing_id)))?;
        listing.images = images;
        listing.image_paths = image_paths;
        Ok(())
    }

    async fn delete_listing(&self, listing_id: &str) -> Result<(), AppError> {
        self.listings.remove(listing_id);
        Ok(())
    }

    async fn recent_listings(
        &self,
        category_key: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Listing>, AppError> {
        let mut listings: Vec<Listing> = self
            .listings
            .iter()
            .filter(|l| l.status == ListingStatus::Active)
            .filter(|l| category_key.is_none_or(|key| l.category_key == key))
            .map(|l| l.clone())
            .collect();

        listings.sort_by_key(|l| Reverse(l.created_at));
        listings.truncate(limit as usize);
        Ok(listings)
    }

    async fn listings_for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<Listing>, AppError> {
        let mut listings: Vec<Listing> = self
            .listings
            .iter()
            .filter(|l| l.owner_id == owner_id)
            .map(|l| l.clone())
            .collect();

        listings.sort_by_key(|l| Reverse(l.created_at));
        listings.truncate(limit as usize);
        Ok(listings)
    }
}
