// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listing lifecycle: plan-limited creation, owner edits, deletion and the feed.
//!
//! Creation runs in a fixed order so a failure touches as little as possible:
//!
//! 1. validate the form (nothing written yet)
//! 2. truncate photos to the plan cap
//! 3. free plan: atomically reserve one slot of the lifetime quota
//! 4. create the listing document with empty media
//! 5. upload photos (concurrently, results kept in submission order)
//! 6. patch `images` / `imagePaths` onto the document
//!
//! The reservation in step 3 is the quota increment. If step 5 or 6 fails
//! the document and any uploaded blobs are removed and the slot is released,
//! so `freeListingsUsed` only ever counts listings that were completed.

use crate::db::{ListingStore, ProfileStore};
use crate::error::AppError;
use crate::middleware::auth::Session;
use crate::models::{
    Condition, Listing, ListingKind, ListingPatch, NewListing, Plan,
    QuotaReservation, ServiceType, UserProfile, MAX_FREE_LISTINGS,
};
use crate::services::account::validate_whatsapp;
use crate::services::feed::{self, FeedFilter, SortOrder};
use crate::services::profile_hub::ProfileHub;
use crate::services::storage::{listing_blob_path, ObjectStorage, PhotoUpload};
use chrono::Utc;
use futures_util::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;

const MAX_CONCURRENT_UPLOADS: usize = 4;
const MAX_CONCURRENT_DELETES: usize = 8;
const MAX_TITLE_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 5000;
const OWNER_LISTINGS_LIMIT: u32 = 50;

/// Raw listing form as submitted by the seller.
#[derive(Debug, Clone, Default)]
pub struct ListingForm {
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub price: Option<String>,
    pub kind: Option<String>,
    pub condition: Option<String>,
    pub service_type: Option<String>,
    pub whatsapp: Option<String>,
    /// Photos in submission order; index 0 becomes the cover image
    pub photos: Vec<PhotoUpload>,
}

/// Feed query parameters after parsing.
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    pub category: Option<String>,
    pub text: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub sort: SortOrder,
}

impl FeedQuery {
    pub fn filter(&self) -> FeedFilter {
        let mut filter = FeedFilter::new().price_range(self.min_price, self.max_price);
        if let Some(category) = &self.category {
            filter = filter.category(category);
        }
        if let Some(text) = &self.text {
            filter = filter.text(text);
        }
        filter
    }
}

/// Fully validated scalar fields; photos are handled separately.
struct ValidatedForm {
    title: String,
    description: String,
    location: String,
    category: String,
    price: Option<String>,
    kind: ListingKind,
    condition: Option<Condition>,
    service_type: Option<ServiceType>,
    whatsapp: Option<String>,
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn check_length(value: &str, field: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

fn validate_price(price: Option<&str>) -> Result<Option<String>, AppError> {
    match non_empty(price) {
        Some(p) if !feed::is_valid_price_format(p) => {
            Err(AppError::Validation(format!("price is not a number: {}", p)))
        }
        other => Ok(other.map(str::to_string)),
    }
}

fn validate_form(form: &ListingForm) -> Result<ValidatedForm, AppError> {
    let title = required(&form.title, "title")?;
    check_length(&title, "title", MAX_TITLE_LEN)?;
    let category = required(&form.category, "category")?;
    let location = required(&form.location, "location")?;
    let description = required(&form.description, "description")?;
    check_length(&description, "description", MAX_DESCRIPTION_LEN)?;

    let price = validate_price(form.price.as_deref())?;
    let kind: ListingKind = non_empty(form.kind.as_deref()).unwrap_or("").parse()?;

    // Products carry a condition, services a delivery mode; never both.
    let (condition, service_type) = match kind {
        ListingKind::Product => (
            Some(match non_empty(form.condition.as_deref()) {
                Some(c) => c.parse()?,
                None => Condition::default(),
            }),
            None,
        ),
        ListingKind::Service => (
            None,
            Some(match non_empty(form.service_type.as_deref()) {
                Some(s) => s.parse()?,
                None => ServiceType::default(),
            }),
        ),
    };

    Ok(ValidatedForm {
        title,
        description,
        location,
        category,
        price,
        kind,
        condition,
        service_type,
        whatsapp: non_empty(form.whatsapp.as_deref())
            .map(validate_whatsapp)
            .transpose()?,
    })
}

/// Keep the first `plan.max_photos()` photos, in submission order.
pub fn truncate_photos(mut photos: Vec<PhotoUpload>, plan: Plan) -> Vec<PhotoUpload> {
    photos.truncate(plan.max_photos());
    photos
}

fn validate_photo(photo: &PhotoUpload, max_bytes: usize) -> Result<(), AppError> {
    if !photo.content_type.starts_with("image/") {
        return Err(AppError::Validation(format!(
            "{} is not an image ({})",
            photo.file_name, photo.content_type
        )));
    }
    if photo.bytes.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "{} is larger than {} bytes",
            photo.file_name, max_bytes
        )));
    }
    Ok(())
}

fn ensure_owner(listing: &Listing, caller: &Session) -> Result<(), AppError> {
    if listing.owner_id != caller.subject_id {
        tracing::warn!(
            listing_id = %listing.id,
            caller = %caller.subject_id,
            "Rejected change to listing owned by another user"
        );
        return Err(AppError::Forbidden(
            "only the owner may change this listing".to_string(),
        ));
    }
    Ok(())
}

/// Listing operations over the document and object stores.
#[derive(Clone)]
pub struct ListingService {
    listings: Arc<dyn ListingStore>,
    profiles: Arc<dyn ProfileStore>,
    storage: Arc<dyn ObjectStorage>,
    hub: ProfileHub,
    max_photo_bytes: usize,
}

impl ListingService {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        profiles: Arc<dyn ProfileStore>,
        storage: Arc<dyn ObjectStorage>,
        hub: ProfileHub,
        max_photo_bytes: usize,
    ) -> Self {
        Self {
            listings,
            profiles,
            storage,
            hub,
            max_photo_bytes,
        }
    }

    /// Create a listing from a form submission, enforcing plan limits.
    pub async fn create_listing(
        &self,
        caller: Option<&Session>,
        form: ListingForm,
    ) -> Result<Listing, AppError> {
        let caller = caller
            .filter(|s| !s.subject_id.is_empty())
            .ok_or(AppError::Unauthenticated)?;
        let owner_id = caller.subject_id.as_str();

        let fields = validate_form(&form)?;
        if form.photos.is_empty() {
            return Err(AppError::Validation("no photos".to_string()));
        }

        let profile = self
            .profiles
            .get_profile(owner_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(owner_id, caller.email.clone(), Utc::now()));
        let plan = profile.plan;

        let submitted = form.photos.len();
        let photos = truncate_photos(form.photos, plan);
        if photos.len() < submitted {
            tracing::debug!(
                owner_id,
                submitted,
                kept = photos.len(),
                plan = plan.as_str(),
                "Dropped photos beyond plan cap"
            );
        }
        for photo in &photos {
            validate_photo(photo, self.max_photo_bytes)?;
        }

        let reserved = match plan {
            Plan::Free => match self
                .profiles
                .reserve_free_listing(owner_id, MAX_FREE_LISTINGS)
                .await?
            {
                QuotaReservation::Reserved(updated) => {
                    tracing::debug!(owner_id, used = updated.free_listings_used, "Reserved free listing slot");
                    Some(updated)
                }
                QuotaReservation::Exhausted(_) => {
                    tracing::info!(owner_id, "Free listing quota exhausted");
                    return Err(AppError::QuotaExceeded {
                        limit: MAX_FREE_LISTINGS,
                    });
                }
            },
            Plan::Pro => None,
        };

        let whatsapp = fields.whatsapp.or(profile.whatsapp);
        let draft = NewListing {
            owner_id: owner_id.to_string(),
            title: fields.title,
            description: fields.description,
            location: fields.location,
            category: fields.category,
            price: fields.price,
            kind: fields.kind,
            condition: fields.condition,
            service_type: fields.service_type,
            whatsapp,
            plan_at_creation: plan,
        };

        let mut listing = match self.listings.create_listing(draft).await {
            Ok(listing) => listing,
            Err(e) => {
                if reserved.is_some() {
                    self.release_slot(owner_id).await;
                }
                return Err(e);
            }
        };

        tracing::info!(
            owner_id,
            listing_id = %listing.id,
            photos = photos.len(),
            plan = plan.as_str(),
            "Listing document created"
        );

        let paths: Vec<String> = photos
            .iter()
            .enumerate()
            .map(|(index, photo)| listing_blob_path(owner_id, &listing.id, index, &photo.file_name))
            .collect();

        let media = self.upload_photos(paths.clone(), photos).await;
        let media = match media {
            Ok(urls) => self
                .listings
                .set_listing_media(&listing.id, urls.clone(), paths.clone())
                .await
                .map(|()| urls),
            Err(e) => Err(e),
        };

        match media {
            Ok(urls) => {
                listing.images = urls;
                listing.image_paths = paths;
            }
            Err(e) => {
                self.abandon_listing(&listing, &paths, reserved.is_some())
                    .await;
                return Err(e);
            }
        }

        if let Some(updated) = reserved {
            self.hub.publish(&updated);
        }

        tracing::info!(
            owner_id,
            listing_id = %listing.id,
            images = listing.images.len(),
            "Listing published"
        );

        Ok(listing)
    }

    /// Upload every photo; URLs come back in the order of `paths`.
    async fn upload_photos(
        &self,
        paths: Vec<String>,
        photos: Vec<PhotoUpload>,
    ) -> Result<Vec<String>, AppError> {
        stream::iter(paths.into_iter().zip(photos))
            .map(|(path, photo)| {
                let storage = Arc::clone(&self.storage);
                async move { storage.upload(&path, &photo).await }
            })
            .buffered(MAX_CONCURRENT_UPLOADS)
            .try_collect()
            .await
    }

    /// Undo a half-created listing. Cleanup failures are logged, not returned.
    async fn abandon_listing(&self, listing: &Listing, paths: &[String], release: bool) {
        tracing::warn!(
            owner_id = %listing.owner_id,
            listing_id = %listing.id,
            "Listing creation failed, removing partial listing"
        );

        if let Err(e) = self.listings.delete_listing(&listing.id).await {
            tracing::warn!(listing_id = %listing.id, error = %e, "Failed to delete partial listing");
        }

        self.delete_blobs(&listing.id, paths).await;

        if release {
            self.release_slot(&listing.owner_id).await;
        }
    }

    async fn release_slot(&self, owner_id: &str) {
        match self.profiles.release_free_listing(owner_id).await {
            Ok(profile) => {
                tracing::debug!(owner_id, used = profile.free_listings_used, "Released free listing slot");
                self.hub.publish(&profile);
            }
            Err(e) => {
                tracing::warn!(owner_id, error = %e, "Failed to release free listing slot");
            }
        }
    }

    /// Best-effort blob removal; failures are logged and swallowed.
    async fn delete_blobs(&self, listing_id: &str, paths: &[String]) {
        let failures = stream::iter(paths.to_vec())
            .map(|path| {
                let storage = Arc::clone(&self.storage);
                let listing_id = listing_id.to_string();
                async move {
                    storage.delete(&path).await.map_err(|e| {
                        tracing::warn!(listing_id = %listing_id, path = %path, error = %e, "Failed to delete listing photo");
                        e
                    })
                }
            })
            .buffer_unordered(MAX_CONCURRENT_DELETES)
            .filter(|result| std::future::ready(result.is_err()))
            .count()
            .await;

        if failures > 0 {
            tracing::warn!(listing_id, failures, "Some listing photos were left in storage");
        }
    }

    /// Fetch one listing; absent listings are `None`, not an error.
    pub async fn get_listing(&self, listing_id: &str) -> Result<Option<Listing>, AppError> {
        self.listings.get_listing(listing_id).await
    }

    /// Apply an owner's edit.
    ///
    /// Only the patched fields are written, so concurrent edits resolve per
    /// field with the later write winning. Media written meanwhile is kept,
    /// and a listing deleted meanwhile stays deleted (`NotFound`).
    pub async fn update_listing(
        &self,
        caller: &Session,
        listing_id: &str,
        patch: ListingPatch,
    ) -> Result<Listing, AppError> {
        let patch = validate_patch(patch)?;

        let listing = self
            .listings
            .get_listing(listing_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", listing_id)))?;
        ensure_owner(&listing, caller)?;

        if patch.is_empty() {
            return Ok(listing);
        }

        let fields = patch.field_paths();
        let listing = self.listings.update_listing(listing_id, patch).await?;

        tracing::info!(listing_id, owner_id = %listing.owner_id, ?fields, "Listing updated");
        Ok(listing)
    }

    /// Delete a listing and, best-effort, its photos.
    ///
    /// Deleting a missing listing succeeds. The free quota is not given back.
    pub async fn delete_listing(&self, caller: &Session, listing_id: &str) -> Result<(), AppError> {
        let Some(listing) = self.listings.get_listing(listing_id).await? else {
            tracing::debug!(listing_id, "Delete of missing listing ignored");
            return Ok(());
        };
        ensure_owner(&listing, caller)?;

        self.listings.delete_listing(listing_id).await?;
        tracing::info!(listing_id, owner_id = %listing.owner_id, "Listing deleted");

        self.delete_blobs(listing_id, &listing.image_paths).await;
        Ok(())
    }

    /// The caller's own listings, any status, newest first.
    pub async fn owner_listings(&self, caller: &Session) -> Result<Vec<Listing>, AppError> {
        self.listings
            .listings_for_owner(&caller.subject_id, OWNER_LISTINGS_LIMIT)
            .await
    }

    /// Public feed: one bounded store page, narrowed and ordered in memory.
    pub async fn feed(&self, query: &FeedQuery, limit: u32) -> Result<Vec<Listing>, AppError> {
        let filter = query.filter();
        let page = self
            .listings
            .recent_listings(filter.category_key(), limit)
            .await?;

        let fetched = page.len();
        let listings = feed::apply(page, &filter, query.sort);

        tracing::debug!(fetched, returned = listings.len(), sort = ?query.sort, "Feed served");
        Ok(listings)
    }
}

fn validate_patch(patch: ListingPatch) -> Result<ListingPatch, AppError> {
    let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string());

    let title = trimmed(patch.title);
    if let Some(title) = &title {
        required(title, "title")?;
        check_length(title, "title", MAX_TITLE_LEN)?;
    }
    let category = trimmed(patch.category)
        .map(|c| required(&c, "category"))
        .transpose()?;
    let location = trimmed(patch.location)
        .map(|l| required(&l, "location"))
        .transpose()?;
    let description = trimmed(patch.description)
        .map(|d| required(&d, "description"))
        .transpose()?;
    if let Some(description) = &description {
        check_length(description, "description", MAX_DESCRIPTION_LEN)?;
    }

    // An empty price clears it
    let price = match trimmed(patch.price) {
        Some(p) if p.is_empty() => Some(p),
        Some(p) => validate_price(Some(&p))?,
        None => None,
    };

    Ok(ListingPatch {
        title,
        price,
        category,
        location,
        description,
        status: patch.status,
    })
}
