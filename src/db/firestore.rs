// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile, plan and free-listing quota)
//! - Listings (marketplace documents)

use crate::db::{collections, new_document_id, ListingStore, ProfileStore};
use crate::error::AppError;
use crate::models::{Listing, ListingPatch, ListingStatus, NewListing, QuotaReservation, UserProfile};
use async_trait::async_trait;
use chrono::Utc;
use firestore::errors::FirestoreError;
use firestore::FirestoreWritePrecondition;
use serde::{Deserialize, Serialize};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

fn db_error(e: impl std::fmt::Display) -> AppError {
    AppError::Persistence(e.to_string())
}

/// Map a failed write to an existing listing; a missing document is `NotFound`.
fn listing_write_error(listing_id: &str, e: FirestoreError) -> AppError {
    match e {
        FirestoreError::DataNotFoundError(_) => {
            AppError::NotFound(format!("Listing {} not found", listing_id))
        }
        other => db_error(other),
    }
}

/// Owner-editable listing fields. Only the paths in the update mask are written.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingEdit {
    #[serde(default)]
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    category_key: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    status: ListingStatus,
}

impl ListingEdit {
    fn from_patch(patch: ListingPatch) -> Self {
        let mut edit = Self::default();
        if let Some(title) = patch.title {
            edit.title = title;
        }
        // An empty price clears the field
        edit.price = patch.price.filter(|p| !p.is_empty());
        if let Some(category) = patch.category {
            edit.category_key = crate::services::feed::normalize_text(&category);
            edit.category = category;
        }
        if let Some(location) = patch.location {
            edit.location = location;
        }
        if let Some(description) = patch.description {
            edit.description = description;
        }
        if let Some(status) = patch.status {
            edit.status = status;
        }
        edit
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingMedia {
    images: Vec<String>,
    image_paths: Vec<String>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator accepts any token; skip local credential lookup.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| db_error(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new("owner".to_string().into()),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| db_error(format!("Failed to connect to Firestore Emulator: {}", e)))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    /// Run a read-modify-write on one profile inside a transaction.
    ///
    /// `update` receives the current profile (a fresh one if the document is
    /// missing) and returns the value to hand back plus whether to write.
    /// Firestore retries the closure on contention, so it must be pure.
    async fn modify_profile<T, F>(&self, user_id: &str, update: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: Fn(UserProfile) -> (T, Option<UserProfile>) + Send + Sync + Clone + 'static,
    {
        let user_id = user_id.to_string();

        self.client
            .run_transaction(|db, transaction| {
                let user_id = user_id.clone();
                let update = update.clone();
                Box::pin(async move {
                    let current: Option<UserProfile> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&user_id)
                        .await?;

                    let current =
                        current.unwrap_or_else(|| UserProfile::new(&user_id, None, Utc::now()));
                    let (result, write) = update(current);

                    if let Some(profile) = write {
                        db.fluent()
                            .update()
                            .in_col(collections::USERS)
                            .document_id(&user_id)
                            .object(&profile)
                            .add_to_transaction(transaction)?;
                    }

                    Ok(result)
                })
            })
            .await
            .map_err(|e| db_error(format!("Profile transaction failed: {}", e)))
    }
}

#[async_trait]
impl ProfileStore for FirestoreDb {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(db_error)
    }

    async fn merge_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<UserProfile, AppError> {
        let email = email.map(str::to_string);

        self.modify_profile(user_id, move |mut profile| {
            if email.is_some() {
                profile.email = email.clone();
            }
            (profile.clone(), Some(profile))
        })
        .await
    }

    async fn set_whatsapp(
        &self,
        user_id: &str,
        whatsapp: Option<String>,
    ) -> Result<UserProfile, AppError> {
        if self.get_profile(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        self.modify_profile(user_id, move |mut profile| {
            profile.whatsapp = whatsapp.clone();
            (profile.clone(), Some(profile))
        })
        .await
    }

    async fn reserve_free_listing(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<QuotaReservation, AppError> {
        self.modify_profile(user_id, move |mut profile| {
            if profile.free_listings_used >= limit {
                return (QuotaReservation::Exhausted(profile), None);
            }
            profile.free_listings_used += 1;
            (QuotaReservation::Reserved(profile.clone()), Some(profile))
        })
        .await
    }

    async fn release_free_listing(&self, user_id: &str) -> Result<UserProfile, AppError> {
        self.modify_profile(user_id, |mut profile| {
            profile.free_listings_used = profile.free_listings_used.saturating_sub(1);
            (profile.clone(), Some(profile))
        })
        .await
    }
}

#[async_trait]
impl ListingStore for FirestoreDb {
    async fn create_listing(&self, draft: NewListing) -> Result<Listing, AppError> {
        let listing = draft.into_listing(new_document_id()?, Utc::now());

        let _: () = self
            .client
            .fluent()
            .insert()
            .into(collections::LISTINGS)
            .document_id(&listing.id)
            .object(&listing)
            .execute()
            .await
            .map_err(db_error)?;

        tracing::debug!(listing_id = %listing.id, owner_id = %listing.owner_id, "Listing document created");
        Ok(listing)
    }

    async fn get_listing(&self, listing_id: &str) -> Result<Option<Listing>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::LISTINGS)
            .obj()
            .one(listing_id)
            .await
            .map_err(db_error)
    }

    async fn update_listing(
        &self,
        listing_id: &str,
        patch: ListingPatch,
    ) -> Result<Listing, AppError> {
        let fields = patch.field_paths();
        let edit = ListingEdit::from_patch(patch);

        self.client
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::LISTINGS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(listing_id)
            .object(&edit)
            .execute()
            .await
            .map_err(|e| listing_write_error(listing_id, e))
    }

    async fn set_listing_media(
        &self,
        listing_id: &str,
        images: Vec<String>,
        image_paths: Vec<String>,
    ) -> Result<(), AppError> {
        let media = ListingMedia {
            images,
            image_paths,
        };

        let _: () = self
            .client
            .fluent()
            .update()
            .fields(["images", "imagePaths"])
            .in_col(collections::LISTINGS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(listing_id)
            .object(&media)
            .execute()
            .await
            .map_err(|e| listing_write_error(listing_id, e))?;
        Ok(())
    }

    async fn delete_listing(&self, listing_id: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collections::LISTINGS)
            .document_id(listing_id)
            .execute()
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn recent_listings(
        &self,
        category_key: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Listing>, AppError> {
        let category_key = category_key.map(str::to_string);

        self.client
            .fluent()
            .select()
            .from(collections::LISTINGS)
            .filter(move |q| {
                q.for_all([
                    q.field("status").eq("active"),
                    category_key
                        .as_ref()
                        .and_then(|key| q.field("categoryKey").eq(key.as_str())),
                ])
            })
            .order_by([("createdAt", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(db_error)
    }

    async fn listings_for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<Listing>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::LISTINGS)
            .filter(|q| q.for_all([q.field("ownerId").eq(owner_id)]))
            .order_by([("createdAt", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(db_error)
    }
}
