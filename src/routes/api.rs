// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::auth::Session;
use crate::models::{ListingPatch, ListingStatus, Plan, UserProfile, MAX_FREE_LISTINGS};
use crate::routes::listings::ListingResponse;
use crate::services::{ListingForm, PhotoUpload};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Room for form text fields on top of the photos themselves.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    // Oversized uploads are rejected before the handler runs
    let max_body = Plan::Pro.max_photos() * config.max_photo_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/whatsapp", put(put_whatsapp))
        .route("/api/me/listings", get(get_my_listings))
        .route(
            "/api/listings",
            post(create_listing).layer(DefaultBodyLimit::max(max_body)),
        )
        .route(
            "/api/listings/{id}",
            patch(update_listing).delete(delete_listing),
        )
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileResponse {
    pub id: String,
    pub email: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub plan: Plan,
    pub free_listings_used: u32,
    pub free_listings_limit: u32,
    /// `null` on the pro plan
    pub free_listings_remaining: Option<u32>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub max_photos: usize,
    pub whatsapp: Option<String>,
    pub created_at: String,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            free_listings_remaining: profile.free_listings_remaining(),
            max_photos: profile.plan.max_photos(),
            created_at: format_utc_rfc3339(profile.created_at),
            id: profile.id,
            email: profile.email,
            plan: profile.plan,
            free_listings_used: profile.free_listings_used,
            free_listings_limit: MAX_FREE_LISTINGS,
            whatsapp: profile.whatsapp,
        }
    }
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<ProfileResponse>> {
    let profile = state.account_service.profile(&session).await?;
    Ok(Json(profile.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWhatsappRequest {
    /// `null` or blank clears the number
    #[validate(length(max = 32))]
    pub whatsapp: Option<String>,
}

fn validate_body(body: &impl Validate) -> Result<()> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string().replace('\n', "; ")))
}

async fn put_whatsapp(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<UpdateWhatsappRequest>,
) -> Result<Json<ProfileResponse>> {
    validate_body(&body)?;
    let profile = state
        .account_service
        .set_whatsapp(&session, body.whatsapp.as_deref())
        .await?;
    Ok(Json(profile.into()))
}

// ─── Listings ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MyListingsResponse {
    pub listings: Vec<ListingResponse>,
}

async fn get_my_listings(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<MyListingsResponse>> {
    let listings = state.listing_service.owner_listings(&session).await?;
    Ok(Json(MyListingsResponse {
        listings: listings.into_iter().map(Into::into).collect(),
    }))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("malformed form data: {}", e.body_text()))
}

/// Read the multipart listing form. File parts named `photos` (or `photo`)
/// keep their submission order; unknown fields are ignored.
async fn read_listing_form(mut multipart: Multipart) -> Result<ListingForm> {
    let mut form = ListingForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if matches!(name.as_str(), "photos" | "photo") {
            let file_name = field.file_name().unwrap_or("photo").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.is_empty() {
                continue;
            }
            form.photos.push(PhotoUpload {
                file_name,
                content_type,
                bytes,
            });
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "title" => form.title = value,
            "description" => form.description = value,
            "location" => form.location = value,
            "category" => form.category = value,
            "price" => form.price = Some(value),
            "kind" => form.kind = Some(value),
            "condition" => form.condition = Some(value),
            "serviceType" => form.service_type = Some(value),
            "whatsapp" => form.whatsapp = Some(value),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// Create a listing from a multipart form (fields plus `photos` files).
async fn create_listing(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ListingResponse>)> {
    let form = read_listing_form(multipart).await?;
    let listing = state
        .listing_service
        .create_listing(Some(&session), form)
        .await?;

    Ok((StatusCode::CREATED, Json(listing.into())))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateListingRequest {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 32))]
    pub price: Option<String>,
    #[validate(length(max = 80))]
    pub category: Option<String>,
    #[validate(length(max = 120))]
    pub location: Option<String>,
    #[validate(length(max = 6000))]
    pub description: Option<String>,
    pub status: Option<String>,
}

impl UpdateListingRequest {
    fn into_patch(self) -> Result<ListingPatch> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ListingStatus>)
            .transpose()?;

        Ok(ListingPatch {
            title: self.title,
            price: self.price,
            category: self.category,
            location: self.location,
            description: self.description,
            status,
        })
    }
}

async fn update_listing(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<UpdateListingRequest>,
) -> Result<Json<ListingResponse>> {
    validate_body(&body)?;
    let listing = state
        .listing_service
        .update_listing(&session, &id, body.into_patch()?)
        .await?;
    Ok(Json(listing.into()))
}

async fn delete_listing(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.listing_service.delete_listing(&session, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_profile_response_quota_fields() {
        let mut profile = UserProfile::new("u1", None, Utc::now());
        profile.free_listings_used = 1;

        let response = ProfileResponse::from(profile.clone());
        assert_eq!(response.free_listings_remaining, Some(1));
        assert_eq!(response.max_photos, 3);

        profile.plan = Plan::Pro;
        let response = ProfileResponse::from(profile);
        assert_eq!(response.free_listings_remaining, None);
        assert_eq!(response.max_photos, 7);
    }

    #[test]
    fn test_update_request_length_limits() {
        let request = UpdateListingRequest {
            price: Some("9".repeat(40)),
            ..Default::default()
        };
        assert!(matches!(validate_body(&request), Err(AppError::Validation(_))));

        let request = UpdateListingRequest {
            title: Some("Mesa".to_string()),
            ..Default::default()
        };
        assert!(validate_body(&request).is_ok());
    }

    #[test]
    fn test_update_request_rejects_unknown_status() {
        let request = UpdateListingRequest {
            status: Some("sold".to_string()),
            ..Default::default()
        };
        assert!(matches!(request.into_patch(), Err(AppError::Validation(_))));
    }
}
