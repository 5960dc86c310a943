// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public marketplace routes: feed, listing detail and categories.

use crate::error::{AppError, Result};
use crate::models::category::CATEGORIES;
use crate::models::{Condition, Listing, ListingKind, ListingStatus, Plan, ServiceType};
use crate::services::contact::{listing_inquiry_text, whatsapp_link};
use crate::services::feed::{parse_price, SortOrder};
use crate::services::FeedQuery;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/categories", get(get_categories))
        .route("/listings", get(get_feed))
        .route("/listings/{id}", get(get_listing))
}

/// Listing as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ListingResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    /// Price exactly as entered
    pub price: Option<String>,
    /// Price in whole dobras, when it parses
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub price_value: Option<u64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub kind: ListingKind,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub condition: Option<Condition>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub service_type: Option<ServiceType>,
    pub images: Vec<String>,
    pub cover_image: Option<String>,
    pub whatsapp: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub status: ListingStatus,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub plan_at_creation: Option<Plan>,
    pub created_at: String,
}

impl From<Listing> for ListingResponse {
    fn from(listing: Listing) -> Self {
        Self {
            price_value: listing.price.as_deref().and_then(parse_price),
            cover_image: listing.cover_image().map(str::to_string),
            created_at: format_utc_rfc3339(listing.created_at),
            id: listing.id,
            owner_id: listing.owner_id,
            title: listing.title,
            description: listing.description,
            location: listing.location,
            category: listing.category,
            price: listing.price,
            kind: listing.kind,
            condition: listing.condition,
            service_type: listing.service_type,
            images: listing.images,
            whatsapp: listing.whatsapp,
            status: listing.status,
            plan_at_creation: listing.plan_at_creation,
        }
    }
}

/// Listing detail with a ready-made contact link.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ListingDetailResponse {
    #[serde(flatten)]
    #[cfg_attr(feature = "binding-generation", ts(flatten))]
    pub listing: ListingResponse,
    /// `https://wa.me/...` link with a pre-filled inquiry, when the seller left a number
    pub contact_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FeedResponse {
    pub listings: Vec<ListingResponse>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

/// Feed query string. Every parameter is optional and parsed leniently.
#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    cat: Option<String>,
    sort: Option<String>,
    min: Option<String>,
    max: Option<String>,
    q: Option<String>,
    limit: Option<String>,
}

impl FeedParams {
    fn to_query(&self) -> FeedQuery {
        FeedQuery {
            category: self.cat.clone(),
            text: self.q.clone(),
            min_price: self.min.as_deref().and_then(parse_price),
            max_price: self.max.as_deref().and_then(parse_price),
            sort: SortOrder::from_param(self.sort.as_deref()),
        }
    }

    fn limit(&self) -> Option<u32> {
        self.limit.as_deref().and_then(|l| l.trim().parse().ok())
    }
}

async fn get_categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
    })
}

/// Public feed of active listings.
async fn get_feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedResponse>> {
    let limit = state.config.feed_limit(params.limit());
    let listings = state.listing_service.feed(&params.to_query(), limit).await?;

    let listings: Vec<ListingResponse> = listings.into_iter().map(Into::into).collect();
    Ok(Json(FeedResponse {
        count: listings.len(),
        listings,
    }))
}

/// Listing detail.
async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ListingDetailResponse>> {
    let listing = state
        .listing_service
        .get_listing(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", id)))?;

    let contact_url = listing
        .whatsapp
        .as_deref()
        .and_then(|number| whatsapp_link(number, Some(&listing_inquiry_text(&listing.title))));

    Ok(Json(ListingDetailResponse {
        listing: listing.into(),
        contact_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_params_parse_leniently() {
        let params = FeedParams {
            cat: Some("Imóveis".to_string()),
            sort: Some("bogus".to_string()),
            min: Some("1 000".to_string()),
            max: Some("abc".to_string()),
            q: None,
            limit: Some("ten".to_string()),
        };

        let query = params.to_query();
        assert_eq!(query.sort, SortOrder::Recent);
        assert_eq!(query.min_price, Some(1000));
        assert_eq!(query.max_price, None);
        assert_eq!(query.filter().category_key(), Some("imoveis"));
        assert_eq!(params.limit(), None);
    }
}
