// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listing model for storage and API.

use crate::error::AppError;
use crate::models::Plan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whether a listing sells a product or offers a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    #[default]
    Product,
    Service,
}

/// Condition of a product listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    #[default]
    Novo,
    Usado,
}

/// How a service listing is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    Presencial,
    Online,
    #[default]
    Ambos,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Inactive,
}

impl FromStr for ListingKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "product" => Ok(ListingKind::Product),
            "service" => Ok(ListingKind::Service),
            other => Err(AppError::Validation(format!("unknown listing kind: {other}"))),
        }
    }
}

impl FromStr for Condition {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Novo" => Ok(Condition::Novo),
            "Usado" => Ok(Condition::Usado),
            other => Err(AppError::Validation(format!("unknown condition: {other}"))),
        }
    }
}

impl FromStr for ServiceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Presencial" => Ok(ServiceType::Presencial),
            "Online" => Ok(ServiceType::Online),
            "Ambos" => Ok(ServiceType::Ambos),
            other => Err(AppError::Validation(format!("unknown service type: {other}"))),
        }
    }
}

impl FromStr for ListingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(ListingStatus::Active),
            "inactive" => Ok(ListingStatus::Inactive),
            other => Err(AppError::Validation(format!("unknown status: {other}"))),
        }
    }
}

/// Stored listing record in Firestore (`listings/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Store-assigned ID (also used as document ID)
    pub id: String,
    /// Owning user's subject ID. Set once at creation.
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Category label as entered
    pub category: String,
    /// Normalized category used for store-side equality filtering
    #[serde(default)]
    pub category_key: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub kind: ListingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    /// Download URLs; index 0 is the cover image
    #[serde(default)]
    pub images: Vec<String>,
    /// Storage paths parallel to `images`, used for cleanup
    #[serde(default)]
    pub image_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub status: ListingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_at_creation: Option<Plan>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// The cover image URL, if any photo was stored.
    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Scalar fields of a listing before the store assigns its ID.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub price: Option<String>,
    pub kind: ListingKind,
    pub condition: Option<Condition>,
    pub service_type: Option<ServiceType>,
    pub whatsapp: Option<String>,
    pub plan_at_creation: Plan,
}

impl NewListing {
    /// Build the stored record with empty media and `active` status.
    pub fn into_listing(self, id: String, created_at: DateTime<Utc>) -> Listing {
        Listing {
            id,
            category_key: crate::services::feed::normalize_text(&self.category),
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            location: self.location,
            category: self.category,
            price: self.price,
            kind: self.kind,
            condition: self.condition,
            service_type: self.service_type,
            images: Vec::new(),
            image_paths: Vec::new(),
            whatsapp: self.whatsapp,
            status: ListingStatus::Active,
            plan_at_creation: Some(self.plan_at_creation),
            created_at,
        }
    }
}

/// Owner-editable fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: Option<ListingStatus>,
}

impl ListingPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.location.is_none()
            && self.description.is_none()
            && self.status.is_none()
    }

    /// Stored field names this patch writes. A category change also rewrites `categoryKey`.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.title.is_some() {
            paths.push("title");
        }
        if self.price.is_some() {
            paths.push("price");
        }
        if self.category.is_some() {
            paths.extend(["category", "categoryKey"]);
        }
        if self.location.is_some() {
            paths.push("location");
        }
        if self.description.is_some() {
            paths.push("description");
        }
        if self.status.is_some() {
            paths.push("status");
        }
        paths
    }

    /// Apply already-validated values onto a stored listing.
    pub fn apply_to(self, listing: &mut Listing) {
        if let Some(title) = self.title {
            listing.title = title;
        }
        if let Some(price) = self.price {
            listing.price = if price.is_empty() { None } else { Some(price) };
        }
        if let Some(category) = self.category {
            listing.category_key = crate::services::feed::normalize_text(&category);
            listing.category = category;
        }
        if let Some(location) = self.location {
            listing.location = location;
        }
        if let Some(description) = self.description {
            listing.description = description;
        }
        if let Some(status) = self.status {
            listing.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> NewListing {
        NewListing {
            owner_id: "u1".to_string(),
            title: "Bicicleta".to_string(),
            description: "Pouco uso".to_string(),
            location: "São Tomé".to_string(),
            category: "Moda & Beleza".to_string(),
            price: Some("1500".to_string()),
            kind: ListingKind::Product,
            condition: Some(Condition::Usado),
            service_type: None,
            whatsapp: None,
            plan_at_creation: Plan::Free,
        }
    }

    #[test]
    fn test_into_listing_starts_active_without_media() {
        let listing = draft().into_listing("l1".to_string(), Utc::now());
        assert_eq!(listing.status, ListingStatus::Active);
        assert!(listing.images.is_empty());
        assert!(listing.image_paths.is_empty());
        assert_eq!(listing.category_key, "moda e beleza");
        assert_eq!(listing.plan_at_creation, Some(Plan::Free));
        assert_eq!(listing.cover_image(), None);
    }

    #[test]
    fn test_patch_updates_category_key() {
        let mut listing = draft().into_listing("l1".to_string(), Utc::now());
        ListingPatch {
            category: Some("Imóveis".to_string()),
            price: Some(String::new()),
            ..Default::default()
        }
        .apply_to(&mut listing);

        assert_eq!(listing.category, "Imóveis");
        assert_eq!(listing.category_key, "imoveis");
        assert_eq!(listing.price, None);
    }

    #[test]
    fn test_patch_field_paths() {
        let patch = ListingPatch {
            title: Some("Mesa".to_string()),
            category: Some("Imóveis".to_string()),
            ..Default::default()
        };
        assert_eq!(patch.field_paths(), ["title", "category", "categoryKey"]);
        assert!(ListingPatch::default().field_paths().is_empty());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("service".parse::<ListingKind>().unwrap(), ListingKind::Service);
        assert_eq!("".parse::<ListingKind>().unwrap(), ListingKind::Product);
        assert_eq!("Usado".parse::<Condition>().unwrap(), Condition::Usado);
        assert_eq!("Online".parse::<ServiceType>().unwrap(), ServiceType::Online);
        assert_eq!(
            "inactive".parse::<ListingStatus>().unwrap(),
            ListingStatus::Inactive
        );
        assert!(matches!(
            "rental".parse::<ListingKind>(),
            Err(AppError::Validation(_))
        ));
    }
}
