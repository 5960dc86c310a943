// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listing creation, edit and deletion over in-memory backends.
//!
//! These tests verify that:
//! 1. The free plan stops at two listings, even under concurrent submissions
//! 2. Photos are capped per plan and keep their submission order
//! 3. A failed upload or media write leaves nothing behind
//! 4. Only the owner can change or delete a listing
//! 5. Edits write only their own fields, even when other writes interleave

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use vendaja::db::{InMemoryDb, ListingStore, ProfileStore};
use vendaja::error::AppError;
use vendaja::models::{Listing, ListingPatch, ListingStatus, NewListing, Plan, UserProfile};
use vendaja::services::{ListingService, PhotoUpload, ProfileHub};

mod common;
use common::{create_test_app, listing_form, session, TestApp};

fn free_user(app: &TestApp, id: &str, used: u32) {
    let mut profile = UserProfile::new(id, Some(format!("{}@example.com", id)), Utc::now());
    profile.free_listings_used = used;
    app.db.put_profile(profile);
}

fn pro_user(app: &TestApp, id: &str) {
    let mut profile = UserProfile::new(id, None, Utc::now());
    profile.plan = Plan::Pro;
    app.db.put_profile(profile);
}

async fn used(app: &TestApp, id: &str) -> u32 {
    app.db
        .get_profile(id)
        .await
        .unwrap()
        .map(|p| p.free_listings_used)
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════
// QUOTA
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_free_plan_stops_at_two_listings() {
    let app = create_test_app();
    let service = &app.state.listing_service;
    free_user(&app, "ana", 0);
    let caller = session("ana");

    service
        .create_listing(Some(&caller), listing_form("Mesa", 1))
        .await
        .unwrap();
    service
        .create_listing(Some(&caller), listing_form("Cadeira", 1))
        .await
        .unwrap();
    assert_eq!(used(&app, "ana").await, 2);

    let third = service
        .create_listing(Some(&caller), listing_form("Sofá", 1))
        .await;
    assert!(matches!(third, Err(AppError::QuotaExceeded { limit: 2 })));

    assert_eq!(used(&app, "ana").await, 2);
    assert_eq!(app.db.listing_count(), 2);
    assert_eq!(app.storage.len(), 2, "rejected listing must not upload photos");
}

#[tokio::test]
async fn test_first_listing_creates_missing_profile() {
    let app = create_test_app();
    let caller = session("new-user");

    app.state
        .listing_service
        .create_listing(Some(&caller), listing_form("Rádio", 1))
        .await
        .unwrap();

    assert_eq!(used(&app, "new-user").await, 1);
}

#[tokio::test]
async fn test_concurrent_submissions_get_one_remaining_slot() {
    let app = create_test_app();
    free_user(&app, "ana", 1);
    let caller = session("ana");

    // Slow uploads keep both requests in flight at the same time
    app.storage.delay_upload("p0.jpg", Duration::from_millis(20));

    let service = app.state.listing_service.clone();
    let (a, b) = tokio::join!(
        service.create_listing(Some(&caller), listing_form("Primeiro", 1)),
        service.create_listing(Some(&caller), listing_form("Segundo", 1)),
    );

    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejections = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::QuotaExceeded { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(rejections, 1);
    assert_eq!(used(&app, "ana").await, 2);
    assert_eq!(app.db.listing_count(), 1);
}

#[tokio::test]
async fn test_pro_plan_never_touches_counter() {
    let app = create_test_app();
    pro_user(&app, "loja");
    let caller = session("loja");

    for i in 0..4 {
        app.state
            .listing_service
            .create_listing(Some(&caller), listing_form(&format!("Artigo {}", i), 1))
            .await
            .unwrap();
    }

    assert_eq!(used(&app, "loja").await, 0);
    assert_eq!(app.db.listing_count(), 4);
}

#[tokio::test]
async fn test_rejected_submissions_do_not_consume_quota() {
    let app = create_test_app();
    free_user(&app, "ana", 0);
    let caller = session("ana");
    let service = &app.state.listing_service;

    let no_photos = service
        .create_listing(Some(&caller), listing_form("Mesa", 0))
        .await;
    assert!(matches!(no_photos, Err(AppError::Validation(msg)) if msg == "no photos"));

    let mut not_image = listing_form("Mesa", 1);
    not_image.photos[0].content_type = "application/pdf".to_string();
    let result = service.create_listing(Some(&caller), not_image).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let missing_title = listing_form("   ", 1);
    let result = service.create_listing(Some(&caller), missing_title).await;
    assert!(matches!(result, Err(AppError::Validation(msg)) if msg.contains("title")));

    let unauthenticated = service.create_listing(None, listing_form("Mesa", 1)).await;
    assert!(matches!(unauthenticated, Err(AppError::Unauthenticated)));

    assert_eq!(used(&app, "ana").await, 0);
    assert_eq!(app.storage.uploads_started(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// PHOTOS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_free_plan_keeps_first_three_photos() {
    let app = create_test_app();
    free_user(&app, "ana", 0);

    let listing = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), listing_form("Telemóvel", 5))
        .await
        .unwrap();

    assert_eq!(listing.images.len(), 3);
    assert_eq!(listing.image_paths.len(), 3);
    assert_eq!(app.storage.uploads_started(), 3);
    for (index, path) in listing.image_paths.iter().enumerate() {
        assert_eq!(
            path,
            &format!("listings/ana/{}/{}-p{}.jpg", listing.id, index, index)
        );
    }
}

#[tokio::test]
async fn test_pro_plan_keeps_first_seven_photos() {
    let app = create_test_app();
    pro_user(&app, "loja");

    let listing = app
        .state
        .listing_service
        .create_listing(Some(&session("loja")), listing_form("Carro", 9))
        .await
        .unwrap();

    assert_eq!(listing.images.len(), 7);
    assert!(listing.image_paths[6].ends_with("/6-p6.jpg"));
}

#[tokio::test]
async fn test_invalid_photo_beyond_cap_is_ignored() {
    let app = create_test_app();
    free_user(&app, "ana", 0);

    let mut form = listing_form("Bicicleta", 3);
    form.photos.push(PhotoUpload {
        file_name: "huge.tiff".to_string(),
        content_type: "application/octet-stream".to_string(),
        bytes: vec![0u8; 16].into(),
    });

    let listing = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), form)
        .await
        .unwrap();
    assert_eq!(listing.images.len(), 3);
}

#[tokio::test]
async fn test_cover_image_is_first_submitted_photo() {
    let app = create_test_app();
    pro_user(&app, "loja");

    // The first photo finishes last
    app.storage.delay_upload("p0.jpg", Duration::from_millis(60));
    app.storage.delay_upload("p1.jpg", Duration::from_millis(30));

    let listing = app
        .state
        .listing_service
        .create_listing(Some(&session("loja")), listing_form("Casa", 4))
        .await
        .unwrap();

    let expected: Vec<String> = (0..4)
        .map(|i| format!("memory://listings/loja/{}/{}-p{}.jpg", listing.id, i, i))
        .collect();
    assert_eq!(listing.images, expected);
    assert_eq!(listing.cover_image(), Some(expected[0].as_str()));

    let stored = app
        .db
        .get_listing(&listing.id)
        .await
        .unwrap()
        .expect("listing stored");
    assert_eq!(stored.images, expected);
}

// ═══════════════════════════════════════════════════════════════════════════
// FAILURE COMPENSATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_upload_failure_removes_listing_and_releases_slot() {
    let app = create_test_app();
    free_user(&app, "ana", 1);

    app.storage.fail_uploads_after(1);
    let result = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), listing_form("Mesa", 3))
        .await;

    assert!(matches!(result, Err(AppError::UploadFailed(_))));
    assert_eq!(app.db.listing_count(), 0);
    assert!(app.storage.is_empty(), "partial uploads must be cleaned up");
    assert_eq!(used(&app, "ana").await, 1);
}

#[tokio::test]
async fn test_media_write_failure_removes_listing_and_blobs() {
    let app = create_test_app();
    free_user(&app, "ana", 0);

    app.db.fail_media_updates(true);
    let result = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), listing_form("Mesa", 2))
        .await;

    assert!(matches!(result, Err(AppError::Persistence(_))));
    assert_eq!(app.db.listing_count(), 0);
    assert!(app.storage.is_empty());
    assert_eq!(used(&app, "ana").await, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// READ / UPDATE / DELETE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_created_listing_reads_back_with_owner_and_fields() {
    let app = create_test_app();
    free_user(&app, "ana", 0);

    let mut form = listing_form("Aulas de inglês", 2);
    form.kind = Some("service".to_string());
    form.service_type = Some("Online".to_string());
    form.condition = Some("Novo".to_string());
    form.category = "  servicos ".to_string();

    let created = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), form)
        .await
        .unwrap();

    let fetched = app
        .state
        .listing_service
        .get_listing(&created.id)
        .await
        .unwrap()
        .expect("listing exists");

    assert_eq!(fetched, created);
    assert_eq!(fetched.owner_id, "ana");
    // Stored as typed (trimmed); matching goes through the normalized key
    assert_eq!(fetched.category, "servicos");
    assert_eq!(fetched.category_key, "servicos");
    assert_eq!(fetched.status, ListingStatus::Active);
    assert_eq!(fetched.plan_at_creation, Some(Plan::Free));
    assert!(fetched.condition.is_none(), "services carry no condition");
    assert!(fetched.service_type.is_some());
}

#[tokio::test]
async fn test_listing_whatsapp_falls_back_to_profile() {
    let app = create_test_app();
    free_user(&app, "ana", 0);
    let caller = session("ana");

    app.state
        .account_service
        .set_whatsapp(&caller, Some("+239 991 2345"))
        .await
        .unwrap();

    let inherited = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("Mesa", 1))
        .await
        .unwrap();
    assert_eq!(inherited.whatsapp.as_deref(), Some("+239 991 2345"));

    let mut form = listing_form("Cadeira", 1);
    form.whatsapp = Some("9900000".to_string());
    let explicit = app
        .state
        .listing_service
        .create_listing(Some(&caller), form)
        .await
        .unwrap();
    assert_eq!(explicit.whatsapp.as_deref(), Some("9900000"));
}

#[tokio::test]
async fn test_listing_whatsapp_must_be_a_phone_number() {
    let app = create_test_app();
    free_user(&app, "ana", 0);

    let mut form = listing_form("Mesa", 1);
    form.whatsapp = Some("n/a".to_string());
    let result = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), form)
        .await;

    assert!(matches!(result, Err(AppError::Validation(msg)) if msg.contains("whatsapp")));
    assert_eq!(used(&app, "ana").await, 0);
    assert_eq!(app.db.listing_count(), 0);
}

#[tokio::test]
async fn test_unknown_listing_reads_as_none() {
    let app = create_test_app();
    let result = app.state.listing_service.get_listing("nope").await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_only_owner_can_update() {
    let app = create_test_app();
    pro_user(&app, "ana");
    let listing = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), listing_form("Mesa", 1))
        .await
        .unwrap();

    let patch = ListingPatch {
        price: Some("900".to_string()),
        ..Default::default()
    };

    let result = app
        .state
        .listing_service
        .update_listing(&session("rui"), &listing.id, patch.clone())
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let updated = app
        .state
        .listing_service
        .update_listing(&session("ana"), &listing.id, patch)
        .await
        .unwrap();
    assert_eq!(updated.price.as_deref(), Some("900"));
    assert_eq!(updated.owner_id, "ana");
}

#[tokio::test]
async fn test_update_missing_listing_is_not_found() {
    let app = create_test_app();
    let patch = ListingPatch {
        title: Some("Novo".to_string()),
        ..Default::default()
    };

    let result = app
        .state
        .listing_service
        .update_listing(&session("ana"), "missing", patch)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_only_owner_can_delete() {
    let app = create_test_app();
    pro_user(&app, "ana");
    let listing = app
        .state
        .listing_service
        .create_listing(Some(&session("ana")), listing_form("Mesa", 2))
        .await
        .unwrap();

    let result = app
        .state
        .listing_service
        .delete_listing(&session("rui"), &listing.id)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(app.db.listing_count(), 1);
    assert_eq!(app.storage.len(), 2);
}

#[tokio::test]
async fn test_delete_removes_document_and_photos() {
    let app = create_test_app();
    free_user(&app, "ana", 0);
    let caller = session("ana");

    let listing = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("Mesa", 3))
        .await
        .unwrap();

    app.state
        .listing_service
        .delete_listing(&caller, &listing.id)
        .await
        .unwrap();

    assert!(app.db.get_listing(&listing.id).await.unwrap().is_none());
    assert!(app.storage.is_empty());
    // Deleting does not give the free slot back
    assert_eq!(used(&app, "ana").await, 1);

    // A second delete is a no-op
    app.state
        .listing_service
        .delete_listing(&caller, &listing.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_succeeds_when_photo_cleanup_fails() {
    let app = create_test_app();
    pro_user(&app, "ana");
    let caller = session("ana");

    let listing = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("Mesa", 2))
        .await
        .unwrap();

    app.storage.fail_deletes(true);
    app.state
        .listing_service
        .delete_listing(&caller, &listing.id)
        .await
        .unwrap();

    assert!(app.db.get_listing(&listing.id).await.unwrap().is_none());
    assert_eq!(app.storage.len(), 2, "orphaned photos are tolerated");
}

#[tokio::test]
async fn test_owner_listings_include_inactive() {
    let app = create_test_app();
    pro_user(&app, "ana");
    pro_user(&app, "rui");
    let service = &app.state.listing_service;

    let hidden = service
        .create_listing(Some(&session("ana")), listing_form("Mesa", 1))
        .await
        .unwrap();
    service
        .create_listing(Some(&session("ana")), listing_form("Cadeira", 1))
        .await
        .unwrap();
    service
        .create_listing(Some(&session("rui")), listing_form("Sofá", 1))
        .await
        .unwrap();

    service
        .update_listing(
            &session("ana"),
            &hidden.id,
            ListingPatch {
                status: Some(ListingStatus::Inactive),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mine = service.owner_listings(&session("ana")).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|l| l.owner_id == "ana"));
    assert!(mine.iter().any(|l| l.status == ListingStatus::Inactive));
}

// ═══════════════════════════════════════════════════════════════════════════
// CONCURRENT EDITS
// ═══════════════════════════════════════════════════════════════════════════

/// Listing store whose reads return a snapshot taken at call time but
/// arrive `lag` later, so other writes land between read and write.
struct LaggingReads {
    inner: Arc<InMemoryDb>,
    lag: Duration,
}

#[async_trait]
impl ListingStore for LaggingReads {
    async fn create_listing(&self, draft: NewListing) -> Result<Listing, AppError> {
        self.inner.create_listing(draft).await
    }

    async fn get_listing(&self, listing_id: &str) -> Result<Option<Listing>, AppError> {
        let snapshot = self.inner.get_listing(listing_id).await;
        tokio::time::sleep(self.lag).await;
        snapshot
    }

    async fn update_listing(
        &self,
        listing_id: &str,
        patch: ListingPatch,
    ) -> Result<Listing, AppError> {
        self.inner.update_listing(listing_id, patch).await
    }

    async fn set_listing_media(
        &self,
        listing_id: &str,
        images: Vec<String>,
        image_paths: Vec<String>,
    ) -> Result<(), AppError> {
        self.inner
            .set_listing_media(listing_id, images, image_paths)
            .await
    }

    async fn delete_listing(&self, listing_id: &str) -> Result<(), AppError> {
        self.inner.delete_listing(listing_id).await
    }

    async fn recent_listings(
        &self,
        category_key: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Listing>, AppError> {
        self.inner.recent_listings(category_key, limit).await
    }

    async fn listings_for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<Listing>, AppError> {
        self.inner.listings_for_owner(owner_id, limit).await
    }
}

fn lagging_service(app: &TestApp) -> ListingService {
    ListingService::new(
        Arc::new(LaggingReads {
            inner: app.db.clone(),
            lag: Duration::from_millis(60),
        }),
        app.db.clone(),
        app.storage.clone(),
        ProfileHub::new(),
        app.state.config.max_photo_bytes,
    )
}

fn retitle(title: &str) -> ListingPatch {
    ListingPatch {
        title: Some(title.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_edit_keeps_media_written_after_its_read() {
    let app = create_test_app();
    pro_user(&app, "ana");
    let caller = session("ana");
    let listing = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("Mesa", 1))
        .await
        .unwrap();

    let new_images = vec!["memory://a".to_string(), "memory://b".to_string()];
    let new_paths = vec!["listings/ana/x/0-a.jpg".to_string(), "listings/ana/x/1-b.jpg".to_string()];

    let service = lagging_service(&app);
    let (edited, media) = tokio::join!(
        service.update_listing(&caller, &listing.id, retitle("Mesa redonda")),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            app.db
                .set_listing_media(&listing.id, new_images.clone(), new_paths.clone())
                .await
        },
    );
    media.unwrap();
    let edited = edited.unwrap();

    let stored = app.db.get_listing(&listing.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Mesa redonda");
    assert_eq!(stored.images, new_images);
    assert_eq!(stored.image_paths, new_paths);
    assert_eq!(edited, stored);
}

#[tokio::test]
async fn test_edit_does_not_recreate_deleted_listing() {
    let app = create_test_app();
    pro_user(&app, "ana");
    let caller = session("ana");
    let listing = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("Mesa", 2))
        .await
        .unwrap();

    let service = lagging_service(&app);
    let (edited, deleted) = tokio::join!(
        service.update_listing(&caller, &listing.id, retitle("Mesa redonda")),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            app.state
                .listing_service
                .delete_listing(&caller, &listing.id)
                .await
        },
    );

    deleted.unwrap();
    assert!(matches!(edited, Err(AppError::NotFound(_))));
    assert!(app.db.get_listing(&listing.id).await.unwrap().is_none());
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn test_workflow_runs_on_spawned_tasks() {
    let app = create_test_app();
    pro_user(&app, "ana");

    let service = app.state.listing_service.clone();
    let created = tokio::spawn(async move {
        let caller = session("ana");
        service
            .create_listing(Some(&caller), listing_form("Mesa", 3))
            .await
    })
    .await
    .unwrap()
    .unwrap();

    let service = app.state.listing_service.clone();
    let listing_id = created.id.clone();
    tokio::spawn(async move {
        let caller = session("ana");
        service.update_listing(&caller, &listing_id, retitle("Mesa")).await?;
        service.delete_listing(&caller, &listing_id).await
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(app.db.listing_count(), 0);
    assert!(app.storage.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE UPDATES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_quota_change_is_pushed_to_subscribers() {
    let app = create_test_app();
    free_user(&app, "ana", 0);
    let caller = session("ana");

    let mut subscription = app.state.account_service.subscribe(&caller);

    app.state
        .listing_service
        .create_listing(Some(&caller), listing_form("Mesa", 1))
        .await
        .unwrap();

    let update = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("profile update within a second")
        .expect("subscription open");
    assert_eq!(update.id, "ana");
    assert_eq!(update.free_listings_used, 1);
    assert_eq!(update.free_listings_remaining(), Some(1));
}

#[tokio::test]
async fn test_compensated_failure_pushes_released_counter() {
    let app = create_test_app();
    free_user(&app, "ana", 0);
    let caller = session("ana");
    let mut subscription = app.state.account_service.subscribe(&caller);

    app.storage.fail_uploads_after(0);
    let result = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("Mesa", 1))
        .await;
    assert!(result.is_err());

    let update = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("profile update within a second")
        .expect("subscription open");
    assert_eq!(update.free_listings_used, 0);
}

#[tokio::test]
async fn test_store_assigns_distinct_ids() {
    let app = create_test_app();
    pro_user(&app, "ana");
    let caller = session("ana");

    let a = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("A", 1))
        .await
        .unwrap();
    let b = app
        .state
        .listing_service
        .create_listing(Some(&caller), listing_form("B", 1))
        .await
        .unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(a.id.len(), 20);
    assert!(app.storage.contains(&a.image_paths[0]));
}
