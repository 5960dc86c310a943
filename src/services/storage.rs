// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Object storage for listing photos.
//!
//! Photos live under `listings/{owner_id}/{listing_id}/{index}-{file_name}`.
//! That path is stored on the listing and is the only link used to clean
//! blobs up when the listing is deleted.

use crate::error::AppError;
use async_trait::async_trait;
use axum::body::Bytes;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FIREBASE_STORAGE_URL: &str = "https://firebasestorage.googleapis.com";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One photo as received from the listing form.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Blob store holding listing photos.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `photo` at `path` and return its public download URL.
    async fn upload(&self, path: &str, photo: &PhotoUpload) -> Result<String, AppError>;

    /// Remove the blob at `path`. Missing blobs are not an error.
    async fn delete(&self, path: &str) -> Result<(), AppError>;
}

/// Keep the last path component and replace whitespace runs with `-`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut out = String::with_capacity(base.len());
    let mut in_space = false;
    for c in base.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('-');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }

    if out.is_empty() {
        "photo".to_string()
    } else {
        out
    }
}

/// Storage path for photo `index` of a listing.
pub fn listing_blob_path(owner_id: &str, listing_id: &str, index: usize, file_name: &str) -> String {
    format!(
        "listings/{}/{}/{}-{}",
        owner_id,
        listing_id,
        index,
        sanitize_file_name(file_name)
    )
}

// ─── Firebase Storage ────────────────────────────────────────────

#[derive(Clone)]
enum StorageAuth {
    /// The emulator accepts the `owner` token with full access.
    Emulator,
    /// Application default credentials; the generator caches and refreshes tokens.
    Google(Arc<gcloud_sdk::GoogleAuthTokenGenerator>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedObject {
    #[serde(default)]
    download_tokens: Option<String>,
}

/// Firebase Storage client (REST v0 API).
#[derive(Clone)]
pub struct FirebaseStorage {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    auth: StorageAuth,
}

impl FirebaseStorage {
    /// Create a client for `bucket`.
    ///
    /// For local development with emulator, set FIREBASE_STORAGE_EMULATOR_HOST.
    pub async fn new(bucket: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        if let Ok(host) = std::env::var("FIREBASE_STORAGE_EMULATOR_HOST") {
            tracing::info!(bucket, host = %host, "Using Firebase Storage emulator");
            return Ok(Self {
                http,
                base_url: format!("http://{}", host.trim_end_matches('/')),
                bucket: bucket.to_string(),
                auth: StorageAuth::Emulator,
            });
        }

        let tokens = gcloud_sdk::GoogleAuthTokenGenerator::new(
            gcloud_sdk::TokenSourceType::Default,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
        )
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("GCP credentials unavailable: {}", e)))?;

        tracing::info!(bucket, "Connected to Firebase Storage");

        Ok(Self {
            http,
            base_url: FIREBASE_STORAGE_URL.to_string(),
            bucket: bucket.to_string(),
            auth: StorageAuth::Google(Arc::new(tokens)),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/v0/b/{}/o/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(path)
        )
    }

    fn download_url(&self, path: &str, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("{}?alt=media&token={}", self.object_url(path), token),
            None => format!("{}?alt=media", self.object_url(path)),
        }
    }

    async fn authorization(&self) -> Result<String, AppError> {
        match &self.auth {
            StorageAuth::Emulator => Ok("Bearer owner".to_string()),
            StorageAuth::Google(tokens) => tokens
                .create_token()
                .await
                .map(|token| token.header_value())
                .map_err(|e| {
                    AppError::UploadFailed(format!("Failed to obtain storage token: {}", e))
                }),
        }
    }
}

#[async_trait]
impl ObjectStorage for FirebaseStorage {
    async fn upload(&self, path: &str, photo: &PhotoUpload) -> Result<String, AppError> {
        let url = format!("{}/v0/b/{}/o", self.base_url, self.bucket);

        let response = self
            .http
            .post(&url)
            .query(&[("name", path)])
            .header(reqwest::header::AUTHORIZATION, self.authorization().await?)
            .header(reqwest::header::CONTENT_TYPE, photo.content_type.as_str())
            .body(photo.bytes.clone())
            .send()
            .await
            .map_err(|e| AppError::UploadFailed(format!("{}: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(AppError::UploadFailed(format!(
                "{}: storage returned status {}",
                path,
                response.status()
            )));
        }

        let object: UploadedObject = response
            .json()
            .await
            .map_err(|e| AppError::UploadFailed(format!("{}: invalid response: {}", path, e)))?;

        // Several tokens may be comma-separated; any of them grants access.
        let token = object
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|t| !t.is_empty());

        tracing::debug!(path, bytes = photo.bytes.len(), "Photo uploaded");
        Ok(self.download_url(path, token))
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.object_url(path))
            .header(reqwest::header::AUTHORIZATION, self.authorization().await?)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Blob delete failed for {}: {}", path, e)))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(AppError::Persistence(format!(
                "Blob delete for {} returned status {}",
                path, status
            )))
        }
    }
}

// ─── In-memory storage ──────────────────────────────────────────

/// Process-local blob store for tests and offline runs.
///
/// Supports injected failures and per-file upload delays so tests can
/// exercise partial uploads and out-of-order completion.
#[derive(Default)]
pub struct InMemoryStorage {
    blobs: DashMap<String, PhotoUpload>,
    uploads_started: AtomicUsize,
    fail_uploads_after: std::sync::Mutex<Option<usize>>,
    fail_deletes: AtomicBool,
    delays: DashMap<String, Duration>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the first `count` uploads succeed and fail every later one.
    pub fn fail_uploads_after(&self, count: usize) {
        if let Ok(mut limit) = self.fail_uploads_after.lock() {
            *limit = Some(count);
        }
    }

    /// Make every delete return an error.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delay uploads of files named `file_name` (after sanitization).
    pub fn delay_upload(&self, file_name: &str, delay: Duration) {
        self.delays.insert(sanitize_file_name(file_name), delay);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn uploads_started(&self) -> usize {
        self.uploads_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(&self, path: &str, photo: &PhotoUpload) -> Result<String, AppError> {
        let attempt = self.uploads_started.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&sanitize_file_name(&photo.file_name))
            .map(|d| *d.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let limit = self.fail_uploads_after.lock().ok().and_then(|l| *l);
        if limit.is_some_and(|limit| attempt >= limit) {
            return Err(AppError::UploadFailed(format!("{}: injected failure", path)));
        }

        self.blobs.insert(path.to_string(), photo.clone());
        Ok(format!("memory://{}", path))
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence(format!("{}: injected failure", path)));
        }
        self.blobs.remove(path);
        Ok(())
    }
}
