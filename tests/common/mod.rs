// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::{Body, Bytes};
use axum::http::{header, Request};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use vendaja::config::Config;
use vendaja::db::{FirestoreDb, InMemoryDb};
use vendaja::middleware::auth::{create_jwt, Session};
use vendaja::routes::create_router;
use vendaja::services::{IdentityVerifier, InMemoryStorage, ListingForm, PhotoUpload};
use vendaja::AppState;

/// Key ID the test identity verifier trusts.
#[allow(dead_code)]
pub const TEST_KID: &str = "test-kid";

#[allow(dead_code)]
const ID_TOKEN_PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/id_token_private.pem");
const ID_TOKEN_PUBLIC_PEM: &[u8] = include_bytes!("../fixtures/id_token_public.pem");

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Test app over in-memory backends, with handles to inject failures.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: Arc<InMemoryDb>,
    pub storage: Arc<InMemoryStorage>,
}

/// Create a test app with offline in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let db = Arc::new(InMemoryDb::new());
    let storage = Arc::new(InMemoryStorage::new());

    let decoding_key =
        DecodingKey::from_rsa_pem(ID_TOKEN_PUBLIC_PEM).expect("test public key should parse");
    let verifier = IdentityVerifier::new_with_static_key(&config.project_id, TEST_KID, decoding_key)
        .expect("static verifier should build");

    let state = Arc::new(AppState::new(
        config,
        db.clone(),
        db.clone(),
        storage.clone(),
        Arc::new(verifier),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        storage,
    }
}

#[allow(dead_code)]
pub fn session(subject_id: &str) -> Session {
    Session {
        subject_id: subject_id.to_string(),
        email: Some(format!("{}@example.com", subject_id)),
    }
}

/// Session JWT for `subject_id`, signed with the app's key.
#[allow(dead_code)]
pub fn session_token(state: &AppState, subject_id: &str) -> String {
    create_jwt(subject_id, None, &state.config.jwt_signing_key).expect("session JWT")
}

#[derive(Serialize)]
#[allow(dead_code)]
struct IdTokenClaims<'a> {
    iss: String,
    aud: &'a str,
    sub: &'a str,
    email: Option<&'a str>,
    iat: u64,
    exp: u64,
}

/// Sign an identity-provider ID token the test verifier accepts.
#[allow(dead_code)]
pub fn sign_id_token(project_id: &str, subject_id: &str, email: Option<&str>) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let claims = IdTokenClaims {
        iss: format!("https://securetoken.google.com/{}", project_id),
        aud: project_id,
        sub: subject_id,
        email,
        iat: now,
        exp: now + 3600,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());

    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(ID_TOKEN_PRIVATE_PEM).expect("test private key should parse"),
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn photo(file_name: &str) -> PhotoUpload {
    PhotoUpload {
        file_name: file_name.to_string(),
        content_type: "image/jpeg".to_string(),
        bytes: Bytes::from(format!("jpeg:{}", file_name)),
    }
}

/// A valid product form with `photo_count` photos named `p0.jpg`, `p1.jpg`, ...
#[allow(dead_code)]
pub fn listing_form(title: &str, photo_count: usize) -> ListingForm {
    ListingForm {
        title: title.to_string(),
        description: "Em bom estado".to_string(),
        location: "São Tomé".to_string(),
        category: "Tecnologia".to_string(),
        price: Some("1500".to_string()),
        photos: (0..photo_count).map(|i| photo(&format!("p{}.jpg", i))).collect(),
        ..Default::default()
    }
}

#[allow(dead_code)]
const BOUNDARY: &str = "vendaja-test-boundary";

/// Builder for `multipart/form-data` request bodies.
#[allow(dead_code)]
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

#[allow(dead_code)]
impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// POST request to `uri` carrying this form and a Bearer session token.
    pub fn into_request(mut self, uri: &str, token: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(self.body))
            .unwrap()
    }
}

/// The fields every listing form needs, ready for photos to be added.
#[allow(dead_code)]
pub fn listing_multipart(title: &str) -> MultipartBody {
    MultipartBody::new()
        .text("title", title)
        .text("description", "Pouco uso")
        .text("location", "Neves")
        .text("category", "casa & mobiliario")
        .text("price", "2.500")
}

#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
