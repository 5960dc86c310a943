// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session routes: exchange an identity-provider ID token for a session.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE, SESSION_TTL_SECS};
use crate::routes::api::ProfileResponse;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/session", post(create_session))
        .route("/auth/logout", post(logout))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub token: String,
    pub profile: ProfileResponse,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Only mark cookies `Secure` when the frontend is served over HTTPS.
fn session_cookie(state: &AppState, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .http_only(true)
        .secure(state.config.frontend_url.starts_with("https://"))
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Verify the ID token from `Authorization: Bearer`, merge the profile and start a session.
async fn create_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let id_token = bearer_token(&headers).ok_or(AppError::Unauthenticated)?;
    let identity = state.identity_verifier.verify(id_token).await?;

    let profile = state.account_service.sign_in(&identity).await?;

    let token = create_jwt(
        &identity.subject_id,
        identity.email.as_deref(),
        &state.config.jwt_signing_key,
    )?;

    let cookie = session_cookie(
        &state,
        token.clone(),
        time::Duration::seconds(SESSION_TTL_SECS as i64),
    );

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            token,
            profile: profile.into(),
        }),
    ))
}

/// Clear the session cookie. Always succeeds.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    let cleared = session_cookie(&state, String::new(), time::Duration::ZERO);
    (jar.add(cleared), StatusCode::NO_CONTENT)
}
