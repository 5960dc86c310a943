// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SSE stream of the caller's profile.
//!
//! GET /api/me/stream
//!
//! Sends a `profile` event with the current snapshot, then one per change
//! (plan, quota counter, WhatsApp). The subscription is released when the
//! client disconnects and the stream is dropped.

use crate::error::Result;
use crate::middleware::auth::Session;
use crate::routes::api::ProfileResponse;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/me/stream", get(stream_profile))
}

fn profile_event(profile: crate::models::UserProfile) -> Option<Event> {
    Event::default()
        .event("profile")
        .json_data(ProfileResponse::from(profile))
        .ok()
}

async fn stream_profile(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    // Subscribe before reading so no change between the two is lost
    let subscription = state.account_service.subscribe(&session);
    let current = state.account_service.profile(&session).await?;

    tracing::debug!(subject_id = %session.subject_id, "Profile stream opened");

    let events = stream::once(async move { current })
        .chain(subscription.into_stream())
        .filter_map(|profile| async move { profile_event(profile).map(Ok) });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
