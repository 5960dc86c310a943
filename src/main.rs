// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! VendaJá STP API Server
//!
//! Pass `--in-memory` to run without Firestore or Firebase Storage
//! (data is lost on exit).

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vendaja::{
    config::Config,
    db::{FirestoreDb, InMemoryDb, ListingStore, ProfileStore},
    services::{FirebaseStorage, IdentityVerifier, InMemoryStorage, ObjectStorage},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    let in_memory = std::env::args().any(|arg| arg == "--in-memory");
    tracing::info!(port = config.port, in_memory, "Starting VendaJá API");

    let profiles: Arc<dyn ProfileStore>;
    let listings: Arc<dyn ListingStore>;
    let storage: Arc<dyn ObjectStorage>;
    if in_memory {
        let db = Arc::new(InMemoryDb::new());
        profiles = db.clone();
        listings = db;
        storage = Arc::new(InMemoryStorage::new());
    } else {
        let db = Arc::new(FirestoreDb::new(&config.project_id).await?);
        profiles = db.clone();
        listings = db;
        storage = Arc::new(FirebaseStorage::new(&config.storage_bucket).await?);
    }

    let identity_verifier = Arc::new(IdentityVerifier::new(&config.project_id)?);

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        profiles,
        listings,
        storage,
        identity_verifier,
    ));

    // Build router
    let app = vendaja::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vendaja=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;

    Ok(())
}
