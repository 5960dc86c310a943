// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! VendaJá STP: classifieds marketplace backend for São Tomé and Príncipe.
//!
//! This crate provides the HTTP API behind the web front end: sign-in,
//! plan-limited listing creation with photo uploads, owner edits and the
//! public feed with its search, price and sort controls.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{ListingStore, ProfileStore};
use services::{AccountService, IdentityVerifier, ListingService, ObjectStorage, ProfileHub};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity_verifier: Arc<IdentityVerifier>,
    pub account_service: AccountService,
    pub listing_service: ListingService,
}

impl AppState {
    /// Wire services over the given backends.
    pub fn new(
        config: Config,
        profiles: Arc<dyn ProfileStore>,
        listings: Arc<dyn ListingStore>,
        storage: Arc<dyn ObjectStorage>,
        identity_verifier: Arc<IdentityVerifier>,
    ) -> Self {
        let hub = ProfileHub::new();

        Self {
            account_service: AccountService::new(profiles.clone(), hub.clone()),
            listing_service: ListingService::new(
                listings,
                profiles,
                storage,
                hub,
                config.max_photo_bytes,
            ),
            identity_verifier,
            config,
        }
    }
}
