// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account operations: sign-in, profile reads and contact settings.

use crate::db::ProfileStore;
use crate::error::AppError;
use crate::middleware::auth::Session;
use crate::models::UserProfile;
use crate::services::contact::digits_only;
use crate::services::identity::Identity;
use crate::services::profile_hub::{ProfileHub, ProfileSubscription};
use std::sync::Arc;

/// Shortest WhatsApp number accepted (local STP numbers have 7 digits).
const MIN_WHATSAPP_DIGITS: usize = 7;
const MAX_WHATSAPP_DIGITS: usize = 15;

#[derive(Clone)]
pub struct AccountService {
    profiles: Arc<dyn ProfileStore>,
    hub: ProfileHub,
}

impl AccountService {
    pub fn new(profiles: Arc<dyn ProfileStore>, hub: ProfileHub) -> Self {
        Self { profiles, hub }
    }

    /// Record a verified sign-in, creating the profile on first visit.
    pub async fn sign_in(&self, identity: &Identity) -> Result<UserProfile, AppError> {
        let profile = self
            .profiles
            .merge_profile(&identity.subject_id, identity.email.as_deref())
            .await?;

        tracing::info!(
            subject_id = %profile.id,
            plan = profile.plan.as_str(),
            used = profile.free_listings_used,
            "User signed in"
        );

        self.hub.publish(&profile);
        Ok(profile)
    }

    /// Current profile of the caller.
    pub async fn profile(&self, caller: &Session) -> Result<UserProfile, AppError> {
        match self.profiles.get_profile(&caller.subject_id).await? {
            Some(profile) => Ok(profile),
            // Session outlived a wiped profile; recreate rather than fail
            None => {
                self.profiles
                    .merge_profile(&caller.subject_id, caller.email.as_deref())
                    .await
            }
        }
    }

    /// Set or clear the caller's default WhatsApp contact.
    pub async fn set_whatsapp(
        &self,
        caller: &Session,
        whatsapp: Option<&str>,
    ) -> Result<UserProfile, AppError> {
        let whatsapp = whatsapp
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(validate_whatsapp)
            .transpose()?;

        // Make sure the document exists before the field write
        self.profile(caller).await?;
        let profile = self
            .profiles
            .set_whatsapp(&caller.subject_id, whatsapp)
            .await?;

        tracing::info!(
            subject_id = %profile.id,
            has_whatsapp = profile.whatsapp.is_some(),
            "WhatsApp contact updated"
        );

        self.hub.publish(&profile);
        Ok(profile)
    }

    /// Live profile changes for the caller. Drop or cancel to stop.
    pub fn subscribe(&self, caller: &Session) -> ProfileSubscription {
        self.hub.subscribe(&caller.subject_id)
    }
}

pub(crate) fn validate_whatsapp(number: &str) -> Result<String, AppError> {
    let allowed = number
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    let digits = digits_only(number).len();

    if !allowed || !(MIN_WHATSAPP_DIGITS..=MAX_WHATSAPP_DIGITS).contains(&digits) {
        return Err(AppError::Validation(format!(
            "whatsapp is not a phone number: {}",
            number
        )));
    }
    Ok(number.to_string())
}
