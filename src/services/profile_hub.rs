// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process fan-out of profile changes to live subscribers.
//!
//! Every profile mutation made through this service is published here,
//! keyed by subject ID. A subscription releases its channel slot when it is
//! cancelled or dropped, and the per-subject channel is removed once its last
//! subscriber is gone.

use crate::models::UserProfile;
use dashmap::DashMap;
use futures_util::Stream;
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 16;

/// Subject-keyed broadcast hub for profile snapshots.
#[derive(Clone)]
pub struct ProfileHub {
    channels: Arc<DashMap<String, broadcast::Sender<UserProfile>>>,
    capacity: usize,
}

impl ProfileHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Push a new snapshot to every subscriber of `profile.id`. No-op if nobody listens.
    pub fn publish(&self, profile: &UserProfile) {
        if let Some(tx) = self.channels.get(&profile.id) {
            let _ = tx.send(profile.clone());
        }
    }

    pub fn subscribe(&self, subject_id: &str) -> ProfileSubscription {
        let rx = self
            .channels
            .entry(subject_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        tracing::debug!(subject_id, "Profile subscription opened");

        ProfileSubscription {
            hub: self.clone(),
            subject_id: subject_id.to_string(),
            rx: Some(rx),
        }
    }

    /// Number of subjects with at least one live channel.
    pub fn active_subjects(&self) -> usize {
        self.channels.len()
    }

    fn release(&self, subject_id: &str) {
        self.channels
            .remove_if(subject_id, |_, tx| tx.receiver_count() == 0);
    }
}

impl Default for ProfileHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live view of one subject's profile changes.
pub struct ProfileSubscription {
    hub: ProfileHub,
    subject_id: String,
    rx: Option<broadcast::Receiver<UserProfile>>,
}

impl ProfileSubscription {
    /// Next profile snapshot, or `None` once cancelled.
    ///
    /// A lagging subscriber skips straight to newer snapshots.
    pub async fn recv(&mut self) -> Option<UserProfile> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(profile) => return Some(profile),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(subject_id = %self.subject_id, missed, "Profile subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(rx) = self.rx.take() {
            drop(rx);
            self.hub.release(&self.subject_id);
            tracing::debug!(subject_id = %self.subject_id, "Profile subscription closed");
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = UserProfile> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|profile| (profile, sub))
        })
    }
}

impl Drop for ProfileSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
