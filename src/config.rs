// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets (the session signing key) as environment
//! variables, so everything comes from the process environment, with a
//! `.env` file honored for local development.

use std::env;

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_FEED_PAGE_SIZE: u32 = 60;
const MAX_FEED_PAGE_SIZE: u32 = 200;
const DEFAULT_MAX_PHOTO_BYTES: usize = 8 * 1024 * 1024;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend origin allowed by CORS and used for cookie scoping
    pub frontend_url: String,
    /// Firebase / GCP project ID (also the expected ID token audience)
    pub project_id: String,
    /// Bucket holding listing photos
    pub storage_bucket: String,
    /// Server port
    pub port: u16,
    /// Number of listings fetched from the store per feed request
    pub feed_page_size: u32,
    /// Largest accepted photo, in bytes
    pub max_photo_bytes: usize,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            project_id: "test-project".to_string(),
            storage_bucket: "test-project.appspot.com".to_string(),
            port: 8080,
            feed_page_size: DEFAULT_FEED_PAGE_SIZE,
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let project_id = env::var("FIREBASE_PROJECT_ID")
            .or_else(|_| env::var("GCP_PROJECT_ID"))
            .unwrap_or_else(|_| "local-dev".to_string());

        let storage_bucket = env::var("STORAGE_BUCKET")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| format!("{}.appspot.com", project_id));

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .trim()
            .as_bytes()
            .to_vec();
        if jwt_signing_key.is_empty() {
            return Err(ConfigError::Invalid("JWT_SIGNING_KEY", "must not be empty"));
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_FRONTEND_URL.to_string()),
            project_id,
            storage_bucket,
            port: parse_or("PORT", 8080),
            feed_page_size: parse_or("FEED_PAGE_SIZE", DEFAULT_FEED_PAGE_SIZE)
                .clamp(1, MAX_FEED_PAGE_SIZE),
            max_photo_bytes: parse_or("MAX_PHOTO_BYTES", DEFAULT_MAX_PHOTO_BYTES),
            jwt_signing_key,
        })
    }

    /// Clamp a client-requested feed size to the configured page size.
    pub fn feed_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.feed_page_size)
            .clamp(1, self.feed_page_size)
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Only test that touches the process environment
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("FIREBASE_PROJECT_ID", "vendaja-stp");
        env::set_var("FEED_PAGE_SIZE", "5000");
        env::remove_var("STORAGE_BUCKET");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.project_id, "vendaja-stp");
        assert_eq!(config.storage_bucket, "vendaja-stp.appspot.com");
        assert_eq!(config.feed_page_size, MAX_FEED_PAGE_SIZE);
        assert_eq!(config.jwt_signing_key, b"test_jwt_key_32_bytes_minimum!!");
    }

    #[test]
    fn test_feed_limit_clamps() {
        let config = Config::test_default();
        assert_eq!(config.feed_limit(None), 60);
        assert_eq!(config.feed_limit(Some(10)), 10);
        assert_eq!(config.feed_limit(Some(0)), 1);
        assert_eq!(config.feed_limit(Some(1000)), 60);
    }
}
