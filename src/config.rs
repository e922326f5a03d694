// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The Gemini API key is optional at startup. Its absence is reported when an
//! assistant request arrives, as an explicit missing-credential error.

use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Which document store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Hosted Firestore (or the emulator when `FIRESTORE_EMULATOR_HOST` is set)
    Firestore,
    /// In-process store for local development
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// How admin notifications from the two live streams are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationOrder {
    /// All access requests first, then all message notifications.
    #[default]
    Positional,
    /// Single list ordered by timestamp, newest first.
    Chronological,
}

impl FromStr for NotificationOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(NotificationOrder::Positional),
            "chronological" => Ok(NotificationOrder::Chronological),
            _ => Err(ConfigError::Invalid("NOTIFICATION_ORDER", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL (allowed CORS origin)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// JWT verification key for identity-provider session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Document store backend
    pub store_backend: StoreBackend,
    /// How often Firestore-backed live subscriptions re-run their query
    pub live_poll_interval: Duration,
    /// Notification merge policy for administrators
    pub notification_order: NotificationOrder,

    // --- Assistant ---
    /// Gemini API key (secret; may be absent)
    pub gemini_api_key: Option<String>,
    /// Gemini model name
    pub gemini_model: String,
    /// Gemini API base URL
    pub gemini_base_url: String,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            store_backend: StoreBackend::Memory,
            live_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            notification_order: NotificationOrder::Positional,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = env::var("STORE_BACKEND")
            .map(|v| v.parse())
            .unwrap_or(Ok(StoreBackend::Firestore))?;

        let notification_order = env::var("NOTIFICATION_ORDER")
            .map(|v| v.parse())
            .unwrap_or(Ok(NotificationOrder::Positional))?;

        let poll_ms = env::var("LIVE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            store_backend,
            live_poll_interval: Duration::from_millis(poll_ms),
            notification_order,
            gemini_api_key: env::var("GEMINI_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
