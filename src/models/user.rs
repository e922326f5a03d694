// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Signed in but not yet approved by an administrator
    Pending,
    Approved,
    Inactive,
}

impl UserStatus {
    /// Value stored in the `status` field (used in store filters).
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Approved => "approved",
            UserStatus::Inactive => "inactive",
        }
    }
}

/// User profile stored in Firestore (document ID = identity key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Identity key from the identity provider
    pub uid: String,
    pub display_name: String,
    pub email: String,
    /// Free-form role string; compared case-insensitively
    #[serde(default)]
    pub role: Option<String>,
    pub status: UserStatus,
    /// Identifiers of courses this user is enrolled in
    #[serde(default)]
    pub enrolled_courses: Vec<String>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// A freshly self-registered user awaiting approval.
    pub fn new_pending(uid: &str, display_name: &str, email: &str, now: DateTime<Utc>) -> Self {
        Self {
            uid: uid.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            role: None,
            status: UserStatus::Pending,
            enrolled_courses: Vec::new(),
            created_at: now,
            approved_at: None,
        }
    }
}

/// Fields written together when an administrator approves an access request.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    pub role: String,
    pub enrolled_courses: Vec<String>,
    pub approved_at: DateTime<Utc>,
}
