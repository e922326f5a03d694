// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Support conversations and their messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Support conversation, one per end-user (document ID = owner's uid).
///
/// `last_message` and `updated_at` are a denormalized summary of the thread
/// used for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Partial conversation document for merge-upserts.
///
/// Only `Some` fields are written; everything else on an existing
/// document is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "firestore::serialize_as_optional_timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "firestore::serialize_as_optional_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl ConversationPatch {
    /// Seed written when the owner first opens the support page.
    pub fn seed(id: &str, user_name: &str, user_email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Some(id.to_string()),
            user_name: Some(user_name.to_string()),
            user_email: Some(user_email.to_string()),
            created_at: Some(now),
            ..Default::default()
        }
    }

    /// Summary update following an appended message.
    pub fn summary(id: &str, last_message: &str, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: Some(id.to_string()),
            last_message: Some(last_message.to_string()),
            updated_at: Some(updated_at),
            ..Default::default()
        }
    }

    /// Names of the fields this patch writes (Firestore update mask).
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.id.is_some() {
            paths.push("id");
        }
        if self.user_name.is_some() {
            paths.push("user_name");
        }
        if self.user_email.is_some() {
            paths.push("user_email");
        }
        if self.last_message.is_some() {
            paths.push("last_message");
        }
        if self.updated_at.is_some() {
            paths.push("updated_at");
        }
        if self.created_at.is_some() {
            paths.push("created_at");
        }
        paths
    }

    /// Shallow-merge this patch into `target`.
    pub fn apply_to(&self, target: &mut Conversation) {
        if let Some(name) = &self.user_name {
            target.user_name = name.clone();
        }
        if let Some(email) = &self.user_email {
            target.user_email = email.clone();
        }
        if let Some(text) = &self.last_message {
            target.last_message = Some(text.clone());
        }
        if let Some(at) = self.updated_at {
            target.updated_at = Some(at);
        }
        if let Some(at) = self.created_at {
            target.created_at = Some(at);
        }
    }

    /// Materialize a new document from this patch.
    pub fn into_conversation(self, id: &str) -> Conversation {
        let mut conversation = Conversation {
            id: id.to_string(),
            user_name: String::new(),
            user_email: String::new(),
            last_message: None,
            updated_at: None,
            created_at: None,
        };
        self.apply_to(&mut conversation);
        conversation
    }
}

/// Who authored a support message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Admin,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::User => "user",
            SenderRole::Admin => "admin",
        }
    }
}

/// Append-only message within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Generated document ID
    pub id: String,
    pub conversation_id: String,
    pub sender: SenderRole,
    pub text: String,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: &str, sender: SenderRole, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender,
            text: text.to_string(),
            created_at: now,
        }
    }
}
