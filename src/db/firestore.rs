// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profiles, roles, access status)
//! - Conversations (support thread summaries)
//! - Messages (append-only support chat)
//!
//! Live subscriptions re-run their query on a fixed poll interval.

use crate::db::{collections, ChangeFeed, DocumentStore};
use crate::error::AppError;
use crate::models::{
    AccessDecision, Conversation, ConversationPatch, Message, SenderRole, UserRecord, UserStatus,
};
use async_trait::async_trait;
use firestore::FirestoreQueryDirection;
use std::time::Duration;

/// Fields written by an access decision (update mask).
const ACCESS_DECISION_FIELDS: [&str; 4] = ["status", "role", "enrolled_courses", "approved_at"];

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    poll_interval: Duration,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, poll_interval: Duration) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, poll_interval).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            poll_interval,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        project_id: &str,
        poll_interval: Duration,
    ) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
            poll_interval,
        })
    }

    /// Create a disconnected client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(AppError::from_store)
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.uid)
            .object(user)
            .execute()
            .await
            .map_err(AppError::from_store)?;
        Ok(())
    }

    async fn delete_user(&self, uid: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(uid)
            .execute()
            .await
            .map_err(AppError::from_store)?;
        tracing::info!(uid, "Deleted user record");
        Ok(())
    }

    async fn users_with_status(&self, status: UserStatus) -> Result<Vec<UserRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.field("status").eq(status.as_str()))
            .order_by([("created_at", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(AppError::from_store)
    }

    async fn set_user_status(&self, uid: &str, status: UserStatus) -> Result<(), AppError> {
        let mut user = self
            .get_user(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;
        user.status = status;

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["status"])
            .in_col(collections::USERS)
            .document_id(uid)
            .object(&user)
            .execute()
            .await
            .map_err(AppError::from_store)?;
        Ok(())
    }

    /// Write status, role, courses and approval time in one transaction.
    async fn apply_access_decision(
        &self,
        uid: &str,
        decision: &AccessDecision,
    ) -> Result<(), AppError> {
        let mut user = self
            .get_user(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;

        user.status = UserStatus::Approved;
        user.role = Some(decision.role.clone());
        user.enrolled_courses = decision.enrolled_courses.clone();
        user.approved_at = Some(decision.approved_at);

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .fields(ACCESS_DECISION_FIELDS)
            .in_col(collections::USERS)
            .document_id(uid)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add approval to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::from_store(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            uid,
            role = %decision.role,
            courses = decision.enrolled_courses.len(),
            "Access decision committed"
        );
        Ok(())
    }

    // ─── Conversation Operations ─────────────────────────────────

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONVERSATIONS)
            .obj()
            .one(id)
            .await
            .map_err(AppError::from_store)
    }

    /// Merge-upsert: an update with a field mask creates the document when
    /// absent and leaves unlisted fields untouched otherwise.
    async fn merge_conversation(
        &self,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(patch.field_paths())
            .in_col(collections::CONVERSATIONS)
            .document_id(id)
            .object(patch)
            .execute()
            .await
            .map_err(AppError::from_store)?;
        Ok(())
    }

    async fn recent_conversations(&self, limit: u32) -> Result<Vec<Conversation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONVERSATIONS)
            .order_by([("updated_at", FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(AppError::from_store)
    }

    // ─── Message Operations ──────────────────────────────────────

    async fn append_message(&self, message: &Message) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::MESSAGES)
            .document_id(&message.id)
            .object(message)
            .execute()
            .await
            .map_err(AppError::from_store)?;
        Ok(())
    }

    async fn thread(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        let conversation_id = conversation_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::MESSAGES)
            .filter(move |q| q.field("conversation_id").eq(conversation_id.clone()))
            .order_by([("created_at", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(AppError::from_store)
    }

    async fn latest_messages_from(
        &self,
        conversation_id: &str,
        sender: SenderRole,
        limit: u32,
    ) -> Result<Vec<Message>, AppError> {
        let conversation_id = conversation_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::MESSAGES)
            .filter(move |q| {
                q.for_all([
                    q.field("conversation_id").eq(conversation_id.clone()),
                    q.field("sender").eq(sender.as_str()),
                ])
            })
            .order_by([("created_at", FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(AppError::from_store)
    }

    fn change_feed(&self) -> ChangeFeed {
        ChangeFeed::poll(self.poll_interval)
    }
}
