// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Every component talks to the document store through [`DocumentStore`].
//! Firestore is the production backend; [`MemoryStore`] runs in-process for
//! local development and tests.

pub mod firestore;
pub mod live;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use live::{subscribe, ChangeFeed, LiveError, SnapshotResult, Subscription};
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{
    AccessDecision, Conversation, ConversationPatch, Message, SenderRole, UserRecord, UserStatus,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CONVERSATIONS: &str = "conversations";
    /// Messages for all conversations, keyed by generated ID
    pub const MESSAGES: &str = "messages";
}

/// Shared handle to the active store.
pub type Store = Arc<dyn DocumentStore>;

/// Read/write surface of the hosted document store.
///
/// Queries return results in the store's native order: ascending
/// `created_at` for threads, newest first for everything else.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, AppError>;

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), AppError>;

    async fn delete_user(&self, uid: &str) -> Result<(), AppError>;

    /// Users with the given status, newest first.
    async fn users_with_status(&self, status: UserStatus) -> Result<Vec<UserRecord>, AppError>;

    /// Set only the `status` field of an existing user.
    async fn set_user_status(&self, uid: &str, status: UserStatus) -> Result<(), AppError>;

    /// Atomically write approved status, role, courses and approval time.
    async fn apply_access_decision(
        &self,
        uid: &str,
        decision: &AccessDecision,
    ) -> Result<(), AppError>;

    // ─── Conversations ───────────────────────────────────────────

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AppError>;

    /// Create the conversation if absent, otherwise shallow-merge `patch`.
    async fn merge_conversation(&self, id: &str, patch: &ConversationPatch)
        -> Result<(), AppError>;

    /// Conversations ordered by `updated_at`, newest first.
    async fn recent_conversations(&self, limit: u32) -> Result<Vec<Conversation>, AppError>;

    // ─── Messages ────────────────────────────────────────────────

    async fn append_message(&self, message: &Message) -> Result<(), AppError>;

    /// Full thread, ascending by `created_at`.
    async fn thread(&self, conversation_id: &str) -> Result<Vec<Message>, AppError>;

    /// The `limit` newest messages from one sender, newest first.
    async fn latest_messages_from(
        &self,
        conversation_id: &str,
        sender: SenderRole,
        limit: u32,
    ) -> Result<Vec<Message>, AppError>;

    // ─── Change notification ─────────────────────────────────────

    /// Signal source that tells live subscriptions when to re-query.
    fn change_feed(&self) -> ChangeFeed;
}
