// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Mirrors the Firestore backend's query semantics (ordering, ordered-field
//! exclusion, merge-upserts) and pushes a revision bump on every write so
//! live subscriptions re-query immediately.

use crate::db::{ChangeFeed, DocumentStore};
use crate::error::AppError;
use crate::models::{
    AccessDecision, Conversation, ConversationPatch, Message, SenderRole, UserRecord, UserStatus,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{watch, RwLock};

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserRecord>,
    conversations: HashMap<String, Conversation>,
    /// Kept in arrival order
    messages: Vec<Message>,
}

/// Memory-backed [`DocumentStore`].
pub struct MemoryStore {
    tables: RwLock<Tables>,
    revision: watch::Sender<u64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            tables: RwLock::new(Tables::default()),
            revision,
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Number of writes applied so far.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Live queries currently watching this store.
    pub fn live_queries(&self) -> usize {
        self.revision.receiver_count()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self.tables.read().await.users.get(uid).cloned())
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .users
            .insert(user.uid.clone(), user.clone());
        self.bump();
        Ok(())
    }

    async fn delete_user(&self, uid: &str) -> Result<(), AppError> {
        let removed = self.tables.write().await.users.remove(uid);
        if removed.is_some() {
            self.bump();
        }
        Ok(())
    }

    async fn users_with_status(&self, status: UserStatus) -> Result<Vec<UserRecord>, AppError> {
        let tables = self.tables.read().await;
        let mut users: Vec<UserRecord> = tables
            .users
            .values()
            .filter(|u| u.status == status)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.uid.cmp(&b.uid)));
        Ok(users)
    }

    async fn set_user_status(&self, uid: &str, status: UserStatus) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(uid)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;
        user.status = status;
        drop(tables);
        self.bump();
        Ok(())
    }

    async fn apply_access_decision(
        &self,
        uid: &str,
        decision: &AccessDecision,
    ) -> Result<(), AppError> {
        // Single write lock: all fields change together or not at all.
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(uid)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;
        user.status = UserStatus::Approved;
        user.role = Some(decision.role.clone());
        user.enrolled_courses = decision.enrolled_courses.clone();
        user.approved_at = Some(decision.approved_at);
        drop(tables);
        self.bump();
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AppError> {
        Ok(self.tables.read().await.conversations.get(id).cloned())
    }

    async fn merge_conversation(
        &self,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        match tables.conversations.get_mut(id) {
            Some(existing) => patch.apply_to(existing),
            None => {
                tables
                    .conversations
                    .insert(id.to_string(), patch.clone().into_conversation(id));
            }
        }
        drop(tables);
        self.bump();
        Ok(())
    }

    async fn recent_conversations(&self, limit: u32) -> Result<Vec<Conversation>, AppError> {
        let tables = self.tables.read().await;
        // Ordering by a field excludes documents that lack it.
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.updated_at.is_some())
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        conversations.truncate(limit as usize);
        Ok(conversations)
    }

    async fn append_message(&self, message: &Message) -> Result<(), AppError> {
        self.tables.write().await.messages.push(message.clone());
        self.bump();
        Ok(())
    }

    async fn thread(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        // Stable sort keeps arrival order for equal timestamps.
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn latest_messages_from(
        &self,
        conversation_id: &str,
        sender: SenderRole,
        limit: u32,
    ) -> Result<Vec<Message>, AppError> {
        let mut messages = self.thread(conversation_id).await?;
        messages.retain(|m| m.sender == sender);
        messages.reverse();
        messages.truncate(limit as usize);
        Ok(messages)
    }

    fn change_feed(&self) -> ChangeFeed {
        ChangeFeed::Revisions(self.revision.subscribe())
    }
}
