// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Support chat synchronization.
//!
//! Sending is two back-to-back writes, not a transaction:
//! 1. Append the message to the thread
//! 2. Merge-upsert the conversation summary (`last_message`, `updated_at`)
//!
//! If step 2 fails the thread is correct but list views show a stale
//! summary until the next send or [`ChatSynchronizer::reconcile_summary`].
//! Concurrent senders are not serialized; summary fields are last write wins.

use crate::db::{subscribe, LiveError, Store};
use crate::error::AppError;
use crate::models::{Conversation, ConversationPatch, Message, SenderRole};
use crate::services::identity::ResolvedIdentity;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Result of a send.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub message: Message,
    /// False when the summary write failed and list views are stale
    pub summary_updated: bool,
}

#[derive(Debug, Clone, Default)]
struct ThreadState {
    messages: Option<Vec<Message>>,
    error: Option<LiveError>,
}

/// Live, ordered mirror of one conversation's messages.
///
/// Holds no messages until the first snapshot. A failed query is published
/// through [`ThreadView::error`] and keeps the last good thread; the next
/// successful query clears it. Dropping the view releases the subscription.
pub struct ThreadView {
    conversation_id: String,
    rx: watch::Receiver<ThreadState>,
    task: JoinHandle<()>,
}

impl ThreadView {
    pub fn messages(&self) -> Option<Vec<Message>> {
        self.rx.borrow().messages.clone()
    }

    /// Failure of the most recent query, if it failed.
    pub fn error(&self) -> Option<LiveError> {
        self.rx.borrow().error.clone()
    }

    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until the thread satisfies `predicate`.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<Vec<Message>>
    where
        F: Fn(&[Message]) -> bool,
    {
        loop {
            if let Some(messages) = self.messages() {
                if predicate(&messages) {
                    return Some(messages);
                }
            }
            if !self.changed().await {
                return None;
            }
        }
    }
}

impl Drop for ThreadView {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(conversation_id = %self.conversation_id, "Thread view released");
    }
}

/// Reads and writes support conversations.
#[derive(Clone)]
pub struct ChatSynchronizer {
    store: Store,
}

impl ChatSynchronizer {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Trainees may only use the conversation keyed by their own uid.
    pub fn authorize(identity: &ResolvedIdentity, conversation_id: &str) -> Result<(), AppError> {
        if identity.is_admin() || identity.uid == conversation_id {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!(
                "{} may not access conversation {}",
                identity.uid, conversation_id
            )))
        }
    }

    /// Create the owner's conversation if needed. Safe to repeat: existing
    /// summary fields and the original creation time are never touched.
    pub async fn ensure_conversation(
        &self,
        uid: &str,
        user_name: &str,
        user_email: &str,
    ) -> Result<Conversation, AppError> {
        let existing = self.store.get_conversation(uid).await?;

        let mut seed = ConversationPatch::seed(uid, user_name, user_email, chrono::Utc::now());
        if existing.is_some() {
            seed.created_at = None;
        }
        self.store.merge_conversation(uid, &seed).await?;

        self.store
            .get_conversation(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", uid)))
    }

    /// Append a message, then update the conversation summary.
    ///
    /// Whitespace-only text is rejected before any write. A failed append
    /// is returned as an error; a failed summary write is not.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender: SenderRole,
        text: &str,
    ) -> Result<SendOutcome, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Message text is empty".to_string()));
        }

        let message = Message::new(conversation_id, sender, text, chrono::Utc::now());

        if let Err(e) = self.store.append_message(&message).await {
            tracing::error!(conversation_id, error = %e, "Failed to append message");
            return Err(e);
        }

        let summary = ConversationPatch::summary(conversation_id, text, message.created_at);
        let summary_updated = match self.store.merge_conversation(conversation_id, &summary).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    message_id = %message.id,
                    error = %e,
                    "Message stored but conversation summary is stale"
                );
                false
            }
        };

        tracing::info!(
            conversation_id,
            sender = sender.as_str(),
            summary_updated,
            "Message sent"
        );

        Ok(SendOutcome {
            message,
            summary_updated,
        })
    }

    /// Rewrite the summary from the thread's actual last message.
    pub async fn reconcile_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, AppError> {
        let thread = self.store.thread(conversation_id).await?;
        if let Some(last) = thread.last() {
            let patch = ConversationPatch::summary(conversation_id, &last.text, last.created_at);
            self.store.merge_conversation(conversation_id, &patch).await?;
            tracing::info!(conversation_id, "Conversation summary reconciled");
        }
        self.store.get_conversation(conversation_id).await
    }

    /// Current thread, oldest first.
    pub async fn thread(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        self.store.thread(conversation_id).await
    }

    /// Conversation list for administrators, most recently updated first.
    pub async fn recent_conversations(&self, limit: u32) -> Result<Vec<Conversation>, AppError> {
        self.store.recent_conversations(limit).await
    }

    /// Subscribe to a conversation's ordered messages.
    pub fn open_thread(&self, conversation_id: &str) -> ThreadView {
        let (tx, rx) = watch::channel(ThreadState::default());
        let id = conversation_id.to_string();

        let mut sub = subscribe(self.store.clone(), "thread", move |s| {
            let id = id.clone();
            async move { s.thread(&id).await }.boxed()
        });

        let task = tokio::spawn(async move {
            while let Some(update) = sub.next().await {
                tx.send_modify(|state| match update {
                    Ok(messages) => {
                        state.messages = Some(messages);
                        state.error = None;
                    }
                    Err(e) => state.error = Some(LiveError::from(&e)),
                });
            }
        });

        ThreadView {
            conversation_id: conversation_id.to_string(),
            rx,
            task,
        }
    }
}
