// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived notifications (never persisted).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Conversation, Message, UserRecord};

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A user is waiting for access approval (admin view)
    AccessRequest {
        user_id: String,
        display_name: String,
        email: String,
    },
    /// A conversation received a new message (admin view)
    SupportMessage {
        conversation_id: String,
        user_name: String,
        preview: String,
    },
    /// An administrator replied in the trainee's own thread (trainee view)
    AdminReply {
        conversation_id: String,
        message_id: String,
        text: String,
    },
}

/// A single entry in the notification list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Stable identifier used for read tracking
    pub id: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub timestamp: Option<DateTime<Utc>>,
    pub read: bool,
}

impl Notification {
    pub fn access_request(user: &UserRecord) -> Self {
        Self {
            id: format!("access:{}", user.uid),
            kind: NotificationKind::AccessRequest {
                user_id: user.uid.clone(),
                display_name: user.display_name.clone(),
                email: user.email.clone(),
            },
            timestamp: Some(user.created_at),
            read: false,
        }
    }

    /// Keyed by update time so each new message yields a fresh unread entry.
    pub fn support_message(conversation: &Conversation) -> Self {
        let stamp = conversation
            .updated_at
            .map(|t| t.timestamp_millis().to_string())
            .unwrap_or_default();
        Self {
            id: format!("message:{}:{}", conversation.id, stamp),
            kind: NotificationKind::SupportMessage {
                conversation_id: conversation.id.clone(),
                user_name: conversation.user_name.clone(),
                preview: conversation.last_message.clone().unwrap_or_default(),
            },
            timestamp: conversation.updated_at,
            read: false,
        }
    }

    pub fn admin_reply(message: &Message) -> Self {
        Self {
            id: format!("reply:{}", message.id),
            kind: NotificationKind::AdminReply {
                conversation_id: message.conversation_id.clone(),
                message_id: message.id.clone(),
                text: message.text.clone(),
            },
            timestamp: Some(message.created_at),
            read: false,
        }
    }
}

/// The full notification list as last published to a dashboard session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationSnapshot {
    pub items: Vec<Notification>,
    pub unread_count: usize,
    /// True when one source stream failed and the list holds partial data
    pub degraded: bool,
}

impl NotificationSnapshot {
    pub fn new(items: Vec<Notification>, degraded: bool) -> Self {
        let unread_count = items.iter().filter(|n| !n.read).count();
        Self {
            items,
            unread_count,
            degraded,
        }
    }
}
