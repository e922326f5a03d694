// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod conversation;
pub mod course;
pub mod notification;
pub mod user;

pub use conversation::{Conversation, ConversationPatch, Message, SenderRole};
pub use course::Course;
pub use notification::{Notification, NotificationKind, NotificationSnapshot};
pub use user::{AccessDecision, UserRecord, UserStatus};
