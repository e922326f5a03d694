// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod access;
pub mod assistant;
pub mod chat;
pub mod identity;
pub mod notifications;
pub mod waveform;

pub use access::{AccessQueue, ApprovalDraft, ApprovalError, ApprovalStage};
pub use assistant::{AssistantService, ChatTurn};
pub use chat::{ChatSynchronizer, SendOutcome, ThreadView};
pub use identity::{Capability, IdentityResolver, ResolvedIdentity, RoleState};
pub use notifications::{DashboardSession, FeedState, NotificationAggregator, NotificationFeed};
