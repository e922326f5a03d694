// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Training Academy: real-time support and notification backend
//!
//! This crate provides the backend API for an enterprise training academy:
//! role-gated dashboard notifications, support chat synchronization,
//! access-request approval, and an AI learning assistant.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{AssistantService, ChatSynchronizer, IdentityResolver, NotificationAggregator};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub identity: IdentityResolver,
    pub notifications: NotificationAggregator,
    pub chat: ChatSynchronizer,
    pub assistant: AssistantService,
}

impl AppState {
    /// Wire every service to `store`.
    pub fn new(config: Config, store: Store) -> Self {
        Self {
            identity: IdentityResolver::new(store.clone()),
            notifications: NotificationAggregator::new(store.clone(), config.notification_order),
            chat: ChatSynchronizer::new(store.clone()),
            assistant: AssistantService::new(&config),
            store,
            config,
        }
    }
}
