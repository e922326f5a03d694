// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Support conversation endpoints.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Conversation, Message, SenderRole};
use crate::routes::{error_event, json_event};
use crate::services::{ChatSynchronizer, ResolvedIdentity, SendOutcome};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{stream, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use validator::Validate;

const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/conversations", get(list_conversations))
        .route("/api/support/conversation", post(open_support_conversation))
        .route(
            "/api/conversations/{id}/messages",
            get(get_messages).post(send_message),
        )
        .route("/api/conversations/{id}/stream", get(stream_messages))
        .route("/api/conversations/{id}/reconcile", post(reconcile))
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<u32>,
}

/// Admin inbox: conversations by most recent activity.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Conversation>>> {
    identity.require_admin()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(Json(state.chat.recent_conversations(limit).await?))
}

/// Seed the caller's own support conversation.
async fn open_support_conversation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Extension(identity): Extension<ResolvedIdentity>,
) -> Result<Json<Conversation>> {
    let (name, email) = match &identity.record {
        Some(record) => (record.display_name.clone(), record.email.clone()),
        None => (
            user.name.unwrap_or_else(|| user.uid.clone()),
            user.email.unwrap_or_default(),
        ),
    };

    let conversation = state
        .chat
        .ensure_conversation(&identity.uid, &name, &email)
        .await?;
    Ok(Json(conversation))
}

async fn get_messages(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    ChatSynchronizer::authorize(&identity, &id)?;
    Ok(Json(state.chat.thread(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000))]
    pub text: String,
}

/// Post a message. Administrators always post as `admin`.
///
/// The response still reports success when the conversation summary could
/// not be updated; `summary_updated` tells the client the list view is stale.
async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendOutcome>)> {
    ChatSynchronizer::authorize(&identity, &id)?;
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let sender = if identity.is_admin() {
        SenderRole::Admin
    } else {
        SenderRole::User
    };

    let outcome = state.chat.send(&id, sender, &body.text).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Live thread as server-sent events, oldest message first.
///
/// A failed query is sent as an `error` event (with remediation for rule
/// failures) and the stream stays open for the next successful one.
async fn stream_messages(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    ChatSynchronizer::authorize(&identity, &id)?;
    let view = state.chat.open_thread(&id);

    let events = stream::unfold(view, |mut view| async move {
        loop {
            if !view.changed().await {
                return None;
            }
            if let Some(err) = view.error() {
                return Some((Ok(error_event(&AppError::from(err))), view));
            }
            if let Some(messages) = view.messages() {
                return Some((Ok(json_event("messages", &messages)), view));
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Repair a stale conversation summary from the thread itself.
async fn reconcile(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>> {
    identity.require_admin()?;
    let conversation = state
        .chat
        .reconcile_summary(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", id)))?;
    Ok(Json(conversation))
}
