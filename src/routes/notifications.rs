// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dashboard notification endpoints.

use crate::error::{AppError, Result};
use crate::models::NotificationSnapshot;
use crate::routes::{error_event, json_event};
use crate::services::{FeedState, ResolvedIdentity};
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{stream, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(get_notifications))
        .route("/api/notifications/stream", get(stream_notifications))
        .route("/api/notifications/read", post(mark_read))
}

/// One complete notification list for the caller's role.
async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
) -> Result<Json<NotificationSnapshot>> {
    let snapshot = state.notifications.snapshot(&identity).await?;
    Ok(Json(snapshot))
}

/// Live notification list as server-sent events.
///
/// The stream follows the caller's stored role, so a promotion or demotion
/// switches between the admin and trainee lists without reconnecting.
/// Rule failures arrive as `error` events with remediation. If the role can
/// no longer be read the stream sends an `unauthorized` error and ends.
/// Closing the connection releases every subscription.
async fn stream_notifications(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    tracing::debug!(uid = %identity.uid, "Notification stream opened");
    let session = state.notifications.start_session(&identity.uid);

    let events = stream::unfold(Some(session), |session| async move {
        let mut session = session?;
        loop {
            if !session.changed().await {
                return Some((Ok(error_event(&AppError::Unauthorized)), None));
            }
            match session.state() {
                FeedState::Ready(snapshot) => {
                    return Some((Ok(json_event("notifications", &snapshot)), Some(session)));
                }
                FeedState::Denied(msg) => {
                    let err = AppError::PermissionDenied(msg);
                    return Some((Ok(error_event(&err)), Some(session)));
                }
                FeedState::Loading => {}
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkReadRequest {
    /// Notification ids to mark; empty marks everything currently listed
    #[serde(default)]
    #[validate(length(max = 200))]
    pub ids: Vec<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MarkReadResponse {
    /// How many notifications were newly marked
    pub marked: usize,
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let marked = if body.ids.is_empty() {
        let snapshot = state.notifications.snapshot(&identity).await?;
        let listed = snapshot.items.into_iter().map(|n| n.id).collect();
        state.notifications.mark_all_read(&identity.uid, listed)
    } else {
        state.notifications.mark_read(&identity.uid, body.ids)
    };

    Ok(Json(MarkReadResponse { marked }))
}
