// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Administrator endpoints: access requests and user management.

use crate::error::{AppError, Result};
use crate::models::{course, Course, UserRecord};
use crate::services::access::{self, AccessCounters};
use crate::services::{AccessQueue, ResolvedIdentity};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/access-requests", get(list_access_requests))
        .route(
            "/api/admin/access-requests/{uid}/approve",
            post(approve_access_request),
        )
        .route(
            "/api/admin/access-requests/{uid}/reject",
            post(reject_access_request),
        )
        .route("/api/admin/users/{uid}", delete(delete_user))
        .route("/api/admin/users/{uid}/deactivate", post(deactivate_user))
}

// ─── Access Requests ─────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AccessRequestResponse {
    pub uid: String,
    pub display_name: String,
    pub email: String,
    pub requested_at: String,
}

impl From<&UserRecord> for AccessRequestResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            uid: user.uid.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            requested_at: format_utc_rfc3339(user.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct AccessRequestsResponse {
    pub requests: Vec<AccessRequestResponse>,
    pub counters: AccessCounters,
    /// Courses that may be assigned on approval
    pub courses: &'static [Course],
}

async fn list_access_requests(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
) -> Result<Json<AccessRequestsResponse>> {
    identity.require_admin()?;
    let queue = AccessQueue::load(state.store.clone()).await?;

    Ok(Json(AccessRequestsResponse {
        requests: queue.pending().iter().map(AccessRequestResponse::from).collect(),
        counters: queue.counters(),
        courses: course::CATALOG,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveRequest {
    #[validate(length(min = 1, max = 64))]
    pub role: String,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub courses: Vec<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ApproveResponse {
    pub uid: String,
    pub role: String,
    pub enrolled_courses: Vec<String>,
    pub approved_at: String,
}

/// Approve a pending request with a role and course set in one commit.
async fn approve_access_request(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(uid): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>> {
    identity.require_admin()?;
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut queue = AccessQueue::load(state.store.clone()).await?;
    let mut draft = queue.begin(&uid)?;
    draft.choose_role(&body.role)?;
    for course_id in &body.courses {
        // Toggling twice would deselect; repeated ids mean "selected".
        if !draft.courses().any(|c| c == course_id.as_str()) {
            draft.toggle_course(course_id)?;
        }
    }

    let decision = queue.approve(&mut draft).await?;
    tracing::info!(
        admin = %identity.uid,
        uid = %uid,
        courses = decision.enrolled_courses.len(),
        "Access request approved via API"
    );

    Ok(Json(ApproveResponse {
        uid,
        role: decision.role,
        enrolled_courses: decision.enrolled_courses,
        approved_at: format_utc_rfc3339(decision.approved_at),
    }))
}

async fn reject_access_request(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(uid): Path<String>,
) -> Result<StatusCode> {
    identity.require_admin()?;
    let mut queue = AccessQueue::load(state.store.clone()).await?;
    queue.reject(&uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── User Management ─────────────────────────────────────────

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(uid): Path<String>,
) -> Result<StatusCode> {
    identity.require_admin()?;
    if uid == identity.uid {
        return Err(AppError::BadRequest(
            "Administrators cannot delete their own account".to_string(),
        ));
    }
    access::remove_user(&state.store, &uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ResolvedIdentity>,
    Path(uid): Path<String>,
) -> Result<StatusCode> {
    identity.require_admin()?;
    access::deactivate_user(&state.store, &uid).await?;
    Ok(StatusCode::NO_CONTENT)
}
