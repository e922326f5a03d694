// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Current-user profile and self-registration.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{UserRecord, UserStatus};
use crate::services::{Capability, ResolvedIdentity};
use crate::time_utils::{format_optional_utc, format_utc_rfc3339};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/register", post(register))
}

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub uid: String,
    pub role: String,
    pub is_admin: bool,
    /// `None` for an implicit user with no stored record
    pub status: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub enrolled_courses: Vec<String>,
    pub created_at: Option<String>,
    pub approved_at: Option<String>,
}

impl From<&ResolvedIdentity> for MeResponse {
    fn from(identity: &ResolvedIdentity) -> Self {
        let record = identity.record.as_ref();
        Self {
            uid: identity.uid.clone(),
            role: identity.role.clone(),
            is_admin: identity.capability == Capability::Admin,
            status: record.map(|r| r.status.as_str().to_string()),
            display_name: record.map(|r| r.display_name.clone()),
            email: record.map(|r| r.email.clone()),
            enrolled_courses: record
                .map(|r| r.enrolled_courses.clone())
                .unwrap_or_default(),
            created_at: record.map(|r| format_utc_rfc3339(r.created_at)),
            approved_at: format_optional_utc(record.and_then(|r| r.approved_at)),
        }
    }
}

/// Get the caller's resolved identity.
async fn get_me(Extension(identity): Extension<ResolvedIdentity>) -> Json<MeResponse> {
    Json(MeResponse::from(&identity))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120))]
    pub display_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

/// Register the caller as a pending user and open their support thread.
///
/// Existing records are left alone, so repeating the call is harmless.
async fn register(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Extension(identity): Extension<ResolvedIdentity>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<MeResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let display_name = body
        .display_name
        .or(user.name)
        .unwrap_or_else(|| user.uid.clone());
    let email = body.email.or(user.email).unwrap_or_default();

    let record = match identity.record {
        Some(record) => record,
        None => {
            let record =
                UserRecord::new_pending(&user.uid, &display_name, &email, chrono::Utc::now());
            state.store.upsert_user(&record).await?;
            tracing::info!(uid = %user.uid, "New user registered, awaiting approval");
            record
        }
    };

    if record.status != UserStatus::Inactive {
        state
            .chat
            .ensure_conversation(&record.uid, &record.display_name, &record.email)
            .await?;
    }

    let resolved = ResolvedIdentity::from_record(&user.uid, Some(record));
    Ok(Json(MeResponse::from(&resolved)))
}
