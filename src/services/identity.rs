// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity resolution: authenticated principal → role capability.
//!
//! A missing user record means an implicit `"user"` role. A failed read means
//! the role is unknown, and callers treat unknown as unauthenticated.

use crate::db::Store;
use crate::error::AppError;
use crate::models::UserRecord;
use serde::Serialize;
use tokio::sync::watch;

/// Role assumed when no record (or no role) is stored.
pub const DEFAULT_ROLE: &str = "user";

/// Case-folded role strings that grant administrator capability.
const ADMIN_ROLES: [&str; 2] = ["admin", "super admin"];

/// Whether a stored role string grants administrator capability.
pub fn is_admin_role(role: &str) -> bool {
    let folded = role.to_lowercase();
    ADMIN_ROLES.contains(&folded.as_str())
}

/// What a resolved identity is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Admin,
    Trainee,
}

/// An authenticated principal with its role resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedIdentity {
    pub uid: String,
    /// Case-folded role string
    pub role: String,
    pub capability: Capability,
    /// The backing record, when one exists
    #[serde(skip)]
    pub record: Option<UserRecord>,
}

impl ResolvedIdentity {
    pub fn is_admin(&self) -> bool {
        self.capability == Capability::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::AdminRequired)
        }
    }

    /// Build from a (possibly absent) user record.
    pub fn from_record(uid: &str, record: Option<UserRecord>) -> Self {
        let role = record
            .as_ref()
            .and_then(|r| r.role.as_deref())
            .filter(|r| !r.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());

        let capability = if is_admin_role(&role) {
            Capability::Admin
        } else {
            Capability::Trainee
        };

        Self {
            uid: uid.to_string(),
            role,
            capability,
            record,
        }
    }
}

/// Role state as observed by a live dashboard session.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleState {
    /// Lookup in flight
    Loading,
    Resolved(ResolvedIdentity),
    /// Lookup failed; treat as unauthenticated
    Unknown,
}

impl RoleState {
    pub fn identity(&self) -> Option<&ResolvedIdentity> {
        match self {
            RoleState::Resolved(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, RoleState::Loading)
    }
}

/// Resolves an identity key to its role, reading the user record once.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Store,
}

impl IdentityResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Read the user record and classify its role.
    pub async fn resolve(&self, uid: &str) -> Result<ResolvedIdentity, AppError> {
        let record = self.store.get_user(uid).await?;
        let identity = ResolvedIdentity::from_record(uid, record);
        tracing::debug!(uid, role = %identity.role, admin = identity.is_admin(), "Resolved identity");
        Ok(identity)
    }

    /// Resolve into a [`RoleState`], logging failures.
    pub async fn resolve_state(&self, uid: &str) -> RoleState {
        match self.resolve(uid).await {
            Ok(identity) => RoleState::Resolved(identity),
            Err(e) => {
                tracing::warn!(uid, error = %e, "Role lookup failed");
                RoleState::Unknown
            }
        }
    }

    /// Start a resolution and observe it through `Loading → Resolved|Unknown`.
    pub fn watch(&self, uid: &str) -> watch::Receiver<RoleState> {
        let (tx, rx) = watch::channel(RoleState::Loading);
        let resolver = self.clone();
        let uid = uid.to_string();
        tokio::spawn(async move {
            let state = resolver.resolve_state(&uid).await;
            let _ = tx.send(state);
        });
        rx
    }
}
