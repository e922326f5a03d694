// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access-request approval.
//!
//! An [`ApprovalDraft`] stages a role and a set of courses locally and writes
//! nothing until `commit`, which applies status, role and courses in one
//! atomic store write.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{course, AccessDecision, UserRecord, UserStatus};
use serde::Serialize;
use std::collections::BTreeSet;

/// Where a draft is in the approval flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    SelectingRole,
    SelectingCourses,
    Committed,
    Cancelled,
}

/// Invalid use of the approval flow.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ApprovalError {
    #[error("Role must not be empty")]
    EmptyRole,

    #[error("Unknown course: {0}")]
    UnknownCourse(String),

    #[error("Cannot {action} while {stage:?}")]
    WrongStage {
        action: &'static str,
        stage: ApprovalStage,
    },
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Staged approval for one pending user.
#[derive(Debug, Clone)]
pub struct ApprovalDraft {
    uid: String,
    stage: ApprovalStage,
    role: Option<String>,
    courses: BTreeSet<String>,
}

impl ApprovalDraft {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            stage: ApprovalStage::SelectingRole,
            role: None,
            courses: BTreeSet::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn stage(&self) -> ApprovalStage {
        self.stage
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn courses(&self) -> impl Iterator<Item = &str> {
        self.courses.iter().map(String::as_str)
    }

    fn expect_stage(&self, action: &'static str, allowed: &[ApprovalStage]) -> Result<(), ApprovalError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(ApprovalError::WrongStage {
                action,
                stage: self.stage,
            })
        }
    }

    /// Pick the role and move on to course selection.
    pub fn choose_role(&mut self, role: &str) -> Result<(), ApprovalError> {
        self.expect_stage(
            "choose a role",
            &[ApprovalStage::SelectingRole, ApprovalStage::SelectingCourses],
        )?;
        let role = role.trim();
        if role.is_empty() {
            return Err(ApprovalError::EmptyRole);
        }
        self.role = Some(role.to_string());
        self.stage = ApprovalStage::SelectingCourses;
        Ok(())
    }

    /// Return to role selection, keeping toggled courses.
    pub fn back(&mut self) -> Result<(), ApprovalError> {
        self.expect_stage("go back", &[ApprovalStage::SelectingCourses])?;
        self.stage = ApprovalStage::SelectingRole;
        Ok(())
    }

    /// Flip one course in or out. Returns whether it is now selected.
    pub fn toggle_course(&mut self, course_id: &str) -> Result<bool, ApprovalError> {
        self.expect_stage("toggle a course", &[ApprovalStage::SelectingCourses])?;
        if course::find(course_id).is_none() {
            return Err(ApprovalError::UnknownCourse(course_id.to_string()));
        }
        if self.courses.remove(course_id) {
            Ok(false)
        } else {
            self.courses.insert(course_id.to_string());
            Ok(true)
        }
    }

    /// Discard every staged choice.
    pub fn cancel(&mut self) -> Result<(), ApprovalError> {
        self.expect_stage(
            "cancel",
            &[ApprovalStage::SelectingRole, ApprovalStage::SelectingCourses],
        )?;
        self.role = None;
        self.courses.clear();
        self.stage = ApprovalStage::Cancelled;
        Ok(())
    }

    /// Write the staged choices. On failure the draft is left as it was.
    pub async fn commit(&mut self, store: &Store) -> Result<AccessDecision, AppError> {
        self.expect_stage("commit", &[ApprovalStage::SelectingCourses])?;
        let role = self.role.clone().ok_or(ApprovalError::EmptyRole)?;

        let decision = AccessDecision {
            role,
            enrolled_courses: self.courses.iter().cloned().collect(),
            approved_at: chrono::Utc::now(),
        };

        store.apply_access_decision(&self.uid, &decision).await?;
        self.stage = ApprovalStage::Committed;

        tracing::info!(uid = %self.uid, role = %decision.role, "Access request approved");
        Ok(decision)
    }
}

/// Counters shown next to the pending list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessCounters {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Pending access requests plus what has been decided in this session.
pub struct AccessQueue {
    store: Store,
    pending: Vec<UserRecord>,
    approved: usize,
    rejected: usize,
}

impl AccessQueue {
    pub async fn load(store: Store) -> Result<Self, AppError> {
        let pending = store.users_with_status(UserStatus::Pending).await?;
        Ok(Self {
            store,
            pending,
            approved: 0,
            rejected: 0,
        })
    }

    pub fn pending(&self) -> &[UserRecord] {
        &self.pending
    }

    pub fn counters(&self) -> AccessCounters {
        AccessCounters {
            pending: self.pending.len(),
            approved: self.approved,
            rejected: self.rejected,
        }
    }

    /// Start a draft for a user that is currently pending.
    pub fn begin(&self, uid: &str) -> Result<ApprovalDraft, AppError> {
        if self.pending.iter().any(|u| u.uid == uid) {
            Ok(ApprovalDraft::new(uid))
        } else {
            Err(AppError::NotFound(format!("No pending access request for {}", uid)))
        }
    }

    /// Commit a draft and drop the request from the pending list.
    pub async fn approve(&mut self, draft: &mut ApprovalDraft) -> Result<AccessDecision, AppError> {
        let decision = draft.commit(&self.store).await?;
        self.pending.retain(|u| u.uid != draft.uid());
        self.approved += 1;
        Ok(decision)
    }

    /// Reject a request by deleting the user record.
    pub async fn reject(&mut self, uid: &str) -> Result<(), AppError> {
        self.begin(uid)?;
        self.store.delete_user(uid).await?;
        self.pending.retain(|u| u.uid != uid);
        self.rejected += 1;
        tracing::info!(uid, "Access request rejected");
        Ok(())
    }
}

/// Mark a user inactive without deleting their record.
pub async fn deactivate_user(store: &Store, uid: &str) -> Result<(), AppError> {
    store.set_user_status(uid, UserStatus::Inactive).await?;
    tracing::info!(uid, "User deactivated");
    Ok(())
}

/// Delete a user record outright.
pub async fn remove_user(store: &Store, uid: &str) -> Result<(), AppError> {
    if store.get_user(uid).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", uid)));
    }
    store.delete_user(uid).await?;
    tracing::info!(uid, "User removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentStore, MemoryStore};
    use std::sync::Arc;

    async fn store_with_pending(uids: &[&str]) -> Store {
        let store: Store = Arc::new(MemoryStore::new());
        for uid in uids {
            let user = UserRecord::new_pending(uid, uid, "x@example.com", chrono::Utc::now());
            store.upsert_user(&user).await.unwrap();
        }
        store
    }

    #[test]
    fn test_courses_require_role_first() {
        let mut draft = ApprovalDraft::new("u1");
        let err = draft.toggle_course("data-privacy").unwrap_err();
        assert!(matches!(err, ApprovalError::WrongStage { .. }));
    }

    #[test]
    fn test_toggle_course_flips_membership() {
        let mut draft = ApprovalDraft::new("u1");
        draft.choose_role("Trainee").unwrap();

        assert!(draft.toggle_course("data-privacy").unwrap());
        assert!(draft.toggle_course("security-awareness").unwrap());
        assert!(!draft.toggle_course("data-privacy").unwrap());

        assert_eq!(draft.courses().collect::<Vec<_>>(), vec!["security-awareness"]);
    }

    #[test]
    fn test_unknown_course_rejected() {
        let mut draft = ApprovalDraft::new("u1");
        draft.choose_role("trainee").unwrap();
        assert_eq!(
            draft.toggle_course("basket-weaving"),
            Err(ApprovalError::UnknownCourse("basket-weaving".to_string()))
        );
    }

    #[test]
    fn test_back_returns_to_role_selection() {
        let mut draft = ApprovalDraft::new("u1");
        assert!(draft.back().is_err());

        draft.choose_role("trainee").unwrap();
        draft.toggle_course("onboarding-101").unwrap();
        draft.back().unwrap();

        assert_eq!(draft.stage(), ApprovalStage::SelectingRole);
        draft.choose_role("admin").unwrap();
        assert_eq!(draft.role(), Some("admin"));
    }

    #[test]
    fn test_cancel_discards_selection() {
        let mut draft = ApprovalDraft::new("u1");
        draft.choose_role("trainee").unwrap();
        draft.toggle_course("onboarding-101").unwrap();
        draft.cancel().unwrap();

        assert_eq!(draft.stage(), ApprovalStage::Cancelled);
        assert_eq!(draft.role(), None);
        assert_eq!(draft.courses().count(), 0);
        assert!(draft.choose_role("admin").is_err());
    }

    #[tokio::test]
    async fn test_approve_writes_all_fields_and_updates_counters() {
        let store = store_with_pending(&["u1", "u2"]).await;
        let mut queue = AccessQueue::load(store.clone()).await.unwrap();

        let mut draft = queue.begin("u1").unwrap();
        draft.choose_role("Trainee").unwrap();
        draft.toggle_course("onboarding-101").unwrap();
        queue.approve(&mut draft).await.unwrap();

        assert_eq!(draft.stage(), ApprovalStage::Committed);
        assert_eq!(
            queue.counters(),
            AccessCounters {
                pending: 1,
                approved: 1,
                rejected: 0
            }
        );

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Approved);
        assert_eq!(user.role.as_deref(), Some("Trainee"));
        assert_eq!(user.enrolled_courses, vec!["onboarding-101".to_string()]);
        assert!(user.approved_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_draft_open() {
        let store = store_with_pending(&[]).await;
        let mut draft = ApprovalDraft::new("ghost");
        draft.choose_role("trainee").unwrap();

        assert!(draft.commit(&store).await.is_err());
        assert_eq!(draft.stage(), ApprovalStage::SelectingCourses);
        assert_eq!(draft.role(), Some("trainee"));
    }

    #[tokio::test]
    async fn test_reject_deletes_pending_user() {
        let store = store_with_pending(&["u1"]).await;
        let mut queue = AccessQueue::load(store.clone()).await.unwrap();

        queue.reject("u1").await.unwrap();

        assert!(store.get_user("u1").await.unwrap().is_none());
        assert_eq!(queue.counters().rejected, 1);
        assert!(queue.reject("u1").await.is_err());
    }
}
