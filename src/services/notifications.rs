// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification aggregation for dashboard sessions.
//!
//! Administrators get two live streams merged into one list:
//! - users whose status is `pending` (access requests)
//! - the five most recently updated support conversations
//!
//! Trainees get the last three admin-authored messages in their own thread.
//!
//! Every update replaces the whole list. With the default positional order,
//! all access requests come before all message notifications and each
//! stream keeps its own recency order; nothing is interleaved by time.
//! `NotificationOrder::Chronological` switches to a timestamp merge.

use crate::config::NotificationOrder;
use crate::db::{subscribe, LiveError, SnapshotResult, Store, Subscription};
use crate::error::AppError;
use crate::models::{
    Conversation, Message, Notification, NotificationSnapshot, SenderRole, UserRecord, UserStatus,
};
use crate::services::identity::{Capability, ResolvedIdentity};
use dashmap::{DashMap, DashSet};
use futures_util::FutureExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Conversations shown to administrators.
pub const ADMIN_RECENT_CONVERSATIONS: u32 = 5;
/// Admin replies shown to trainees.
pub const TRAINEE_RECENT_REPLIES: u32 = 3;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a feed currently publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedState {
    /// No complete list yet
    Loading,
    Ready(NotificationSnapshot),
    /// The store's rules refused a query for this identity
    Denied(String),
}

impl FeedState {
    pub fn snapshot(self) -> Option<NotificationSnapshot> {
        match self {
            FeedState::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Combine access-request and message notifications.
///
/// Positional keeps each input's order and puts every access request first.
/// Chronological sorts the union newest first (stable for equal times).
pub fn merge_admin_notifications(
    pending: &[Notification],
    messages: &[Notification],
    order: NotificationOrder,
) -> Vec<Notification> {
    let mut merged: Vec<Notification> = pending.iter().chain(messages).cloned().collect();
    if order == NotificationOrder::Chronological {
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
    merged
}

// ─── Read tracking ───────────────────────────────────────────────────

/// Notification IDs a user has read during this process's lifetime.
struct ReadState {
    ids: DashSet<String>,
    bumps: watch::Sender<u64>,
}

impl ReadState {
    fn new() -> Self {
        let (bumps, _) = watch::channel(0);
        Self {
            ids: DashSet::new(),
            bumps,
        }
    }

    fn mark<I: IntoIterator<Item = String>>(&self, ids: I) -> usize {
        let added = ids.into_iter().filter(|id| self.ids.insert(id.clone())).count();
        if added > 0 {
            self.bumps.send_modify(|v| *v += 1);
        }
        added
    }

    /// Mark everything in `listed` and forget ids that are no longer listed.
    fn mark_all(&self, listed: Vec<String>) -> usize {
        let keep: HashSet<&str> = listed.iter().map(String::as_str).collect();
        self.ids.retain(|id| keep.contains(id.as_str()));
        self.mark(listed)
    }

    fn snapshot(&self, mut items: Vec<Notification>, degraded: bool) -> NotificationSnapshot {
        for item in &mut items {
            item.read = self.ids.contains(&item.id);
        }
        NotificationSnapshot::new(items, degraded)
    }
}

// ─── Stream state ────────────────────────────────────────────────────

/// Latest state of one source stream.
#[derive(Debug)]
enum StreamState {
    Waiting,
    Ready(Vec<Notification>),
    Failed(LiveError),
}

impl StreamState {
    fn from_update<T>(update: SnapshotResult<T>, to_notification: fn(&T) -> Notification) -> Self {
        match update {
            Ok(records) => StreamState::Ready(records.iter().map(to_notification).collect()),
            Err(e) => StreamState::Failed(LiveError::from(&e)),
        }
    }

    fn denied(&self) -> Option<&str> {
        match self {
            StreamState::Failed(LiveError::Denied(msg)) => Some(msg.as_str()),
            _ => None,
        }
    }
}

/// Admin list from the two streams, or `None` while either is still waiting.
///
/// A rule failure on either stream wins over partial data; any other
/// failure falls back to whichever stream still works.
fn compose_admin(
    pending: &StreamState,
    messages: &StreamState,
    order: NotificationOrder,
) -> Option<Result<(Vec<Notification>, bool), String>> {
    if let Some(msg) = pending.denied().or_else(|| messages.denied()) {
        return Some(Err(msg.to_string()));
    }

    match (pending, messages) {
        (StreamState::Ready(p), StreamState::Ready(m)) => {
            Some(Ok((merge_admin_notifications(p, m, order), false)))
        }
        (StreamState::Ready(p), StreamState::Failed(_)) => {
            tracing::warn!("Message stream failed, showing access requests only");
            Some(Ok((p.clone(), true)))
        }
        (StreamState::Failed(_), StreamState::Ready(m)) => {
            tracing::warn!("Pending-user stream failed, showing messages only");
            Some(Ok((m.clone(), true)))
        }
        (StreamState::Failed(_), StreamState::Failed(_)) => Some(Ok((Vec::new(), true))),
        _ => None,
    }
}

fn pending_users(store: &Store) -> Subscription<UserRecord> {
    subscribe(store.clone(), "pending_users", |s| {
        async move { s.users_with_status(UserStatus::Pending).await }.boxed()
    })
}

fn recent_conversations(store: &Store) -> Subscription<Conversation> {
    subscribe(store.clone(), "recent_conversations", |s| {
        async move { s.recent_conversations(ADMIN_RECENT_CONVERSATIONS).await }.boxed()
    })
}

fn admin_replies(store: &Store, uid: &str) -> Subscription<Message> {
    let uid = uid.to_string();
    subscribe(store.clone(), "admin_replies", move |s| {
        let uid = uid.clone();
        async move {
            s.latest_messages_from(&uid, SenderRole::Admin, TRAINEE_RECENT_REPLIES)
                .await
        }
        .boxed()
    })
}

enum AdminStep {
    Pending(Option<SnapshotResult<UserRecord>>),
    Messages(Option<SnapshotResult<Conversation>>),
    Read,
}

async fn run_admin(
    store: Store,
    order: NotificationOrder,
    read: Arc<ReadState>,
    tx: watch::Sender<FeedState>,
) {
    let mut pending_sub = pending_users(&store);
    let mut message_sub = recent_conversations(&store);
    let mut read_rx = read.bumps.subscribe();

    let mut pending = StreamState::Waiting;
    let mut messages = StreamState::Waiting;

    loop {
        let step = tokio::select! {
            update = pending_sub.next() => AdminStep::Pending(update),
            update = message_sub.next() => AdminStep::Messages(update),
            _ = read_rx.changed() => AdminStep::Read,
        };

        match step {
            AdminStep::Pending(Some(update)) => {
                pending = StreamState::from_update(update, Notification::access_request);
            }
            AdminStep::Messages(Some(update)) => {
                messages = StreamState::from_update(update, Notification::support_message);
            }
            AdminStep::Pending(None) | AdminStep::Messages(None) => break,
            AdminStep::Read => {}
        }

        match compose_admin(&pending, &messages, order) {
            Some(Ok((items, degraded))) => {
                tx.send_replace(FeedState::Ready(read.snapshot(items, degraded)));
            }
            Some(Err(msg)) => {
                tx.send_replace(FeedState::Denied(msg));
            }
            None => {}
        }
    }
}

enum TraineeStep {
    Replies(Option<SnapshotResult<Message>>),
    Read,
}

async fn run_trainee(
    store: Store,
    uid: String,
    read: Arc<ReadState>,
    tx: watch::Sender<FeedState>,
) {
    let mut reply_sub = admin_replies(&store, &uid);
    let mut read_rx = read.bumps.subscribe();
    let mut items: Option<Vec<Notification>> = None;
    let mut degraded = false;

    loop {
        let step = tokio::select! {
            update = reply_sub.next() => TraineeStep::Replies(update),
            _ = read_rx.changed() => TraineeStep::Read,
        };

        match step {
            TraineeStep::Replies(Some(Ok(replies))) => {
                items = Some(replies.iter().map(Notification::admin_reply).collect());
                degraded = false;
            }
            TraineeStep::Replies(Some(Err(e))) => match LiveError::from(&e) {
                LiveError::Denied(msg) => {
                    tx.send_replace(FeedState::Denied(msg));
                    continue;
                }
                LiveError::Failed(_) => {
                    // Keep whatever was shown last.
                    degraded = true;
                    items.get_or_insert_with(Vec::new);
                }
            },
            TraineeStep::Replies(None) => break,
            TraineeStep::Read => {
                if matches!(*tx.borrow(), FeedState::Denied(_)) {
                    continue;
                }
            }
        }

        if let Some(items) = &items {
            tx.send_replace(FeedState::Ready(read.snapshot(items.clone(), degraded)));
        }
    }
}

// ─── Feed ────────────────────────────────────────────────────────────

/// Live notification list for one resolved identity.
///
/// Dropping the feed releases every underlying subscription.
pub struct NotificationFeed {
    uid: String,
    capability: Capability,
    aggregator: NotificationAggregator,
    rx: watch::Receiver<FeedState>,
    task: JoinHandle<()>,
}

impl NotificationFeed {
    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn state(&self) -> FeedState {
        self.rx.borrow().clone()
    }

    /// Latest published list (`None` while loading or denied).
    pub fn current(&self) -> Option<NotificationSnapshot> {
        self.state().snapshot()
    }

    /// Wait for the next published state. Returns `false` if the feed stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until the first complete list is available.
    ///
    /// A rule failure is returned as [`AppError::PermissionDenied`].
    pub async fn ready(&mut self) -> Result<NotificationSnapshot, AppError> {
        loop {
            match self.state() {
                FeedState::Ready(snapshot) => return Ok(snapshot),
                FeedState::Denied(msg) => return Err(AppError::PermissionDenied(msg)),
                FeedState::Loading => {}
            }
            if !self.changed().await {
                return Err(AppError::Database("Notification feed stopped".to_string()));
            }
        }
    }

    pub fn mark_read(&self, id: &str) -> bool {
        self.aggregator.mark_read(&self.uid, [id.to_string()]) > 0
    }

    /// Mark every currently listed notification as read.
    pub fn mark_all_read(&self) -> usize {
        let ids: Vec<String> = self
            .current()
            .map(|s| s.items.into_iter().map(|n| n.id).collect())
            .unwrap_or_default();
        self.aggregator.mark_all_read(&self.uid, ids)
    }

    /// Release current subscriptions, then subscribe for `identity`.
    pub fn rebind(&mut self, identity: &ResolvedIdentity) {
        self.task.abort();
        let next = self.aggregator.start(identity);
        *self = next;
    }

    pub fn unsubscribe(self) {}
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(uid = %self.uid, "Notification feed released");
    }
}

// ─── Aggregator ──────────────────────────────────────────────────────

/// Builds notification feeds; shared across requests.
#[derive(Clone)]
pub struct NotificationAggregator {
    store: Store,
    order: NotificationOrder,
    read_states: Arc<DashMap<String, Arc<ReadState>>>,
}

impl NotificationAggregator {
    pub fn new(store: Store, order: NotificationOrder) -> Self {
        Self {
            store,
            order,
            read_states: Arc::new(DashMap::new()),
        }
    }

    fn read_state(&self, uid: &str) -> Arc<ReadState> {
        self.read_states
            .entry(uid.to_string())
            .or_insert_with(|| Arc::new(ReadState::new()))
            .clone()
    }

    /// Open the live feed matching the identity's capability.
    pub fn start(&self, identity: &ResolvedIdentity) -> NotificationFeed {
        let (tx, rx) = watch::channel(FeedState::Loading);
        let read = self.read_state(&identity.uid);
        let store = self.store.clone();

        let task = match identity.capability {
            Capability::Admin => tokio::spawn(run_admin(store, self.order, read, tx)),
            Capability::Trainee => {
                tokio::spawn(run_trainee(store, identity.uid.clone(), read, tx))
            }
        };

        tracing::debug!(
            uid = %identity.uid,
            capability = ?identity.capability,
            "Notification feed started"
        );

        NotificationFeed {
            uid: identity.uid.clone(),
            capability: identity.capability,
            aggregator: self.clone(),
            rx,
            task,
        }
    }

    /// One complete list for `identity`, with subscriptions released afterwards.
    pub async fn snapshot(
        &self,
        identity: &ResolvedIdentity,
    ) -> Result<NotificationSnapshot, AppError> {
        let mut feed = self.start(identity);
        tokio::time::timeout(SNAPSHOT_TIMEOUT, feed.ready())
            .await
            .map_err(|_| AppError::Database("Timed out loading notifications".to_string()))?
    }

    /// Record notifications as read for `uid`. Returns how many were new.
    pub fn mark_read<I: IntoIterator<Item = String>>(&self, uid: &str, ids: I) -> usize {
        self.read_state(uid).mark(ids)
    }

    /// Mark the whole current list read for `uid`, dropping read ids that
    /// have left the list.
    pub fn mark_all_read(&self, uid: &str, listed: Vec<String>) -> usize {
        self.read_state(uid).mark_all(listed)
    }

    /// Follow `uid`'s role and keep a matching feed, rebinding on change.
    pub fn start_session(&self, uid: &str) -> DashboardSession {
        let (tx, rx) = watch::channel(FeedState::Loading);
        let task = tokio::spawn(run_session(self.clone(), uid.to_string(), tx));
        DashboardSession { rx, task }
    }
}

// ─── Session ─────────────────────────────────────────────────────────

/// A dashboard's notification list that follows role changes.
///
/// Publishes `Loading` while the role is loading or being rebound. The
/// session stops once the role can no longer be read; a rule failure on
/// that read is published as `Denied` first.
pub struct DashboardSession {
    rx: watch::Receiver<FeedState>,
    task: JoinHandle<()>,
}

impl DashboardSession {
    pub fn state(&self) -> FeedState {
        self.rx.borrow().clone()
    }

    pub fn current(&self) -> Option<NotificationSnapshot> {
        self.state().snapshot()
    }

    /// Wait for the next published state. Returns `false` once the session stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum SessionStep {
    Identity(Option<SnapshotResult<UserRecord>>),
    Feed(bool),
}

async fn feed_changed(feed: &mut Option<NotificationFeed>) -> bool {
    match feed {
        Some(feed) => feed.changed().await,
        None => std::future::pending().await,
    }
}

async fn run_session(
    aggregator: NotificationAggregator,
    uid: String,
    tx: watch::Sender<FeedState>,
) {
    let lookup_uid = uid.clone();
    let mut identity_sub = subscribe(aggregator.store.clone(), "identity", move |s| {
        let uid = lookup_uid.clone();
        async move { s.get_user(&uid).await.map(|u| u.into_iter().collect()) }.boxed()
    });

    let mut feed: Option<NotificationFeed> = None;

    loop {
        let step = tokio::select! {
            update = identity_sub.next() => SessionStep::Identity(update),
            changed = feed_changed(&mut feed) => SessionStep::Feed(changed),
        };

        match step {
            SessionStep::Identity(Some(Ok(records))) => {
                let identity = ResolvedIdentity::from_record(&uid, records.into_iter().next());
                match feed.as_mut() {
                    Some(current) if current.capability() == identity.capability => {}
                    Some(current) => {
                        tracing::info!(
                            uid = %uid,
                            from = ?current.capability(),
                            to = ?identity.capability,
                            "Role changed, rebinding notifications"
                        );
                        current.rebind(&identity);
                        tx.send_replace(FeedState::Loading);
                    }
                    None => {
                        feed = Some(aggregator.start(&identity));
                        tx.send_replace(FeedState::Loading);
                    }
                }
            }
            SessionStep::Identity(Some(Err(e))) => {
                // Unknown role is treated as signed out.
                tracing::warn!(
                    uid = %uid,
                    error = %e,
                    "Role lookup failed, ending notification session"
                );
                if let LiveError::Denied(msg) = LiveError::from(&e) {
                    tx.send_replace(FeedState::Denied(msg));
                }
                break;
            }
            SessionStep::Identity(None) => break,
            SessionStep::Feed(true) => {
                if let Some(current) = feed.as_ref() {
                    tx.send_replace(current.state());
                }
            }
            SessionStep::Feed(false) => feed = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn note(id: &str, secs: i64) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::AccessRequest {
                user_id: id.to_string(),
                display_name: id.to_string(),
                email: String::new(),
            },
            timestamp: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap() + ChronoDuration::seconds(secs)),
            read: false,
        }
    }

    fn ids(items: &[Notification]) -> Vec<&str> {
        items.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_positional_merge_puts_requests_first() {
        let pending = vec![note("p1", 1), note("p2", 0)];
        let messages = vec![note("m1", 10), note("m2", 5)];

        let merged = merge_admin_notifications(&pending, &messages, NotificationOrder::Positional);
        assert_eq!(ids(&merged), vec!["p1", "p2", "m1", "m2"]);
    }

    #[test]
    fn test_chronological_merge_interleaves_by_time() {
        let pending = vec![note("p1", 7), note("p2", 0)];
        let messages = vec![note("m1", 10), note("m2", 5)];

        let merged =
            merge_admin_notifications(&pending, &messages, NotificationOrder::Chronological);
        assert_eq!(ids(&merged), vec!["m1", "p1", "m2", "p2"]);
    }

    #[test]
    fn test_compose_waits_for_both_streams() {
        let ready = StreamState::Ready(vec![note("p1", 0)]);
        assert!(compose_admin(&ready, &StreamState::Waiting, NotificationOrder::Positional).is_none());
        assert!(compose_admin(&StreamState::Waiting, &ready, NotificationOrder::Positional).is_none());
    }

    #[test]
    fn test_compose_falls_back_to_pending_only() {
        let ready = StreamState::Ready(vec![note("p1", 0)]);
        let failed = StreamState::Failed(LiveError::Failed("unavailable".to_string()));
        let (items, degraded) = compose_admin(&ready, &failed, NotificationOrder::Positional)
            .unwrap()
            .unwrap();
        assert_eq!(ids(&items), vec!["p1"]);
        assert!(degraded);
    }

    #[test]
    fn test_compose_reports_rule_failure_instead_of_partial_list() {
        let ready = StreamState::Ready(vec![note("p1", 0)]);
        let denied = StreamState::Failed(LiveError::Denied("rules".to_string()));

        let err = compose_admin(&ready, &denied, NotificationOrder::Positional)
            .unwrap()
            .unwrap_err();
        assert_eq!(err, "rules");

        // Still waiting on the other stream makes no difference
        let err = compose_admin(&denied, &StreamState::Waiting, NotificationOrder::Positional)
            .unwrap()
            .unwrap_err();
        assert_eq!(err, "rules");
    }

    #[test]
    fn test_read_state_marks_once() {
        let read = ReadState::new();
        assert_eq!(read.mark(["a".to_string(), "b".to_string()]), 2);
        assert_eq!(read.mark(["a".to_string()]), 0);

        let snapshot = read.snapshot(vec![note("a", 0), note("c", 0)], false);
        assert_eq!(snapshot.unread_count, 1);
        assert!(snapshot.items[0].read);
    }

    #[test]
    fn test_mark_all_forgets_ids_no_longer_listed() {
        let read = ReadState::new();
        read.mark(["message:t1:1".to_string(), "access:p1".to_string()]);

        // t1 has a newer message, so its old id is gone from the list
        let marked = read.mark_all(vec!["access:p1".to_string(), "message:t1:2".to_string()]);

        assert_eq!(marked, 1);
        assert_eq!(read.ids.len(), 2);
        assert!(!read.ids.contains("message:t1:1"));
        assert!(read.ids.contains("message:t1:2"));
    }
}
