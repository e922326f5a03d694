// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live subscriptions over the document store.
//!
//! A subscription is a spawned task that re-runs one query every time the
//! store's [`ChangeFeed`] fires and pushes the result to its receiver when it
//! differs from the previous snapshot. Dropping the [`Subscription`] aborts
//! the task, so a released subscription can never deliver a late snapshot.

use crate::db::Store;
use crate::error::AppError;
use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const SNAPSHOT_BUFFER: usize = 16;

/// One pushed snapshot (or the error that replaced it).
pub type SnapshotResult<T> = Result<Vec<T>, AppError>;

/// Failed live query, cloneable so it can sit in a published view.
///
/// Rule failures are kept apart from everything else: they will not go away
/// by retrying and must reach the user with remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    Denied(String),
    Failed(String),
}

impl LiveError {
    pub fn is_denied(&self) -> bool {
        matches!(self, LiveError::Denied(_))
    }
}

impl From<&AppError> for LiveError {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::PermissionDenied(msg) => LiveError::Denied(msg.clone()),
            e if e.is_permission_error() => LiveError::Denied(e.to_string()),
            e => LiveError::Failed(e.to_string()),
        }
    }
}

impl From<LiveError> for AppError {
    fn from(err: LiveError) -> Self {
        match err {
            LiveError::Denied(msg) => AppError::PermissionDenied(msg),
            LiveError::Failed(msg) => AppError::Database(msg),
        }
    }
}

/// Tells a live query when its result may have changed.
pub enum ChangeFeed {
    /// Store revision counter, bumped on every write (in-process backends).
    Revisions(watch::Receiver<u64>),
    /// Fixed re-query period (remote backends without push).
    Poll(Interval),
}

impl ChangeFeed {
    /// Polling feed whose first tick is one full period away.
    ///
    /// Must be called from within a tokio runtime.
    pub fn poll(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ChangeFeed::Poll(interval)
    }

    /// Wait for the next change. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        match self {
            ChangeFeed::Revisions(rx) => rx.changed().await.is_ok(),
            ChangeFeed::Poll(interval) => {
                interval.tick().await;
                true
            }
        }
    }
}

/// Handle to a running live query.
pub struct Subscription<T> {
    label: &'static str,
    rx: mpsc::Receiver<SnapshotResult<T>>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot. `None` means the subscription ended.
    pub async fn next(&mut self) -> Option<SnapshotResult<T>> {
        self.rx.recv().await
    }

    /// Release the subscription.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(subscription = self.label, "Live subscription released");
    }
}

/// Start a live query.
///
/// `fetch` is re-run on every change signal. The first result is always
/// delivered; later results only when they differ from the last delivered
/// snapshot. A failed query delivers its error once, and the next successful
/// query is delivered even if unchanged so consumers can recover.
pub fn subscribe<T, F>(store: Store, label: &'static str, fetch: F) -> Subscription<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(Store) -> BoxFuture<'static, SnapshotResult<T>> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);

    let task = tokio::spawn(async move {
        let mut feed = store.change_feed();
        let mut last: Option<Vec<T>> = None;
        let mut failed = false;

        loop {
            match fetch(store.clone()).await {
                Ok(snapshot) => {
                    if failed || last.as_ref() != Some(&snapshot) {
                        failed = false;
                        last = Some(snapshot.clone());
                        if tx.send(Ok(snapshot)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    if !failed {
                        tracing::warn!(subscription = label, error = %e, "Live query failed");
                        failed = true;
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                }
            }

            if !feed.changed().await {
                tracing::debug!(subscription = label, "Change feed closed");
                break;
            }
        }
    });

    Subscription { label, rx, task }
}
