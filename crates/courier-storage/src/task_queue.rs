// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable task queue stored in the main SQLite database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::traits::queue::{DEFAULT_POLL_INTERVAL, LEASE_DURATION};
use courier_core::{CourierError, RawLease, TaskQueue};
use tokio::sync::Notify;

use crate::database::Database;
use crate::queries::queue;

/// SQLite-backed [`TaskQueue`].
///
/// Items survive restarts. A lease that was never acknowledged because the
/// process died becomes visible again once [`LEASE_DURATION`] has passed.
/// Pushes made through this handle wake local waiters immediately; pushes
/// from other processes are picked up on the next poll.
#[derive(Clone)]
pub struct SqliteQueue {
    db: Database,
    poll_interval: Duration,
    lease: chrono::Duration,
    pushed: Arc<Notify>,
}

impl SqliteQueue {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease: lease_as_chrono(LEASE_DURATION),
            pushed: Arc::new(Notify::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease_as_chrono(lease);
        self
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Wakes local waiters after a push made outside [`TaskQueue::push_raw`].
    pub(crate) fn notify_pushed(&self) {
        self.pushed.notify_waiters();
    }
}

fn lease_as_chrono(lease: Duration) -> chrono::Duration {
    chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::MAX)
}

#[async_trait]
impl TaskQueue for SqliteQueue {
    async fn push_raw(
        &self,
        queue_name: &str,
        payload: String,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError> {
        queue::push(&self.db, queue_name, payload, not_before).await?;
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_raw(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RawLease>, CourierError> {
        queue::lease(&self.db, queue_name, now, now + self.lease).await
    }

    async fn ack(&self, _queue_name: &str, lease_id: i64) -> Result<(), CourierError> {
        queue::ack(&self.db, lease_id).await
    }

    async fn ready_queues(&self, now: DateTime<Utc>) -> Result<Vec<String>, CourierError> {
        queue::ready_queues(&self.db, now).await
    }

    async fn known_queues(&self) -> Result<Vec<String>, CourierError> {
        queue::bindings(&self.db).await
    }

    async fn size(&self, queue_name: &str) -> Result<usize, CourierError> {
        queue::size(&self.db, queue_name).await
    }

    async fn wait(&self, _queue_name: &str, max: Duration) {
        let _ = tokio::time::timeout(max.min(self.poll_interval), self.pushed.notified()).await;
    }
}
