// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable named FIFO queues of task envelopes.
//!
//! Implementations only move opaque payloads around. Taking an item leases
//! it: the item stays stored until it is acknowledged, and a lease that is
//! never acknowledged (the worker died) expires and the item is handed out
//! again. This gives at-least-once delivery.
//!
//! Encoding, validation and the blocking dequeue loop are provided on top of
//! the raw operations here, so every queue treats malformed payloads the same
//! way: they are logged, acknowledged so they never come back, and skipped.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::envelope::TaskEnvelope;
use crate::error::CourierError;

/// Default pause between polls for queues without push notification.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a leased item stays invisible before it is handed out again.
pub const LEASE_DURATION: Duration = Duration::from_secs(300);

/// A raw payload taken from a queue, pending acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLease {
    pub lease_id: i64,
    pub payload: String,
}

/// A decoded envelope taken from a queue, pending acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub lease_id: i64,
    pub envelope: TaskEnvelope,
}

#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Appends a payload. It will not be handed out before `not_before`.
    async fn push_raw(
        &self,
        queue: &str,
        payload: String,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError>;

    /// Leases the oldest payload available at `now`.
    async fn pop_raw(&self, queue: &str, now: DateTime<Utc>) -> Result<Option<RawLease>, CourierError>;

    /// Removes a leased payload for good.
    async fn ack(&self, queue: &str, lease_id: i64) -> Result<(), CourierError>;

    /// Queues holding at least one payload available at `now`, oldest work first.
    async fn ready_queues(&self, now: DateTime<Utc>) -> Result<Vec<String>, CourierError>;

    /// Every queue that has ever been pushed to.
    async fn known_queues(&self) -> Result<Vec<String>, CourierError>;

    /// Number of stored payloads in `queue`, leased or not.
    async fn size(&self, queue: &str) -> Result<usize, CourierError>;

    /// Waits for new work on `queue`, at most `max`.
    async fn wait(&self, _queue: &str, max: Duration) {
        tokio::time::sleep(max.min(DEFAULT_POLL_INTERVAL)).await;
    }

    /// Pushes an envelope onto the queue named by its routing key.
    async fn push(&self, envelope: &TaskEnvelope) -> Result<(), CourierError> {
        let payload = envelope.encode()?;
        self.push_raw(envelope.routing_key(), payload, envelope.eta())
            .await
    }

    async fn enqueue(
        &self,
        queue: &str,
        task: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<(), CourierError> {
        self.push(&TaskEnvelope::new(queue, task, args, kwargs)).await
    }

    /// Leases the next valid envelope from `queue`, waiting up to `timeout`.
    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<Lease>, CourierError> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(raw) = self.pop_raw(queue, Utc::now()).await? {
                match TaskEnvelope::decode(&raw.payload) {
                    Ok(envelope) => {
                        return Ok(Some(Lease {
                            lease_id: raw.lease_id,
                            envelope,
                        }));
                    }
                    Err(e) => {
                        warn!(queue, error = %e, "dropping malformed task envelope");
                        self.ack(queue, raw.lease_id).await?;
                    }
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.wait(queue, deadline - now).await;
        }
    }
}
