// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`Backend`] trait.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_config::model::{QueueBackend, QueueConfig, SenderConfig, StorageConfig};
use dashmap::DashMap;
use tracing::{debug, error, warn};

use courier_core::{
    Backend, Channel, ChannelLog, ChannelType, ChannelUuid, CourierError, HealthStatus,
    IncomingMsg, MsgId, OutgoingMsg, RetryPolicy, StatusUpdate, TaskEnvelope, TaskQueue,
    Transition, WriteOutcome,
};

use crate::database::{Database, map_tr_err};
use crate::memory_queue::MemoryQueue;
use crate::queries;
use crate::task_queue::SqliteQueue;

/// SQLite-backed storage for channels, messages, statuses and logs.
///
/// Channel lookups are cached for a short time because every webhook and
/// every send resolves its channel first.
pub struct SqliteBackend {
    db: Database,
    queue: Arc<dyn TaskQueue>,
    /// Set when the queue lives in `db`, so sends can be queued atomically.
    local_queue: Option<SqliteQueue>,
    policy: RetryPolicy,
    cache: DashMap<ChannelUuid, (Channel, Instant)>,
    cache_ttl: Duration,
}

impl SqliteBackend {
    pub fn new(db: Database, queue: Arc<dyn TaskQueue>, policy: RetryPolicy) -> Self {
        Self {
            db,
            queue,
            local_queue: None,
            policy,
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(60),
        }
    }

    /// Backend whose task queue is stored in the same database. New outgoing
    /// messages and their send tasks are then written in one transaction.
    pub fn with_sqlite_queue(queue: SqliteQueue, policy: RetryPolicy) -> Self {
        let db = queue.database().clone();
        Self {
            local_queue: Some(queue.clone()),
            ..Self::new(db, Arc::new(queue), policy)
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Opens the database and the configured task queue.
    pub async fn open(
        storage: &StorageConfig,
        queue: &QueueConfig,
        sender: &SenderConfig,
    ) -> Result<Self, CourierError> {
        let db = Database::open(&storage.database_path).await?;
        let backend = match queue.backend {
            QueueBackend::Sqlite => Self::with_sqlite_queue(
                SqliteQueue::new(db).with_poll_interval(queue.poll_interval()),
                sender.retry_policy(),
            ),
            QueueBackend::Memory => {
                warn!("using in-memory task queue, queued sends are lost on restart");
                Self::new(db, Arc::new(MemoryQueue::new()), sender.retry_policy())
            }
        };
        debug!(path = %storage.database_path, backend = ?queue.backend, "storage backend opened");
        Ok(backend.with_cache_ttl(Duration::from_secs(storage.channel_cache_secs)))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates or replaces a channel. Returns true when it is new.
    pub async fn save_channel(&self, channel: &Channel) -> Result<bool, CourierError> {
        let created = queries::channels::upsert(&self.db, channel).await?;
        self.cache.remove(&channel.uuid);
        Ok(created)
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>, CourierError> {
        queries::channels::list(&self.db).await
    }

    /// Flushes the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), CourierError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    fn cached(&self, uuid: &ChannelUuid) -> Option<Channel> {
        let entry = self.cache.get(uuid)?;
        let (channel, loaded) = entry.value();
        if loaded.elapsed() < self.cache_ttl {
            return Some(channel.clone());
        }
        drop(entry);
        self.cache.remove(uuid);
        None
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn get_channel(
        &self,
        channel_type: &ChannelType,
        uuid: &ChannelUuid,
    ) -> Result<Channel, CourierError> {
        let channel = self.get_channel_by_uuid(uuid).await?;
        if &channel.channel_type != channel_type {
            return Err(CourierError::ChannelNotFound {
                channel_type: channel_type.to_string(),
                uuid: uuid.to_string(),
            });
        }
        Ok(channel)
    }

    async fn get_channel_by_uuid(&self, uuid: &ChannelUuid) -> Result<Channel, CourierError> {
        if let Some(channel) = self.cached(uuid) {
            return Ok(channel);
        }
        let channel = queries::channels::get(&self.db, uuid).await?.ok_or_else(|| {
            CourierError::ChannelNotFound {
                channel_type: String::new(),
                uuid: uuid.to_string(),
            }
        })?;
        if !self.cache_ttl.is_zero() {
            self.cache.insert(*uuid, (channel.clone(), Instant::now()));
        }
        Ok(channel)
    }

    async fn write_msg(&self, msg: &IncomingMsg) -> Result<WriteOutcome, CourierError> {
        let outcome = queries::msgs::insert_incoming(&self.db, msg).await?;
        if let WriteOutcome::Duplicate(id) = outcome {
            debug!(msg_id = %id, external_id = ?msg.external_id, "duplicate incoming message ignored");
        }
        Ok(outcome)
    }

    async fn write_status_update(
        &self,
        update: &StatusUpdate,
    ) -> Result<Option<Transition>, CourierError> {
        queries::msgs::apply_status(&self.db, update, &self.policy).await
    }

    async fn enqueue_outgoing(&self, msg: &OutgoingMsg) -> Result<MsgId, CourierError> {
        if let Some(local) = &self.local_queue {
            let (id, envelope) = queries::msgs::insert_outgoing_queued(&self.db, msg).await?;
            local.notify_pushed();
            debug!(msg_id = %id, queue = %envelope.routing_key(), "outgoing message queued");
            return Ok(id);
        }

        // The queue is elsewhere: undo the insert if the push does not land.
        let id = queries::msgs::insert_outgoing(&self.db, msg).await?;
        let envelope = TaskEnvelope::send_msg(&msg.channel_uuid, id);
        if let Err(e) = self.queue.push(&envelope).await {
            warn!(msg_id = %id, error = %e, "send task not queued, discarding message");
            if let Err(cleanup) = queries::msgs::delete_outgoing(&self.db, id).await {
                error!(msg_id = %id, error = %cleanup, "failed to discard unqueued message");
            }
            return Err(e);
        }
        debug!(msg_id = %id, queue = %envelope.routing_key(), "outgoing message queued");
        Ok(id)
    }

    async fn get_outgoing_msg(&self, id: MsgId) -> Result<Option<OutgoingMsg>, CourierError> {
        queries::msgs::get_outgoing(&self.db, id).await
    }

    async fn was_msg_sent(&self, id: MsgId) -> Result<bool, CourierError> {
        queries::msgs::was_sent(&self.db, id).await
    }

    async fn write_channel_log(&self, clog: &ChannelLog) -> Result<(), CourierError> {
        queries::channel_logs::insert(&self.db, clog).await
    }

    fn queue(&self) -> Arc<dyn TaskQueue> {
        self.queue.clone()
    }

    async fn health(&self) -> HealthStatus {
        let outcome = self
            .db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await;
        match outcome {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("database unavailable: {e}")),
        }
    }
}
