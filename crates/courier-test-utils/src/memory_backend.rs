// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backend for deterministic tests.
//!
//! `MemoryBackend` implements `Backend` with the same ordering, retry and
//! dedupe rules as the SQLite backend, and exposes everything it stored for
//! assertions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::status::transition;
use courier_core::{
    Backend, Channel, ChannelLog, ChannelType, ChannelUuid, CourierError, HealthStatus,
    IncomingMsg, MsgId, MsgState, OutgoingMsg, RetryPolicy, StatusUpdate, TaskEnvelope, TaskQueue,
    Transition, WriteOutcome,
};
use courier_storage::MemoryQueue;

#[derive(Default)]
struct State {
    next_id: i64,
    channels: HashMap<ChannelUuid, Channel>,
    incoming: Vec<(MsgId, IncomingMsg)>,
    outgoing: Vec<OutgoingMsg>,
    updates: Vec<StatusUpdate>,
    logs: Vec<ChannelLog>,
}

impl State {
    fn next_id(&mut self) -> MsgId {
        self.next_id += 1;
        MsgId(self.next_id)
    }
}

/// A [`Backend`] that keeps everything in memory.
pub struct MemoryBackend {
    state: Mutex<State>,
    queue: Arc<dyn TaskQueue>,
    policy: RetryPolicy,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            queue: Arc::new(MemoryQueue::new()),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub async fn add_channel(&self, channel: Channel) {
        self.state.lock().await.channels.insert(channel.uuid, channel);
    }

    /// Stores an outgoing message without queueing a send task.
    pub async fn insert_outgoing(&self, msg: &OutgoingMsg) -> MsgId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let mut stored = msg.clone();
        stored.id = id;
        stored.status = courier_core::MsgStatus::Queued;
        state.outgoing.push(stored);
        id
    }

    pub async fn incoming_msgs(&self) -> Vec<IncomingMsg> {
        self.state
            .lock()
            .await
            .incoming
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub async fn outgoing_msg(&self, id: MsgId) -> Option<OutgoingMsg> {
        self.state
            .lock()
            .await
            .outgoing
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub async fn status_updates(&self) -> Vec<StatusUpdate> {
        self.state.lock().await.updates.clone()
    }

    pub async fn channel_logs(&self) -> Vec<ChannelLog> {
        self.state.lock().await.logs.clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_channel(
        &self,
        channel_type: &ChannelType,
        uuid: &ChannelUuid,
    ) -> Result<Channel, CourierError> {
        let state = self.state.lock().await;
        state
            .channels
            .get(uuid)
            .filter(|c| &c.channel_type == channel_type)
            .cloned()
            .ok_or_else(|| CourierError::ChannelNotFound {
                channel_type: channel_type.to_string(),
                uuid: uuid.to_string(),
            })
    }

    async fn get_channel_by_uuid(&self, uuid: &ChannelUuid) -> Result<Channel, CourierError> {
        let state = self.state.lock().await;
        state
            .channels
            .get(uuid)
            .cloned()
            .ok_or_else(|| CourierError::ChannelNotFound {
                channel_type: String::new(),
                uuid: uuid.to_string(),
            })
    }

    async fn write_msg(&self, msg: &IncomingMsg) -> Result<WriteOutcome, CourierError> {
        let mut state = self.state.lock().await;
        if let Some(external_id) = &msg.external_id
            && let Some((id, _)) = state.incoming.iter().find(|(_, m)| {
                m.channel_uuid == msg.channel_uuid && m.external_id.as_ref() == Some(external_id)
            })
        {
            return Ok(WriteOutcome::Duplicate(*id));
        }
        let id = state.next_id();
        state.incoming.push((id, msg.clone()));
        Ok(WriteOutcome::Written(id))
    }

    async fn write_status_update(
        &self,
        update: &StatusUpdate,
    ) -> Result<Option<Transition>, CourierError> {
        let mut state = self.state.lock().await;
        let target = state.outgoing.iter_mut().rev().find(|m| {
            m.channel_uuid == update.channel_uuid
                && match (&update.msg_id, &update.external_id) {
                    (Some(id), _) => m.id == *id,
                    (None, Some(ext)) => m.external_id.as_ref() == Some(ext),
                    (None, None) => false,
                }
        });
        let Some(msg) = target else {
            return Ok(None);
        };

        let current = MsgState {
            status: msg.status,
            error_count: msg.error_count,
        };
        let result = transition(current, update.status, &self.policy);
        if result.applied {
            msg.status = result.current.status;
            msg.error_count = result.current.error_count;
            if let Some(ext) = &update.new_external_id {
                msg.external_id = Some(ext.clone());
            }
        }
        state.updates.push(update.clone());
        Ok(Some(result))
    }

    async fn enqueue_outgoing(&self, msg: &OutgoingMsg) -> Result<MsgId, CourierError> {
        let id = self.insert_outgoing(msg).await;
        if let Err(e) = self.queue.push(&TaskEnvelope::send_msg(&msg.channel_uuid, id)).await {
            self.state.lock().await.outgoing.retain(|m| m.id != id);
            return Err(e);
        }
        Ok(id)
    }

    async fn get_outgoing_msg(&self, id: MsgId) -> Result<Option<OutgoingMsg>, CourierError> {
        Ok(self.outgoing_msg(id).await)
    }

    async fn was_msg_sent(&self, id: MsgId) -> Result<bool, CourierError> {
        Ok(self
            .outgoing_msg(id)
            .await
            .is_some_and(|m| m.status.was_sent()))
    }

    async fn write_channel_log(&self, clog: &ChannelLog) -> Result<(), CourierError> {
        self.state.lock().await.logs.push(clog.clone());
        Ok(())
    }

    fn queue(&self) -> Arc<dyn TaskQueue> {
        self.queue.clone()
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use courier_core::MsgStatus;

    #[tokio::test]
    async fn incoming_dedupes_on_external_id() {
        let backend = MemoryBackend::new();
        let channel = fixtures::channel("EX");
        backend.add_channel(channel.clone()).await;

        let msg = IncomingMsg::new(&channel, fixtures::tel_urn(), "hi").with_external_id("ext-1");
        let first = backend.write_msg(&msg).await.unwrap();
        let again = backend.write_msg(&msg).await.unwrap();
        assert!(matches!(first, WriteOutcome::Written(_)));
        assert_eq!(again, WriteOutcome::Duplicate(first.msg_id()));
        assert_eq!(backend.incoming_msgs().await.len(), 1);
    }

    #[tokio::test]
    async fn receipts_never_regress() {
        let backend = MemoryBackend::new();
        let channel = fixtures::channel("EX");
        let id = backend
            .enqueue_outgoing(&OutgoingMsg::new(&channel, fixtures::tel_urn(), "hi"))
            .await
            .unwrap();

        for status in [MsgStatus::Wired, MsgStatus::Delivered, MsgStatus::Sent] {
            let update = backend.new_status_update(&channel, id, status);
            backend.write_status_update(&update).await.unwrap();
        }
        let msg = backend.outgoing_msg(id).await.unwrap();
        assert_eq!(msg.status, MsgStatus::Delivered);
        assert_eq!(backend.status_updates().await.len(), 3);
        assert_eq!(backend.queue().size(&TaskEnvelope::queue_for_channel(&channel.uuid)).await.unwrap(), 1);
    }
}
