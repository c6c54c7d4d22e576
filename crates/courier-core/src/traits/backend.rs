// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend trait: where channels, messages, statuses and logs live.

use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::Channel;
use crate::clog::ChannelLog;
use crate::error::CourierError;
use crate::msg::{IncomingMsg, OutgoingMsg, StatusUpdate};
use crate::status::{MsgStatus, Transition};
use crate::traits::queue::TaskQueue;
use crate::types::{ChannelType, ChannelUuid, HealthStatus, MsgId};
use crate::urn::Urn;

/// Result of writing an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(MsgId),
    /// A message with the same channel and external id already exists.
    Duplicate(MsgId),
}

impl WriteOutcome {
    pub fn msg_id(self) -> MsgId {
        match self {
            WriteOutcome::Written(id) | WriteOutcome::Duplicate(id) => id,
        }
    }
}

/// Persistence and lookup used by handlers, the sender and the HTTP boundary.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Looks up a channel, requiring its type to match.
    async fn get_channel(
        &self,
        channel_type: &ChannelType,
        uuid: &ChannelUuid,
    ) -> Result<Channel, CourierError>;

    async fn get_channel_by_uuid(&self, uuid: &ChannelUuid) -> Result<Channel, CourierError>;

    fn new_incoming_msg(&self, channel: &Channel, urn: Urn, text: &str) -> IncomingMsg {
        IncomingMsg::new(channel, urn, text)
    }

    /// Persists an incoming message, deduplicating on external id.
    async fn write_msg(&self, msg: &IncomingMsg) -> Result<WriteOutcome, CourierError>;

    fn new_status_update(&self, channel: &Channel, msg_id: MsgId, status: MsgStatus) -> StatusUpdate {
        StatusUpdate::for_msg(channel, msg_id, status)
    }

    fn new_status_update_by_external_id(
        &self,
        channel: &Channel,
        external_id: &str,
        status: MsgStatus,
    ) -> StatusUpdate {
        StatusUpdate::for_external_id(channel, external_id, status)
    }

    /// Applies a status update under the ordering rules.
    ///
    /// Returns `None` when no message matches the update.
    async fn write_status_update(
        &self,
        update: &StatusUpdate,
    ) -> Result<Option<Transition>, CourierError>;

    fn new_outgoing_msg(&self, channel: &Channel, urn: Urn, text: &str) -> OutgoingMsg {
        OutgoingMsg::new(channel, urn, text)
    }

    /// Stores the message as queued and pushes its send task. Either both
    /// happen or neither does.
    async fn enqueue_outgoing(&self, msg: &OutgoingMsg) -> Result<MsgId, CourierError>;

    async fn get_outgoing_msg(&self, id: MsgId) -> Result<Option<OutgoingMsg>, CourierError>;

    /// Whether the provider already accepted this message.
    ///
    /// Guards against sending twice when a task is redelivered.
    async fn was_msg_sent(&self, id: MsgId) -> Result<bool, CourierError>;

    async fn write_channel_log(&self, clog: &ChannelLog) -> Result<(), CourierError>;

    /// Queue carrying send tasks.
    fn queue(&self) -> Arc<dyn TaskQueue>;

    async fn health(&self) -> HealthStatus;
}
