// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages and status updates flowing through the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::Channel;
use crate::status::MsgStatus;
use crate::types::{ChannelType, ChannelUuid, MsgId};
use crate::urn::Urn;

/// Splits a `mime/type:url` attachment into its content type and URL.
///
/// Attachments without a content type yield `None` for the type.
pub fn split_attachment(attachment: &str) -> (Option<&str>, &str) {
    match attachment.split_once(':') {
        Some((mime, url)) if mime.contains('/') => (Some(mime), url),
        _ => (None, attachment),
    }
}

/// A message received from a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMsg {
    pub uuid: Uuid,
    pub channel_uuid: ChannelUuid,
    pub channel_type: ChannelType,
    pub urn: Urn,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub external_id: Option<String>,
    pub contact_name: Option<String>,
    pub received_on: DateTime<Utc>,
}

impl IncomingMsg {
    pub fn new(channel: &Channel, urn: Urn, text: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            channel_uuid: channel.uuid,
            channel_type: channel.channel_type.clone(),
            urn,
            text: text.into(),
            attachments: Vec::new(),
            external_id: None,
            contact_name: None,
            received_on: Utc::now(),
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        let id = external_id.into();
        self.external_id = (!id.is_empty()).then_some(id);
        self
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }

    pub fn with_received_on(mut self, received_on: DateTime<Utc>) -> Self {
        self.received_on = received_on;
        self
    }

    pub fn with_contact_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.contact_name = (!name.trim().is_empty()).then(|| name.trim().to_string());
        self
    }
}

/// A message waiting to be, or already, handed to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMsg {
    pub id: MsgId,
    pub uuid: Uuid,
    pub channel_uuid: ChannelUuid,
    pub channel_type: ChannelType,
    pub urn: Urn,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub status: MsgStatus,
    pub error_count: u32,
    pub external_id: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl OutgoingMsg {
    /// A not-yet-stored message. The id is assigned when it is enqueued.
    pub fn new(channel: &Channel, urn: Urn, text: impl Into<String>) -> Self {
        Self {
            id: MsgId(0),
            uuid: Uuid::new_v4(),
            channel_uuid: channel.uuid,
            channel_type: channel.channel_type.clone(),
            urn,
            text: text.into(),
            attachments: Vec::new(),
            status: MsgStatus::Pending,
            error_count: 0,
            external_id: None,
            created_on: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }
}

/// A request to move a message to a new status.
///
/// The message is addressed either by id or by the provider's external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub channel_uuid: ChannelUuid,
    pub msg_id: Option<MsgId>,
    pub external_id: Option<String>,
    pub status: MsgStatus,
    /// Channel log holding the request that produced this update.
    pub log_uuid: Option<Uuid>,
    /// Replaces the stored external id when set.
    pub new_external_id: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn for_msg(channel: &Channel, msg_id: MsgId, status: MsgStatus) -> Self {
        Self {
            channel_uuid: channel.uuid,
            msg_id: Some(msg_id),
            external_id: None,
            status,
            log_uuid: None,
            new_external_id: None,
            created_on: Utc::now(),
        }
    }

    pub fn for_external_id(channel: &Channel, external_id: impl Into<String>, status: MsgStatus) -> Self {
        Self {
            channel_uuid: channel.uuid,
            msg_id: None,
            external_id: Some(external_id.into()),
            status,
            log_uuid: None,
            new_external_id: None,
            created_on: Utc::now(),
        }
    }

    pub fn with_log(mut self, log_uuid: Uuid) -> Self {
        self.log_uuid = Some(log_uuid);
        self
    }

    pub fn with_new_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.new_external_id = Some(external_id.into());
        self
    }
}

/// Something a handler extracted from a webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Msg(IncomingMsg),
    Status(StatusUpdate),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_split() {
        assert_eq!(
            split_attachment("image/jpeg:https://example.com/a.jpg"),
            (Some("image/jpeg"), "https://example.com/a.jpg")
        );
        assert_eq!(
            split_attachment("https://example.com/a.jpg"),
            (None, "https://example.com/a.jpg")
        );
        assert_eq!(split_attachment("geo:1.5,30.1"), (None, "geo:1.5,30.1"));
    }

    #[test]
    fn builders_drop_empty_values() {
        let channel = Channel::new(ChannelUuid::new_v4(), ChannelType::new("EX"), "2020");
        let urn = Urn::parse("tel:+250788383383").unwrap();
        let msg = IncomingMsg::new(&channel, urn, "hi")
            .with_external_id("")
            .with_contact_name("  ");
        assert_eq!(msg.external_id, None);
        assert_eq!(msg.contact_name, None);
        assert_eq!(msg.channel_type.as_str(), "EX");
    }
}
