// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON task envelopes exchanged through the task queue.
//!
//! The layout follows the worker convention shared with the rest of the
//! messaging stack: a task name, positional `args`, keyword `kwargs`, and a
//! routing key under `properties.delivery_info`, which names the queue the
//! envelope belongs to.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CourierError;
use crate::types::{ChannelUuid, MsgId};

/// Task name for sending one outgoing message.
pub const SEND_MSG_TASK: &str = "send_msg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    id: Uuid,
    task: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    kwargs: Map<String, Value>,
    #[serde(default)]
    retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eta: Option<DateTime<Utc>>,
    properties: TaskProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TaskProperties {
    delivery_info: DeliveryInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DeliveryInfo {
    routing_key: String,
}

impl TaskEnvelope {
    pub fn new(queue: &str, task: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.to_string(),
            args,
            kwargs,
            retries: 0,
            eta: None,
            properties: TaskProperties {
                delivery_info: DeliveryInfo {
                    routing_key: queue.to_string(),
                },
            },
        }
    }

    /// Queue that carries all sends for one channel, so a channel's
    /// messages leave in the order they were queued.
    pub fn queue_for_channel(channel_uuid: &ChannelUuid) -> String {
        format!("msgs:{channel_uuid}")
    }

    /// Envelope asking a worker to send message `msg_id` on `channel_uuid`.
    pub fn send_msg(channel_uuid: &ChannelUuid, msg_id: MsgId) -> Self {
        let mut kwargs = Map::new();
        kwargs.insert("channel_uuid".into(), Value::String(channel_uuid.to_string()));
        TaskEnvelope::new(
            &TaskEnvelope::queue_for_channel(channel_uuid),
            SEND_MSG_TASK,
            vec![Value::from(msg_id.0)],
            kwargs,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn eta(&self) -> Option<DateTime<Utc>> {
        self.eta
    }

    pub fn routing_key(&self) -> &str {
        &self.properties.delivery_info.routing_key
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.eta.is_none_or(|eta| eta <= now)
    }

    /// The same task, scheduled again `delay` from now.
    pub fn retry(&self, delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let mut next = self.clone();
        next.retries = self.retries.saturating_add(1);
        next.eta = Utc::now().checked_add_signed(delay);
        next
    }

    /// First positional argument read as a message id.
    pub fn msg_id(&self) -> Option<MsgId> {
        match self.args.first()? {
            Value::Number(n) => n.as_i64().map(MsgId),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn channel_uuid(&self) -> Option<ChannelUuid> {
        self.kwargs
            .get("channel_uuid")
            .and_then(Value::as_str)
            .and_then(|s| ChannelUuid::parse(s).ok())
    }

    pub fn encode(&self) -> Result<String, CourierError> {
        serde_json::to_string(self).map_err(|e| CourierError::Envelope(e.to_string()))
    }

    /// Decodes and validates a raw payload.
    pub fn decode(raw: &str) -> Result<Self, CourierError> {
        let envelope: TaskEnvelope =
            serde_json::from_str(raw).map_err(|e| CourierError::Envelope(e.to_string()))?;
        if envelope.task.trim().is_empty() {
            return Err(CourierError::Envelope("empty task name".into()));
        }
        if envelope.routing_key().trim().is_empty() {
            return Err(CourierError::Envelope("empty routing key".into()));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_msg_envelope_layout() {
        let channel = ChannelUuid::parse("dbc126ed-66bc-4e28-b67b-81dc3327c95d").unwrap();
        let env = TaskEnvelope::send_msg(&channel, MsgId(10));
        let json: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();

        assert_eq!(json["task"], "send_msg");
        assert_eq!(json["args"], serde_json::json!([10]));
        assert_eq!(json["kwargs"]["channel_uuid"], channel.to_string());
        assert_eq!(
            json["properties"]["delivery_info"]["routing_key"],
            "msgs:dbc126ed-66bc-4e28-b67b-81dc3327c95d"
        );
        assert!(json.get("eta").is_none());
    }

    #[test]
    fn decode_reads_foreign_payload() {
        let raw = r#"{
            "id": "4c7b4a36-0c1f-4f0e-8a4e-3f0a3b4e7a11",
            "task": "send_msg",
            "args": ["42"],
            "kwargs": {},
            "properties": {"delivery_info": {"routing_key": "msgs:x"}}
        }"#;
        let env = TaskEnvelope::decode(raw).unwrap();
        assert_eq!(env.msg_id(), Some(MsgId(42)));
        assert_eq!(env.retries(), 0);
        assert_eq!(env.channel_uuid(), None);
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(TaskEnvelope::decode("{not json").is_err());
        assert!(TaskEnvelope::decode(r#"{"id":"4c7b4a36-0c1f-4f0e-8a4e-3f0a3b4e7a11","task":""}"#).is_err());

        let mut env = TaskEnvelope::new("q", "t", vec![], Map::new());
        env.task = " ".into();
        assert!(TaskEnvelope::decode(&env.encode().unwrap()).is_err());
    }

    #[test]
    fn retry_keeps_identity_and_schedules() {
        let env = TaskEnvelope::new("q", "t", vec![Value::from(1)], Map::new());
        let now = Utc::now();
        assert!(env.is_due(now));

        let next = env.retry(Duration::from_secs(300));
        assert_eq!(next.id(), env.id());
        assert_eq!(next.retries(), 1);
        assert!(!next.is_due(now));
        assert!(next.is_due(now + chrono::Duration::seconds(301)));
    }
}
