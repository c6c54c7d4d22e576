// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel handler with scripted send outcomes.
//!
//! `MockHandler` answers `POST receive` with a small JSON protocol
//! (`{"from": "...", "text": "..."}`) and replays queued [`MockSend`]
//! outcomes on each send, accepting when the script runs out.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use courier_core::{
    Channel, ChannelHandler, ChannelLog, ChannelType, CourierError, Event, HttpMethod, HttpTrace,
    OutgoingMsg, ReceiveContext, ReceiveError, RouteRegistrar, SendError, SendResult, Urn,
};

/// What the next send should do.
#[derive(Debug, Clone)]
pub enum MockSend {
    /// Provider accepted; optionally returns an id.
    Accept(Option<String>),
    /// Provider confirmed delivery to the handset.
    Sent(String),
    /// The provider could not be reached.
    ConnectionFailure,
    /// The provider refused the message for good.
    Reject(String),
    /// Takes this long before accepting.
    Slow(Duration),
}

#[derive(Debug, Deserialize)]
struct MockPayload {
    from: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    id: Option<String>,
}

pub struct MockHandler {
    channel_type: ChannelType,
    script: Mutex<VecDeque<MockSend>>,
    sent: Mutex<Vec<OutgoingMsg>>,
}

impl MockHandler {
    pub fn new(code: &str) -> Self {
        Self {
            channel_type: ChannelType::new(code),
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queues outcomes for the next sends, in order.
    pub async fn script(&self, outcomes: impl IntoIterator<Item = MockSend>) {
        self.script.lock().await.extend(outcomes);
    }

    /// Every message handed to `send`, including failed attempts.
    pub async fn sent_messages(&self) -> Vec<OutgoingMsg> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl ChannelHandler for MockHandler {
    fn channel_type(&self) -> ChannelType {
        self.channel_type.clone()
    }

    fn channel_name(&self) -> &str {
        "Mock"
    }

    fn initialize(&self, routes: &mut RouteRegistrar<'_>) -> Result<(), CourierError> {
        routes.add(HttpMethod::Post, "receive")
    }

    async fn receive(
        &self,
        ctx: ReceiveContext<'_>,
        _clog: &mut ChannelLog,
    ) -> Result<Vec<Event>, ReceiveError> {
        let payload: MockPayload = ctx.request.json()?;
        let urn = Urn::normalize_raw(&payload.from, ctx.channel.primary_scheme(), ctx.channel.country())
            .map_err(|e| ReceiveError::invalid(e.to_string()))?;
        let mut msg = ctx.backend.new_incoming_msg(ctx.channel, urn, &payload.text);
        if let Some(id) = payload.id {
            msg = msg.with_external_id(id);
        }
        ctx.backend.write_msg(&msg).await?;
        Ok(vec![Event::Msg(msg)])
    }

    async fn send(
        &self,
        _channel: &Channel,
        msg: &OutgoingMsg,
        result: &mut SendResult,
        clog: &mut ChannelLog,
    ) -> Result<(), SendError> {
        self.sent.lock().await.push(msg.clone());
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(MockSend::Accept(None));

        let status_code = match &outcome {
            MockSend::ConnectionFailure => None,
            MockSend::Reject(_) => Some(400),
            _ => Some(200),
        };
        clog.record_http(HttpTrace {
            method: "POST".into(),
            url: "http://mock.provider/send".into(),
            status_code,
            request: msg.text.as_bytes().to_vec(),
            response: Vec::new(),
            elapsed_ms: 1,
        });

        match outcome {
            MockSend::Accept(id) => {
                if let Some(id) = id {
                    result.add_external_id(id);
                }
                Ok(())
            }
            MockSend::Sent(id) => {
                result.add_external_id(id);
                result.mark_sent();
                Ok(())
            }
            MockSend::ConnectionFailure => {
                Err(SendError::ConnectionFailed("connection refused".into()))
            }
            MockSend::Reject(code) => Err(SendError::FailedWithReason {
                code,
                description: "rejected by mock provider".into(),
            }),
            MockSend::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}
