// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The send pipeline: one leased task in, one status transition out.
//!
//! A task is acknowledged only after its status update (and any retry
//! task) has been written. A crash in between leaves the lease to expire,
//! and the task runs again; the already-sent check and the status ordering
//! rules make that second run harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use courier_core::{
    Backend, Channel, ChannelLog, ChannelLogType, CourierError, HandlerRegistry, Lease, MsgStatus,
    OutgoingMsg, SEND_MSG_TASK, SendError, SendResult, StatusUpdate, Transition,
};

/// What became of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was handed to a handler (or failed without one).
    Attempted {
        status: MsgStatus,
        transition: Option<Transition>,
    },
    /// The task was dropped without touching the message.
    Skipped(&'static str),
}

/// Runs the handler for each send task and records the result.
pub struct Sender {
    backend: Arc<dyn Backend>,
    registry: Arc<HandlerRegistry>,
    send_timeout: Duration,
}

impl Sender {
    pub fn new(backend: Arc<dyn Backend>, registry: Arc<HandlerRegistry>, send_timeout: Duration) -> Self {
        Self {
            backend,
            registry,
            send_timeout,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Processes a leased task from `queue` and acknowledges it.
    ///
    /// Storage errors are returned without acknowledging, so the task is
    /// handed out again once its lease expires.
    pub async fn process(&self, queue: &str, lease: Lease) -> Result<SendOutcome, CourierError> {
        let outcome = self.run(&lease).await?;
        if let SendOutcome::Attempted {
            transition: Some(Transition {
                retry_in: Some(delay),
                current,
                ..
            }),
            ..
        } = &outcome
        {
            let retry = lease.envelope.retry(*delay);
            self.backend.queue().push(&retry).await?;
            info!(
                queue,
                retries = retry.retries(),
                error_count = current.error_count,
                delay_secs = delay.as_secs(),
                "send errored, retry scheduled"
            );
        }
        self.backend.queue().ack(queue, lease.lease_id).await?;
        Ok(outcome)
    }

    async fn run(&self, lease: &Lease) -> Result<SendOutcome, CourierError> {
        let envelope = &lease.envelope;
        if envelope.task() != SEND_MSG_TASK {
            warn!(task = envelope.task(), "dropping task of unknown type");
            return Ok(SendOutcome::Skipped("unknown task"));
        }
        let Some(msg_id) = envelope.msg_id() else {
            warn!(task_id = %envelope.id(), "dropping send task without message id");
            return Ok(SendOutcome::Skipped("missing message id"));
        };
        let Some(msg) = self.backend.get_outgoing_msg(msg_id).await? else {
            warn!(msg_id = %msg_id, "dropping send task for unknown message");
            return Ok(SendOutcome::Skipped("message not found"));
        };
        if msg.status.is_terminal() {
            debug!(msg_id = %msg_id, status = %msg.status, "message already final, skipping");
            return Ok(SendOutcome::Skipped("message already final"));
        }

        let channel = match self.backend.get_channel(&msg.channel_type, &msg.channel_uuid).await {
            Ok(channel) => channel,
            Err(CourierError::ChannelNotFound { .. }) => {
                warn!(msg_id = %msg_id, channel_uuid = %msg.channel_uuid, "channel gone, failing message");
                let update = StatusUpdate {
                    channel_uuid: msg.channel_uuid,
                    msg_id: Some(msg_id),
                    external_id: None,
                    status: MsgStatus::Failed,
                    log_uuid: None,
                    new_external_id: None,
                    created_on: Utc::now(),
                };
                let transition = self.backend.write_status_update(&update).await?;
                return Ok(SendOutcome::Attempted {
                    status: MsgStatus::Failed,
                    transition,
                });
            }
            Err(e) => return Err(e),
        };

        self.send(&channel, &msg).await
    }

    async fn send(&self, channel: &Channel, msg: &OutgoingMsg) -> Result<SendOutcome, CourierError> {
        let handler = self.registry.get(&channel.channel_type);
        let secrets = match &handler {
            Some(h) => h.redact_values(channel),
            None => channel.config.secret_values(),
        };
        let mut clog = ChannelLog::new(ChannelLogType::MsgSend, Some(channel), &secrets);
        clog.set_msg_id(msg.id);

        let mut result = SendResult::default();
        let status = if self.backend.was_msg_sent(msg.id).await? {
            info!(msg_id = %msg.id, "message already sent, not sending again");
            MsgStatus::Wired
        } else if let Some(handler) = handler {
            let attempt = tokio::time::timeout(
                self.send_timeout,
                handler.send(channel, msg, &mut result, &mut clog),
            )
            .await;
            match attempt {
                Ok(Ok(())) => result.status(),
                Ok(Err(e)) => {
                    clog.send_error(&e);
                    log_send_error(msg, &e);
                    e.status()
                }
                Err(_) => {
                    let e = SendError::ConnectionFailed(format!(
                        "send timed out after {}s",
                        self.send_timeout.as_secs()
                    ));
                    clog.send_error(&e);
                    warn!(msg_id = %msg.id, channel_uuid = %channel.uuid, "send timed out");
                    MsgStatus::Errored
                }
            }
        } else {
            clog.error(
                "handler_not_found",
                None,
                &format!("no handler for channel type {}", channel.channel_type),
            );
            error!(msg_id = %msg.id, channel_type = %channel.channel_type, "no handler registered");
            MsgStatus::Failed
        };

        let mut update = self
            .backend
            .new_status_update(channel, msg.id, status)
            .with_log(clog.uuid);
        if let Some(external_id) = result.external_ids().first() {
            update = update.with_new_external_id(external_id.clone());
        }
        let transition = self.backend.write_status_update(&update).await?;

        clog.end();
        if let Err(e) = self.backend.write_channel_log(&clog).await {
            error!(msg_id = %msg.id, error = %e, "failed to write channel log");
        }

        debug!(
            msg_id = %msg.id,
            channel_uuid = %channel.uuid,
            status = %status,
            elapsed_ms = clog.elapsed_ms,
            "send attempt recorded"
        );
        Ok(SendOutcome::Attempted { status, transition })
    }
}

fn log_send_error(msg: &OutgoingMsg, e: &SendError) {
    match e {
        SendError::ContactStopped => {
            info!(msg_id = %msg.id, urn = %msg.urn.identity(), "contact stopped, message failed");
        }
        e if e.is_retryable() => {
            warn!(msg_id = %msg.id, code = e.code(), error = %e, "send errored");
        }
        e => {
            warn!(msg_id = %msg.id, code = e.code(), error = %e, "send failed");
        }
    }
}
