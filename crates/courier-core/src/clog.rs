// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel logs: a record of every provider interaction.
//!
//! A log collects the HTTP exchanges and errors of one receive or send. All
//! recorded text passes through the channel's [`Redactor`] before it is kept,
//! so a log never holds a credential.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use uuid::Uuid;

use crate::channel::Channel;
use crate::error::SendError;
use crate::redact::Redactor;
use crate::types::{ChannelUuid, MsgId};

/// Placeholder recorded instead of bodies that are not valid UTF-8.
pub const NON_TEXT_BODY: &str = "(non-text body)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelLogType {
    MsgReceive,
    MsgStatus,
    MsgSend,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HttpOutcome {
    Success,
    ConnectionFailure,
    StatusFailure,
}

/// One HTTP exchange, already redacted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpLog {
    pub method: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub request: String,
    pub response: String,
    pub elapsed_ms: u64,
    pub outcome: HttpOutcome,
    pub created_on: DateTime<Utc>,
}

/// Unredacted exchange as captured by an HTTP client.
#[derive(Debug, Clone)]
pub struct HttpTrace {
    pub method: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub request: Vec<u8>,
    pub response: Vec<u8>,
    pub elapsed_ms: u64,
}

impl HttpTrace {
    pub fn outcome(&self) -> HttpOutcome {
        match self.status_code {
            None => HttpOutcome::ConnectionFailure,
            Some(code) if (200..300).contains(&code) => HttpOutcome::Success,
            Some(_) => HttpOutcome::StatusFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelLogError {
    pub code: String,
    pub ext_code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelLog {
    pub uuid: Uuid,
    pub log_type: ChannelLogType,
    pub channel_uuid: Option<ChannelUuid>,
    pub msg_id: Option<MsgId>,
    pub http_logs: Vec<HttpLog>,
    pub errors: Vec<ChannelLogError>,
    pub created_on: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(skip)]
    redactor: Redactor,
    #[serde(skip)]
    started: Instant,
}

impl ChannelLog {
    pub fn new(log_type: ChannelLogType, channel: Option<&Channel>, secrets: &[String]) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            log_type,
            channel_uuid: channel.map(|c| c.uuid),
            msg_id: None,
            http_logs: Vec::new(),
            errors: Vec::new(),
            created_on: Utc::now(),
            elapsed_ms: 0,
            redactor: Redactor::new(secrets),
            started: Instant::now(),
        }
    }

    pub fn set_type(&mut self, log_type: ChannelLogType) {
        self.log_type = log_type;
    }

    pub fn set_msg_id(&mut self, msg_id: MsgId) {
        self.msg_id = Some(msg_id);
    }

    /// Records an exchange, redacting everything but the status code.
    pub fn record_http(&mut self, trace: HttpTrace) {
        let outcome = trace.outcome();
        self.http_logs.push(HttpLog {
            method: trace.method,
            url: self.redactor.redact(&trace.url),
            status_code: trace.status_code,
            request: self.redact_body(&trace.request),
            response: self.redact_body(&trace.response),
            elapsed_ms: trace.elapsed_ms,
            outcome,
            created_on: Utc::now(),
        });
    }

    pub fn error(&mut self, code: &str, ext_code: Option<&str>, message: &str) {
        self.errors.push(ChannelLogError {
            code: code.to_string(),
            ext_code: ext_code.map(str::to_string),
            message: self.redactor.redact(message),
        });
    }

    pub fn send_error(&mut self, err: &SendError) {
        self.error(err.code(), err.ext_code(), &err.to_string());
    }

    /// Stops the clock. Called once, right before the log is written.
    pub fn end(&mut self) {
        self.elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
            || self
                .http_logs
                .iter()
                .any(|h| h.outcome != HttpOutcome::Success)
    }

    fn redact_body(&self, body: &[u8]) -> String {
        match std::str::from_utf8(body) {
            Ok(text) => self.redactor.redact(text),
            Err(_) => NON_TEXT_BODY.to_string(),
        }
    }
}
