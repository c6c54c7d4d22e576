// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier gateway.
//!
//! [`CourierError`] is the workspace-wide error. Channel handlers additionally
//! report through [`SendError`] (outgoing) and [`ReceiveError`] (incoming), which
//! carry the classification the sender and the HTTP boundary act upon.

use thiserror::Error;

use crate::status::MsgStatus;

/// The primary error type used across backend, queue and registry operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, failed validation, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A channel is missing a config key, or the key holds the wrong type.
    #[error("channel config error for `{key}`: {message}")]
    ChannelConfig { key: String, message: String },

    /// Storage backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Task queue failures other than malformed payloads.
    #[error("queue error: {message}")]
    Queue { message: String },

    /// No channel exists with this type and UUID.
    #[error("channel not found: {channel_type}/{uuid}")]
    ChannelNotFound { channel_type: String, uuid: String },

    /// No handler is registered for the channel type.
    #[error("no handler registered for channel type {0}")]
    HandlerNotFound(String),

    /// A second handler tried to register an already claimed channel type.
    #[error("a handler is already registered for channel type {0}")]
    DuplicateHandler(String),

    /// Two handlers (or one handler twice) declared the same route.
    #[error("route conflict: {method} /{channel_type}/<uuid>/{action}")]
    RouteConflict {
        channel_type: String,
        method: String,
        action: String,
    },

    /// A URN could not be constructed or parsed.
    #[error("invalid URN: {0}")]
    InvalidUrn(String),

    /// A URN field name that `resolve` does not know.
    #[error("unknown URN field `{0}`")]
    UnknownUrnField(String),

    /// A task envelope failed to decode or validate.
    #[error("invalid task envelope: {0}")]
    Envelope(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Wraps any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CourierError::Storage {
            source: Box::new(err),
        }
    }

    /// Builds a [`CourierError::ChannelConfig`] for `key`.
    pub fn channel_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        CourierError::ChannelConfig {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single outgoing send, as reported by a channel handler.
///
/// The variant decides what happens next: retryable errors leave the message
/// `Errored` and schedule another attempt, everything else fails it for good.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("{0}")]
    ChannelConfig(String),

    #[error("{0}")]
    MessageInvalid(String),

    /// Network failure, timeout, or a 5xx from the provider.
    #[error("unable to connect to server: {0}")]
    ConnectionFailed(String),

    #[error("channel rate limited the request")]
    Throttled,

    #[error("unexpected response status code {0}")]
    ResponseStatus(u16),

    #[error("response content indicates non-success: {0}")]
    ResponseContent(String),

    #[error("unable to parse response: {0}")]
    ResponseUnparseable(String),

    #[error("response did not contain expected values: {0}")]
    ResponseUnexpected(String),

    #[error("contact has opted out of messages from this channel")]
    ContactStopped,

    /// Provider rejected the send with its own error code.
    #[error("channel rejected send ({code}): {description}")]
    FailedWithReason { code: String, description: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl SendError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SendError::ConnectionFailed(_) | SendError::Throttled | SendError::Internal(_)
        )
    }

    /// The status a send attempt that ended in this error should request.
    pub fn status(&self) -> MsgStatus {
        if self.is_retryable() {
            MsgStatus::Errored
        } else {
            MsgStatus::Failed
        }
    }

    /// Stable error code written to channel logs.
    pub fn code(&self) -> &'static str {
        match self {
            SendError::ChannelConfig(_) => "channel_config",
            SendError::MessageInvalid(_) => "message_invalid",
            SendError::ConnectionFailed(_) => "connection_failed",
            SendError::Throttled => "throttled",
            SendError::ResponseStatus(_) => "response_status",
            SendError::ResponseContent(_) => "response_content",
            SendError::ResponseUnparseable(_) => "response_unparseable",
            SendError::ResponseUnexpected(_) => "response_unexpected",
            SendError::ContactStopped => "contact_stopped",
            SendError::FailedWithReason { .. } => "failed_with_reason",
            SendError::Internal(_) => "internal",
        }
    }

    /// Provider-specific code, when the provider supplied one.
    pub fn ext_code(&self) -> Option<&str> {
        match self {
            SendError::FailedWithReason { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<CourierError> for SendError {
    fn from(err: CourierError) -> Self {
        match err {
            CourierError::ChannelConfig { key, message } => {
                SendError::ChannelConfig(format!("{key}: {message}"))
            }
            CourierError::InvalidUrn(msg) => SendError::MessageInvalid(msg),
            other => SendError::Internal(other.to_string()),
        }
    }
}

/// Failure (or deliberate non-action) while handling an incoming webhook.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// The request is malformed or fails handler validation. Answered with 400.
    #[error("{0}")]
    Invalid(String),

    /// The request is well formed but carries nothing to act on. Answered with 200.
    #[error("{0}")]
    Ignored(String),

    /// The request failed the handler's own authentication. Answered with 401.
    #[error("{0}")]
    Unauthorized(String),

    /// Persisting the result failed. Answered with 500.
    #[error(transparent)]
    Backend(#[from] CourierError),
}

impl ReceiveError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ReceiveError::Invalid(msg.into())
    }

    pub fn ignored(msg: impl Into<String>) -> Self {
        ReceiveError::Ignored(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_send_errors_request_errored() {
        assert!(SendError::ConnectionFailed("reset".into()).is_retryable());
        assert!(SendError::Throttled.is_retryable());
        assert_eq!(SendError::Throttled.status(), MsgStatus::Errored);
    }

    #[test]
    fn permanent_send_errors_request_failed() {
        for err in [
            SendError::ResponseStatus(400),
            SendError::ContactStopped,
            SendError::MessageInvalid("empty".into()),
            SendError::FailedWithReason {
                code: "21610".into(),
                description: "unsubscribed".into(),
            },
        ] {
            assert!(!err.is_retryable(), "{err} should not be retryable");
            assert_eq!(err.status(), MsgStatus::Failed);
        }
    }

    #[test]
    fn ext_code_only_for_failed_with_reason() {
        let err = SendError::FailedWithReason {
            code: "403".into(),
            description: "blocked".into(),
        };
        assert_eq!(err.ext_code(), Some("403"));
        assert_eq!(err.code(), "failed_with_reason");
        assert_eq!(SendError::Throttled.ext_code(), None);
    }

    #[test]
    fn channel_config_error_converts_to_permanent_send_error() {
        let err: SendError = CourierError::channel_config("auth_token", "missing").into();
        assert!(matches!(err, SendError::ChannelConfig(ref m) if m.contains("auth_token")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn storage_error_displays_source() {
        let err = CourierError::storage(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
