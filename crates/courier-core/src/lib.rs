// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier messaging gateway.
//!
//! This crate holds the types every other crate speaks: URNs, channels,
//! messages, delivery statuses, task envelopes and channel logs, plus the
//! trait seams (`ChannelHandler`, `Backend`, `TaskQueue`) that storage,
//! handlers, the sender and the HTTP gateway plug into.

pub mod channel;
pub mod clog;
pub mod envelope;
pub mod error;
pub mod msg;
pub mod redact;
pub mod registry;
pub mod status;
pub mod traits;
pub mod types;
pub mod urn;

// Re-export key items at crate root for ergonomic imports.
pub use channel::{Channel, ChannelConfig};
pub use clog::{ChannelLog, ChannelLogType, HttpLog, HttpOutcome, HttpTrace};
pub use envelope::{SEND_MSG_TASK, TaskEnvelope};
pub use error::{CourierError, ReceiveError, SendError};
pub use msg::{Event, IncomingMsg, OutgoingMsg, StatusUpdate};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder, HandlerRoute, RouteRegistrar};
pub use status::{MsgState, MsgStatus, RetryPolicy, Transition};
pub use types::{ChannelType, ChannelUuid, HealthStatus, HttpMethod, MsgId};
pub use urn::{Scheme, Urn};

pub use traits::{
    Backend, ChannelHandler, Lease, RawLease, ReceiveContext, SendResult, TaskQueue, WebhookRequest,
    WriteOutcome,
};
