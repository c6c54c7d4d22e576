// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams of the gateway: channel handlers, the backend and the task queue.

pub mod backend;
pub mod handler;
pub mod queue;

pub use backend::{Backend, WriteOutcome};
pub use handler::{ChannelHandler, ReceiveContext, SendResult, WebhookRequest};
pub use queue::{Lease, RawLease, TaskQueue};
