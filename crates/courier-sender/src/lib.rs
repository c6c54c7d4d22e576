// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outgoing message delivery for the Courier gateway.
//!
//! [`Foreman`] watches the task queues and runs one worker per queue with
//! due work; each worker hands leased tasks to [`Sender`], which calls the
//! channel handler and records the resulting status.

pub mod foreman;
pub mod sender;

pub use foreman::Foreman;
pub use sender::{SendOutcome, Sender};
