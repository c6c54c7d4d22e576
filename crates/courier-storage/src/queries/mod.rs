// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod channel_logs;
pub mod channels;
pub mod msgs;
pub mod queue;
