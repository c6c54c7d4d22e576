// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP boundary of the Courier gateway.
//!
//! Provides an axum-based server with:
//! - Channel webhook routes declared by the registered handlers
//! - An index page listing those routes and a status page with queue depths
//! - `POST /v1/send` to queue outgoing messages, behind bearer token auth

pub mod auth;
pub mod handlers;
pub mod receive;
pub mod server;

pub use server::{GatewayState, router, start_server};
