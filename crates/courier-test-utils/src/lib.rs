// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides an in-memory backend, a scriptable channel handler and fixtures
//! for fast, deterministic tests without a database or provider.
//!
//! # Components
//!
//! - [`MemoryBackend`] - `Backend` that keeps everything in memory
//! - [`MockHandler`] - channel handler with scripted send outcomes
//! - [`fixtures`] - channels, URNs and webhook requests

pub mod fixtures;
pub mod memory_backend;
pub mod mock_handler;

pub use memory_backend::MemoryBackend;
pub use mock_handler::{MockHandler, MockSend};
