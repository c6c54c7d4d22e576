// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Courier messaging gateway.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, typed queries for channels,
//! messages and channel logs, and two [`courier_core::TaskQueue`]
//! implementations: a durable SQLite queue and a process-local one.

pub mod adapter;
pub mod database;
pub mod memory_queue;
pub mod migrations;
mod models;
pub mod queries;
pub mod task_queue;

pub use adapter::SqliteBackend;
pub use database::Database;
pub use memory_queue::MemoryQueue;
pub use task_queue::SqliteQueue;
