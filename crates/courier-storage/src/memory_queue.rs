// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local task queue. Nothing survives a restart.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::traits::queue::LEASE_DURATION;
use courier_core::{CourierError, RawLease, TaskQueue};
use tokio::sync::{Mutex, Notify};

#[derive(Debug)]
struct Item {
    id: i64,
    payload: String,
    not_before: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

impl Item {
    fn available(&self, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            Some(until) => until <= now,
            None => self.not_before.is_none_or(|nb| nb <= now),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    queues: HashMap<String, VecDeque<Item>>,
    known: BTreeSet<String>,
}

/// In-memory [`TaskQueue`] with the same lease semantics as the SQLite one.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<State>,
    pushed: Notify,
    lease: chrono::Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            pushed: Notify::new(),
            lease: chrono::Duration::from_std(LEASE_DURATION).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::MAX);
        self
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push_raw(
        &self,
        queue: &str,
        payload: String,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError> {
        {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = state.next_id;
            state.known.insert(queue.to_string());
            state.queues.entry(queue.to_string()).or_default().push_back(Item {
                id,
                payload,
                not_before,
                locked_until: None,
            });
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_raw(&self, queue: &str, now: DateTime<Utc>) -> Result<Option<RawLease>, CourierError> {
        let mut state = self.state.lock().await;
        let Some(items) = state.queues.get_mut(queue) else {
            return Ok(None);
        };
        let lease = self.lease;
        Ok(items.iter_mut().find(|item| item.available(now)).map(|item| {
            item.locked_until = Some(now + lease);
            RawLease {
                lease_id: item.id,
                payload: item.payload.clone(),
            }
        }))
    }

    async fn ack(&self, queue: &str, lease_id: i64) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        if let Some(items) = state.queues.get_mut(queue) {
            items.retain(|item| item.id != lease_id);
            if items.is_empty() {
                state.queues.remove(queue);
            }
        }
        Ok(())
    }

    async fn ready_queues(&self, now: DateTime<Utc>) -> Result<Vec<String>, CourierError> {
        let state = self.state.lock().await;
        let mut ready: Vec<(i64, &String)> = state
            .queues
            .iter()
            .filter_map(|(name, items)| {
                items
                    .iter()
                    .filter(|item| item.available(now))
                    .map(|item| item.id)
                    .min()
                    .map(|oldest| (oldest, name))
            })
            .collect();
        ready.sort();
        Ok(ready.into_iter().map(|(_, name)| name.clone()).collect())
    }

    async fn known_queues(&self) -> Result<Vec<String>, CourierError> {
        Ok(self.state.lock().await.known.iter().cloned().collect())
    }

    async fn size(&self, queue: &str) -> Result<usize, CourierError> {
        Ok(self
            .state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, VecDeque::len))
    }

    async fn wait(&self, _queue: &str, max: Duration) {
        let _ = tokio::time::timeout(max, self.pushed.notified()).await;
    }
}
