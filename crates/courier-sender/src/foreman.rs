// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assigns queues with due work to a bounded pool of workers.
//!
//! Each queue is drained by at most one worker at a time, which keeps sends
//! on a channel in FIFO order. Workers exit once their queue stays empty
//! for the dequeue timeout, returning their slot to the pool.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_config::model::{QueueConfig, SenderConfig};
use courier_core::{CourierError, TaskQueue};

use crate::sender::{SendOutcome, Sender};

pub struct Foreman {
    sender: Arc<Sender>,
    queue: Arc<dyn TaskQueue>,
    max_workers: usize,
    poll_interval: Duration,
    dequeue_timeout: Duration,
}

impl Foreman {
    pub fn new(sender: Arc<Sender>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            sender,
            queue,
            max_workers: 32,
            poll_interval: Duration::from_millis(250),
            dequeue_timeout: Duration::from_secs(1),
        }
    }

    pub fn from_config(
        sender: Arc<Sender>,
        queue: Arc<dyn TaskQueue>,
        queue_config: &QueueConfig,
        sender_config: &SenderConfig,
    ) -> Self {
        Self::new(sender, queue)
            .with_max_workers(sender_config.max_workers)
            .with_poll_interval(queue_config.poll_interval())
            .with_dequeue_timeout(queue_config.dequeue_timeout())
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Runs until `cancel` fires, then waits for in-flight sends to finish.
    ///
    /// Workers stop taking new tasks as soon as cancellation is observed;
    /// a task already handed to a handler runs to completion (bounded by the
    /// send timeout) so its result is recorded.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), CourierError> {
        let slots = Arc::new(Semaphore::new(self.max_workers));
        let mut workers: JoinSet<()> = JoinSet::new();
        let active = ActiveQueues::default();
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(max_workers = self.max_workers, "foreman started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(active = workers.len(), "foreman stopping, draining workers");
                    break;
                }
                _ = tick.tick() => {
                    let ready = match self.queue.ready_queues(Utc::now()).await {
                        Ok(ready) => ready,
                        Err(e) => {
                            error!(error = %e, "failed to list ready queues");
                            continue;
                        }
                    };
                    for name in ready {
                        if slots.available_permits() == 0 {
                            debug!("all workers busy");
                            break;
                        }
                        let Some(claim) = active.claim(&name) else {
                            continue;
                        };
                        let Ok(permit) = slots.clone().try_acquire_owned() else {
                            break;
                        };
                        workers.spawn(self.worker(claim, permit, cancel.clone()));
                    }
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "queue worker panicked");
                    }
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "queue worker panicked during shutdown");
            }
        }
        info!("foreman stopped");
        Ok(())
    }

    fn worker(
        &self,
        claim: QueueClaim,
        permit: OwnedSemaphorePermit,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let sender = self.sender.clone();
        let queue = self.queue.clone();
        let dequeue_timeout = self.dequeue_timeout;
        async move {
            let _permit = permit;
            let queue_name = claim.name.clone();
            let mut handled = 0usize;
            debug!(queue = %queue_name, "worker started");
            while !cancel.is_cancelled() {
                let lease = tokio::select! {
                    _ = cancel.cancelled() => break,
                    lease = queue.dequeue(&queue_name, dequeue_timeout) => lease,
                };
                match lease {
                    Ok(Some(lease)) => match sender.process(&queue_name, lease).await {
                        Ok(SendOutcome::Skipped(reason)) => {
                            debug!(queue = %queue_name, reason, "task skipped");
                            handled += 1;
                        }
                        Ok(SendOutcome::Attempted { .. }) => handled += 1,
                        Err(e) => {
                            warn!(queue = %queue_name, error = %e, "task left for redelivery");
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        error!(queue = %queue_name, error = %e, "dequeue failed");
                        break;
                    }
                }
            }
            debug!(queue = %queue_name, handled, "worker finished");
            drop(claim);
        }
    }
}

/// Names of queues that currently have a worker.
#[derive(Clone, Default)]
struct ActiveQueues(Arc<Mutex<HashSet<String>>>);

impl ActiveQueues {
    /// Marks `name` as taken, unless a worker already holds it.
    fn claim(&self, name: &str) -> Option<QueueClaim> {
        let mut set = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        set.insert(name.to_string()).then(|| QueueClaim {
            name: name.to_string(),
            active: self.clone(),
        })
    }
}

/// Releases its queue when dropped, including when the worker panics.
struct QueueClaim {
    name: String,
    active: ActiveQueues,
}

impl Drop for QueueClaim {
    fn drop(&mut self) {
        self.active
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}
