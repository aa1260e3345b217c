//! Delayed Job Queue (Q).
//!
//! Durable, at-least-once, deadline-ordered (not FIFO). Polled by a configurable worker
//! pool; jobs that keep failing carry an `attempts` counter and fall through to a
//! dead-letter table once it crosses the retry limit.

pub mod sqlx_impl;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::{OutboundCallJob, WaveJob};
use crate::error::QueueResult;

pub use sqlx_impl::SqlxJobQueue;

/// The two job shapes Q ever carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobPayload {
    Wave(WaveJob),
    Outbound(OutboundCallJob),
}

#[derive(Debug, Clone)]
pub struct DequeuedJob {
    pub key: String,
    pub payload: JobPayload,
    pub attempts: i32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedule `payload` for delivery at `now + delay`. If `key` already has a pending
    /// job, this is a no-op (keep earliest).
    async fn enqueue(&self, key: &str, payload: JobPayload, delay: Duration) -> QueueResult<()>;

    /// Remove every pending job whose key starts with `key_prefix`. Returns the count
    /// removed. Synchronous: once this returns, no worker will begin a cancelled job.
    async fn cancel(&self, key_prefix: &str) -> QueueResult<u64>;

    /// Atomically claim one ready job, if any, removing it from the pending table.
    async fn dequeue_ready(&self) -> QueueResult<Option<DequeuedJob>>;

    /// Re-enqueue a job that a handler failed to process, bumping its attempt counter, or
    /// move it to the dead-letter table if it has exhausted its retry budget.
    async fn retry_or_dead_letter(
        &self,
        key: &str,
        payload: &JobPayload,
        attempts: i32,
        error: &str,
    ) -> QueueResult<()>;
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: JobPayload) -> anyhow::Result<()>;
}

/// Runs `worker_count` concurrent poll loops against `queue`, each calling `handler` for
/// every job it dequeues.
pub async fn run_worker_pool(
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    worker_count: usize,
    poll_interval: Duration,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..worker_count)
        .map(|worker_id| {
            let queue = queue.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll_interval);
                loop {
                    ticker.tick().await;
                    match queue.dequeue_ready().await {
                        Ok(Some(job)) => {
                            info!(worker_id, key = %job.key, "dequeued job");
                            if let Err(e) = handler.handle(job.payload.clone()).await {
                                warn!(worker_id, key = %job.key, error = %e, "job handler failed");
                                if let Err(qe) = queue
                                    .retry_or_dead_letter(&job.key, &job.payload, job.attempts, &e.to_string())
                                    .await
                                {
                                    error!(worker_id, key = %job.key, error = %qe, "failed to requeue/dead-letter job");
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!(worker_id, error = %e, "queue poll failed");
                        }
                    }
                }
            })
        })
        .collect()
}
