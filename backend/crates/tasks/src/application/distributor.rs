//! Task Distributor
//!
//! Publishes envelopes to the broker and returns once the broker accepted
//! them. Never waits for the task itself.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::domain::broker::TaskBroker;
use crate::domain::envelope::{EnqueueOptions, EnqueueReceipt, TaskEnvelope};
use crate::error::QueueResult;

/// Enqueue capability handed to request-path code
#[trait_variant::make(TaskQueue: Send)]
pub trait LocalTaskQueue {
    async fn enqueue(
        &self,
        kind: &str,
        payload: Vec<u8>,
        options: EnqueueOptions,
    ) -> QueueResult<EnqueueReceipt>;
}

pub struct TaskDistributor<B> {
    broker: Arc<B>,
}

impl<B> Clone for TaskDistributor<B> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
        }
    }
}

impl<B> TaskDistributor<B>
where
    B: TaskBroker + Send + Sync,
{
    pub fn new(broker: Arc<B>) -> Self {
        Self { broker }
    }

    /// JSON-encode `payload` and enqueue it
    pub async fn enqueue_json<P>(
        &self,
        kind: &str,
        payload: &P,
        options: EnqueueOptions,
    ) -> QueueResult<EnqueueReceipt>
    where
        P: Serialize + Sync,
    {
        let payload = serde_json::to_vec(payload)?;
        TaskQueue::enqueue(self, kind, payload, options).await
    }
}

impl<B> TaskQueue for TaskDistributor<B>
where
    B: TaskBroker + Send + Sync,
{
    async fn enqueue(
        &self,
        kind: &str,
        payload: Vec<u8>,
        options: EnqueueOptions,
    ) -> QueueResult<EnqueueReceipt> {
        let now = Utc::now();
        let payload_len = payload.len();
        let envelope = TaskEnvelope::new(kind, payload, options.queue, options.max_retry, now);

        let ready_at = match options.process_in {
            Some(delay) if !delay.is_zero() => {
                let ready_at =
                    now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                self.broker.schedule(&envelope, ready_at).await?;
                ready_at
            }
            _ => {
                self.broker.enqueue(&envelope).await?;
                now
            }
        };

        tracing::info!(
            task_id = %envelope.id(),
            kind = %envelope.kind(),
            queue = %envelope.queue(),
            max_retry = envelope.max_retry(),
            payload_len,
            ready_at = %ready_at,
            "Enqueued task"
        );

        Ok(EnqueueReceipt {
            id: envelope.id(),
            kind: envelope.kind().to_string(),
            queue: envelope.queue(),
            max_retry: envelope.max_retry(),
            ready_at,
        })
    }
}
