//! Broker Capability
//!
//! Durable storage for task envelopes. Implementation is in infrastructure
//! layer. Every dequeued entry stays in an active set until it is settled
//! with `ack`, `retry`, `archive` or `requeue`.

use chrono::{DateTime, Utc};

use crate::domain::envelope::{Delivery, TaskEnvelope};
use crate::domain::queue::QueueClass;
use crate::error::QueueResult;

#[trait_variant::make(TaskBroker: Send)]
pub trait LocalTaskBroker {
    /// Round-trip check used at boot
    async fn ping(&self) -> QueueResult<()>;

    /// Make the envelope immediately visible to workers
    async fn enqueue(&self, envelope: &TaskEnvelope) -> QueueResult<()>;

    /// Make the envelope visible at `ready_at`
    async fn schedule(&self, envelope: &TaskEnvelope, ready_at: DateTime<Utc>) -> QueueResult<()>;

    /// Atomically move the next pending entry into the active set
    async fn dequeue(&self, queue: QueueClass) -> QueueResult<Option<Delivery>>;

    /// Drop a delivery after success
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Replace a delivery with `updated`, visible again at `ready_at`
    async fn retry(
        &self,
        delivery: &Delivery,
        updated: &TaskEnvelope,
        ready_at: DateTime<Utc>,
    ) -> QueueResult<()>;

    /// Move a delivery to the archive for operator inspection
    async fn archive(&self, delivery: &Delivery, updated: &TaskEnvelope) -> QueueResult<()>;

    /// Put an unfinished delivery back at the head of its queue.
    /// Returns `false` when the delivery was already settled.
    async fn requeue(&self, delivery: &Delivery) -> QueueResult<bool>;

    /// Promote scheduled entries whose time has come; returns how many moved
    async fn forward_due(&self, queue: QueueClass, now: DateTime<Utc>) -> QueueResult<usize>;

    /// Requeue every active entry left behind by a previous run
    async fn recover_orphans(&self, queue: QueueClass) -> QueueResult<usize>;
}
