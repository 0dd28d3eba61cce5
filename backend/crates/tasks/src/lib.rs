//! Tasks (Background Work) Backend Module
//!
//! Layout follows the other backend crates:
//! - `domain/` - Task envelope, queue classes, broker capability
//! - `application/` - Distributor, processor, handler mux
//! - `handlers/` - Registered task handlers and their collaborators
//! - `infra/` - Redis and in-memory broker implementations
//!
//! ## Delivery model
//! - At-least-once: a delivery leaves the broker only on ack or archive
//! - Payload decode failures and unknown kinds are archived without retry
//! - Other handler failures are retried with backoff until `max_retry`

pub mod application;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod infra;


// Re-exports for convenience
pub use application::{
    ProcessorConfig, RetryBackoff, TaskContext, TaskDistributor, TaskHandler, TaskMux,
    TaskProcessor, TaskQueue,
};
pub use domain::{
    Delivery, EnqueueOptions, EnqueueReceipt, QueueClass, TaskBroker, TaskEnvelope,
};
pub use error::{QueueError, QueueResult, TaskError};
pub use infra::{memory::MemoryBroker, redis::RedisBroker};
