//! Domain Layer
//!
//! Task envelope, queue classes, and the broker capability.

pub mod broker;
pub mod envelope;
pub mod queue;

// Re-exports
pub use broker::{LocalTaskBroker, TaskBroker};
pub use envelope::{Delivery, EnqueueOptions, EnqueueReceipt, TaskEnvelope};
pub use queue::QueueClass;
