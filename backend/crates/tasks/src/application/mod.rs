//! Application Layer
//!
//! Producer and consumer sides of the queue.

pub mod config;
pub mod distributor;
pub mod mux;
pub mod processor;

// Re-exports
pub use config::{ProcessorConfig, RetryBackoff};
pub use distributor::{LocalTaskQueue, TaskDistributor, TaskQueue};
pub use mux::{TaskContext, TaskHandler, TaskMux};
pub use processor::TaskProcessor;
