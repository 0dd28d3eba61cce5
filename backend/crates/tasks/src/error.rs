//! Task Error Types
//!
//! `QueueError` covers the broker side (enqueue, dequeue, settle).
//! `TaskError` is what a handler run produces and decides retry policy.

use std::time::Duration;

use thiserror::Error;

use crate::domain::queue::QueueClass;

/// Broker-side result type alias
pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Connection could not be established or a broker command failed
    #[error("Task broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// A queue class with zero workers would never drain
    #[error("Queue {0} has no workers configured")]
    NoWorkers(QueueClass),

    /// Envelope could not be encoded for the broker
    #[error("Task serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::BrokerUnavailable(err.to_string())
    }
}

/// Outcome of a failed handler run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// No handler registered for the envelope's kind
    #[error("No handler registered for task kind {0}")]
    UnknownKind(String),

    /// Payload does not decode into the handler's expected shape
    #[error("Malformed task payload: {0}")]
    MalformedPayload(String),

    /// Handler-declared failure that would recur on every attempt
    #[error("Task failed permanently: {0}")]
    SkipRetry(String),

    /// Presumed recoverable (network blip, downstream outage)
    #[error("Task failed: {0}")]
    Transient(String),

    #[error("Task timed out after {0:?}")]
    TimedOut(Duration),
}

impl TaskError {
    pub fn transient(err: impl std::fmt::Display) -> Self {
        TaskError::Transient(err.to_string())
    }

    pub fn skip_retry(err: impl std::fmt::Display) -> Self {
        TaskError::SkipRetry(err.to_string())
    }

    /// Permanent failures are archived on first occurrence
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TaskError::UnknownKind(_) | TaskError::MalformedPayload(_) | TaskError::SkipRetry(_)
        )
    }
}
