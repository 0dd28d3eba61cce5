//! Task Envelope
//!
//! The unit stored in the broker. Once enqueued, only the retry counter and
//! the last error change, and only through [`TaskEnvelope::failed`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use kernel::id::TaskId;
use serde::{Deserialize, Serialize};

use crate::domain::queue::QueueClass;
use crate::error::QueueResult;

/// Retry budget applied when the caller does not pick one
pub const DEFAULT_MAX_RETRY: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    id: TaskId,
    kind: String,
    #[serde(with = "payload_base64")]
    payload: Vec<u8>,
    queue: QueueClass,
    max_retry: u32,
    #[serde(default)]
    retried: u32,
    enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

impl TaskEnvelope {
    pub fn new(
        kind: impl Into<String>,
        payload: Vec<u8>,
        queue: QueueClass,
        max_retry: u32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            kind: kind.into(),
            payload,
            queue,
            max_retry,
            retried: 0,
            enqueued_at,
            last_error: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn queue(&self) -> QueueClass {
        self.queue
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Redeliveries consumed so far
    pub fn retried(&self) -> u32 {
        self.retried
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True once another transient failure must abandon the task
    pub fn retries_exhausted(&self) -> bool {
        self.retried >= self.max_retry
    }

    /// Copy carrying one more consumed retry and the failure reason
    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            retried: self.retried.saturating_add(1),
            last_error: Some(error.into()),
            ..self.clone()
        }
    }

    /// Copy carrying the failure reason, retry counter untouched
    pub fn with_last_error(&self, error: impl Into<String>) -> Self {
        Self {
            last_error: Some(error.into()),
            ..self.clone()
        }
    }

    /// Broker wire form
    pub fn encode(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> QueueResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A dequeued envelope plus the exact broker entry it came from.
///
/// Settling (ack, retry, archive, requeue) addresses the entry by `raw`, so
/// the envelope must never be re-encoded for that purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    envelope: TaskEnvelope,
    raw: String,
}

impl Delivery {
    pub fn new(envelope: TaskEnvelope, raw: String) -> Self {
        Self { envelope, raw }
    }

    pub fn envelope(&self) -> &TaskEnvelope {
        &self.envelope
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Per-enqueue options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub queue: QueueClass,
    pub max_retry: u32,
    /// Delay before the task becomes visible to workers
    pub process_in: Option<Duration>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            queue: QueueClass::Default,
            max_retry: DEFAULT_MAX_RETRY,
            process_in: None,
        }
    }
}

impl EnqueueOptions {
    pub fn queue(mut self, queue: QueueClass) -> Self {
        self.queue = queue;
        self
    }

    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn process_in(mut self, delay: Duration) -> Self {
        self.process_in = Some(delay);
        self
    }
}

/// Returned once the broker has accepted a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueReceipt {
    pub id: TaskId,
    pub kind: String,
    pub queue: QueueClass,
    pub max_retry: u32,
    /// When workers may first pick the task up
    pub ready_at: DateTime<Utc>,
}

mod payload_base64 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&platform::crypto::to_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        platform::crypto::from_base64(&encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(max_retry: u32) -> TaskEnvelope {
        TaskEnvelope::new(
            "task:test",
            br#"{"email":"a@example.com"}"#.to_vec(),
            QueueClass::Critical,
            max_retry,
            Utc::now(),
        )
    }

    #[test]
    fn test_wire_form_carries_payload_as_base64() {
        let env = envelope(3);
        let raw = env.encode().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["queue"], "critical");
        assert_eq!(json["retried"], 0);
        assert!(json.get("last_error").is_none());
        assert_eq!(
            platform::crypto::from_base64(json["payload"].as_str().unwrap()).unwrap(),
            env.payload()
        );
        assert_eq!(TaskEnvelope::decode(&raw).unwrap(), env);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(TaskEnvelope::decode("not json").is_err());
        assert!(TaskEnvelope::decode(r#"{"id":"x"}"#).is_err());
    }

    #[test]
    fn test_failed_consumes_budget() {
        let env = envelope(2);
        assert!(!env.retries_exhausted());

        let once = env.failed("smtp timeout");
        assert_eq!(once.id(), env.id());
        assert_eq!(once.retried(), 1);
        assert_eq!(once.last_error(), Some("smtp timeout"));
        assert!(!once.retries_exhausted());

        assert!(once.failed("again").retries_exhausted());
        assert!(envelope(0).retries_exhausted());
    }

    #[test]
    fn test_enqueue_options_builder() {
        let opts = EnqueueOptions::default()
            .queue(QueueClass::Critical)
            .max_retry(10)
            .process_in(Duration::from_secs(10));
        assert_eq!(opts.queue, QueueClass::Critical);
        assert_eq!(opts.max_retry, 10);
        assert_eq!(opts.process_in, Some(Duration::from_secs(10)));
        assert_eq!(EnqueueOptions::default().max_retry, DEFAULT_MAX_RETRY);
    }
}
