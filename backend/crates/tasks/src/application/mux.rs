//! Handler Mux
//!
//! Routes envelopes to handlers by exact `kind` match. Payload decoding
//! happens here, before the handler runs, so a shape mismatch is always
//! reported as [`TaskError::MalformedPayload`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use kernel::id::TaskId;
use serde::de::DeserializeOwned;

use crate::domain::envelope::TaskEnvelope;
use crate::domain::queue::QueueClass;
use crate::error::TaskError;

/// Metadata about the run, for logging inside handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub kind: String,
    pub queue: QueueClass,
    pub retried: u32,
    pub max_retry: u32,
}

impl From<&TaskEnvelope> for TaskContext {
    fn from(envelope: &TaskEnvelope) -> Self {
        Self {
            task_id: envelope.id(),
            kind: envelope.kind().to_string(),
            queue: envelope.queue(),
            retried: envelope.retried(),
            max_retry: envelope.max_retry(),
        }
    }
}

/// A typed task handler
pub trait TaskHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;

    /// Kind string this handler is registered under
    const KIND: &'static str;

    fn handle(
        &self,
        payload: Self::Payload,
        ctx: TaskContext,
    ) -> impl Future<Output = Result<(), TaskError>> + Send;
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;
type ErasedHandler = Arc<dyn Fn(&[u8], TaskContext) -> HandlerFuture + Send + Sync>;

#[derive(Default, Clone)]
pub struct TaskMux {
    routes: HashMap<&'static str, ErasedHandler>,
}

impl TaskMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `H::KIND`. A later registration for the same
    /// kind replaces the earlier one.
    pub fn handle<H: TaskHandler>(mut self, handler: H) -> Self {
        let handler = Arc::new(handler);
        let erased: ErasedHandler =
            Arc::new(move |payload: &[u8], ctx: TaskContext| -> HandlerFuture {
                let decoded = serde_json::from_slice::<H::Payload>(payload);
                let handler = handler.clone();
                Box::pin(async move {
                    let payload =
                        decoded.map_err(|e| TaskError::MalformedPayload(e.to_string()))?;
                    handler.handle(payload, ctx).await
                })
            });

        if self.routes.insert(H::KIND, erased).is_some() {
            tracing::warn!(kind = H::KIND, "Task handler replaced");
        }
        self
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.routes.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Run the handler registered for `kind`
    pub async fn dispatch(
        &self,
        kind: &str,
        payload: &[u8],
        ctx: TaskContext,
    ) -> Result<(), TaskError> {
        let handler = self
            .routes
            .get(kind)
            .ok_or_else(|| TaskError::UnknownKind(kind.to_string()))?;
        handler(payload, ctx).await
    }
}
