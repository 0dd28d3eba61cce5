//! In-Memory Broker
//!
//! Same settle semantics as the Redis broker, kept in process. Used by tests
//! and local runs without Redis. Not durable across restarts.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use kernel::id::TaskId;

use crate::domain::broker::TaskBroker;
use crate::domain::envelope::{Delivery, TaskEnvelope};
use crate::domain::queue::QueueClass;
use crate::error::{QueueError, QueueResult};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    active: Vec<String>,
    scheduled: Vec<(i64, String)>,
}

#[derive(Default)]
struct State {
    queues: HashMap<QueueClass, QueueState>,
    archived: Vec<TaskEnvelope>,
    /// Raw entries that never decoded into an envelope
    buried: Vec<String>,
    acked: Vec<TaskEnvelope>,
    deliveries: HashMap<TaskId, u32>,
}

impl State {
    fn queue(&mut self, queue: QueueClass) -> &mut QueueState {
        self.queues.entry(queue).or_default()
    }
}

#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every broker call fail with `BrokerUnavailable` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn pending_len(&self, queue: QueueClass) -> usize {
        self.with_state(|s| s.queue(queue).pending.len())
    }

    pub fn active_len(&self, queue: QueueClass) -> usize {
        self.with_state(|s| s.queue(queue).active.len())
    }

    pub fn scheduled_len(&self, queue: QueueClass) -> usize {
        self.with_state(|s| s.queue(queue).scheduled.len())
    }

    /// Envelopes acknowledged as successful, in completion order
    pub fn acked(&self) -> Vec<TaskEnvelope> {
        self.with_state(|s| s.acked.clone())
    }

    /// Envelopes given up on, in archive order
    pub fn archived(&self) -> Vec<TaskEnvelope> {
        self.with_state(|s| s.archived.clone())
    }

    /// Undecodable entries set aside by `dequeue`
    pub fn buried(&self) -> Vec<String> {
        self.with_state(|s| s.buried.clone())
    }

    /// How many times a task has been handed to a worker
    pub fn deliveries_of(&self, id: TaskId) -> u32 {
        self.with_state(|s| s.deliveries.get(&id).copied().unwrap_or(0))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    fn check_available(&self) -> QueueResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::BrokerUnavailable(
                "memory broker marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn remove_active(queue: &mut QueueState, raw: &str) -> bool {
    match queue.active.iter().position(|entry| entry == raw) {
        Some(index) => {
            queue.active.remove(index);
            true
        }
        None => false,
    }
}

impl TaskBroker for MemoryBroker {
    async fn ping(&self) -> QueueResult<()> {
        self.check_available()
    }

    async fn enqueue(&self, envelope: &TaskEnvelope) -> QueueResult<()> {
        self.check_available()?;
        let raw = envelope.encode()?;
        self.with_state(|s| s.queue(envelope.queue()).pending.push_back(raw));
        Ok(())
    }

    async fn schedule(&self, envelope: &TaskEnvelope, ready_at: DateTime<Utc>) -> QueueResult<()> {
        self.check_available()?;
        let raw = envelope.encode()?;
        self.with_state(|s| {
            s.queue(envelope.queue())
                .scheduled
                .push((ready_at.timestamp_millis(), raw))
        });
        Ok(())
    }

    async fn dequeue(&self, queue: QueueClass) -> QueueResult<Option<Delivery>> {
        self.check_available()?;
        self.with_state(|s| loop {
            let Some(raw) = s.queue(queue).pending.pop_front() else {
                return Ok(None);
            };

            match TaskEnvelope::decode(&raw) {
                Ok(envelope) => {
                    s.queue(queue).active.push(raw.clone());
                    *s.deliveries.entry(envelope.id()).or_default() += 1;
                    return Ok(Some(Delivery::new(envelope, raw)));
                }
                Err(e) => {
                    tracing::error!(
                        queue = %queue,
                        error = %e,
                        entry_len = raw.len(),
                        "Undecodable task entry archived"
                    );
                    s.buried.push(raw);
                }
            }
        })
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.check_available()?;
        self.with_state(|s| {
            if remove_active(s.queue(delivery.envelope().queue()), delivery.raw()) {
                s.acked.push(delivery.envelope().clone());
            }
        });
        Ok(())
    }

    async fn retry(
        &self,
        delivery: &Delivery,
        updated: &TaskEnvelope,
        ready_at: DateTime<Utc>,
    ) -> QueueResult<()> {
        self.check_available()?;
        let raw = updated.encode()?;
        self.with_state(|s| {
            let queue = s.queue(delivery.envelope().queue());
            if remove_active(queue, delivery.raw()) {
                queue.scheduled.push((ready_at.timestamp_millis(), raw));
            }
        });
        Ok(())
    }

    async fn archive(&self, delivery: &Delivery, updated: &TaskEnvelope) -> QueueResult<()> {
        self.check_available()?;
        self.with_state(|s| {
            remove_active(s.queue(delivery.envelope().queue()), delivery.raw());
            s.archived.push(updated.clone());
        });
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> QueueResult<bool> {
        self.check_available()?;
        Ok(self.with_state(|s| {
            let queue = s.queue(delivery.envelope().queue());
            let moved = remove_active(queue, delivery.raw());
            if moved {
                queue.pending.push_front(delivery.raw().to_string());
            }
            moved
        }))
    }

    async fn forward_due(&self, queue: QueueClass, now: DateTime<Utc>) -> QueueResult<usize> {
        self.check_available()?;
        let now_ms = now.timestamp_millis();
        Ok(self.with_state(|s| {
            let queue = s.queue(queue);
            let (mut due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut queue.scheduled)
                .into_iter()
                .partition(|(ready_ms, _)| *ready_ms <= now_ms);
            queue.scheduled = later;
            due.sort_by_key(|(ready_ms, _)| *ready_ms);
            let moved = due.len();
            queue.pending.extend(due.into_iter().map(|(_, raw)| raw));
            moved
        }))
    }

    async fn recover_orphans(&self, queue: QueueClass) -> QueueResult<usize> {
        self.check_available()?;
        Ok(self.with_state(|s| {
            let queue = s.queue(queue);
            let orphans = std::mem::take(&mut queue.active);
            let moved = orphans.len();
            for raw in orphans.into_iter().rev() {
                queue.pending.push_front(raw);
            }
            moved
        }))
    }
}
