//! Task Processor
//!
//! One fetch loop per queue class, each bounded by its own semaphore so a
//! `default` backlog never takes worker slots from `critical`. A forwarder
//! promotes scheduled and retrying tasks.
//!
//! ## Shutdown
//! Cancelling the token passed to [`TaskProcessor::serve`] stops the fetch
//! loops. In-flight runs get `drain_timeout` to finish; whatever is still
//! running after that is aborted and put back at the head of its queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::config::ProcessorConfig;
use crate::application::mux::{TaskContext, TaskMux};
use crate::domain::broker::TaskBroker;
use crate::domain::envelope::Delivery;
use crate::domain::queue::QueueClass;
use crate::error::{QueueError, QueueResult, TaskError};

type InFlight = HashMap<Id, Delivery>;

pub struct TaskProcessor<B> {
    broker: Arc<B>,
    mux: Arc<TaskMux>,
    config: Arc<ProcessorConfig>,
    broker_failures: Arc<AtomicU32>,
}

impl<B> Clone for TaskProcessor<B> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            mux: self.mux.clone(),
            config: self.config.clone(),
            broker_failures: self.broker_failures.clone(),
        }
    }
}

impl<B> TaskProcessor<B>
where
    B: TaskBroker + Send + Sync + 'static,
{
    pub fn new(broker: Arc<B>, mux: TaskMux, config: ProcessorConfig) -> Self {
        Self {
            broker,
            mux: Arc::new(mux),
            config: Arc::new(config),
            broker_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Boot checks: every queue class has workers, the broker answers, and
    /// deliveries orphaned by a previous run are put back in their queues.
    /// Assumes a single processor instance.
    pub async fn start(&self) -> QueueResult<()> {
        self.check_workers()?;
        self.broker.ping().await?;

        for queue in QueueClass::ALL {
            let recovered = self.broker.recover_orphans(queue).await?;
            if recovered > 0 {
                warn!(queue = %queue, recovered, "Requeued orphaned tasks");
            }
        }

        info!(
            kinds = ?self.mux.kinds(),
            critical_concurrency = self.config.critical_concurrency,
            default_concurrency = self.config.default_concurrency,
            "Task processor started"
        );
        Ok(())
    }

    /// Serve until `shutdown` is cancelled or the broker stays unreachable.
    ///
    /// Returns only after every in-flight run finished or was requeued.
    pub async fn serve(&self, shutdown: CancellationToken) -> QueueResult<()> {
        self.broker_failures.store(0, Ordering::SeqCst);
        let stop = shutdown.child_token();

        let mut loops = JoinSet::new();
        self.check_workers()?;
        for queue in QueueClass::ALL {
            loops.spawn(self.clone().fetch_loop(queue, stop.clone()));
        }
        loops.spawn(self.clone().forward_loop(stop.clone()));

        let mut result = Ok(());
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    stop.cancel();
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(e) if e.is_panic() => {
                    stop.cancel();
                    std::panic::resume_unwind(e.into_panic());
                }
                Err(_) => {}
            }
        }

        info!("Task processor stopped");
        result
    }

    fn check_workers(&self) -> QueueResult<()> {
        match QueueClass::ALL
            .into_iter()
            .find(|queue| self.config.concurrency(*queue) == 0)
        {
            Some(queue) => Err(QueueError::NoWorkers(queue)),
            None => Ok(()),
        }
    }

    async fn fetch_loop(self, queue: QueueClass, stop: CancellationToken) -> QueueResult<()> {
        let concurrency = self.config.concurrency(queue);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut running = JoinSet::new();
        let mut in_flight = InFlight::new();

        debug!(queue = %queue, concurrency, "Fetch loop started");

        let outcome = loop {
            self.reap(&mut running, &mut in_flight).await;

            let permit = tokio::select! {
                _ = stop.cancelled() => break Ok(()),
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            match self.broker.dequeue(queue).await {
                Ok(Some(delivery)) => {
                    self.broker_failures.store(0, Ordering::SeqCst);
                    let handle = running.spawn(self.clone().run(delivery.clone(), permit));
                    in_flight.insert(handle.id(), delivery);
                }
                Ok(None) => {
                    drop(permit);
                    if self.idle(&stop).await {
                        break Ok(());
                    }
                }
                Err(e) => {
                    drop(permit);
                    if let Err(fatal) = self.record_broker_failure(queue.as_str(), e) {
                        stop.cancel();
                        break Err(fatal);
                    }
                    if self.idle(&stop).await {
                        break Ok(());
                    }
                }
            }
        };

        self.drain(queue, running, in_flight).await;
        outcome
    }

    async fn forward_loop(self, stop: CancellationToken) -> QueueResult<()> {
        let period = self.config.forward_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            for queue in QueueClass::ALL {
                match self.broker.forward_due(queue, Utc::now()).await {
                    Ok(moved) => {
                        self.broker_failures.store(0, Ordering::SeqCst);
                        if moved > 0 {
                            debug!(queue = %queue, moved, "Promoted scheduled tasks");
                        }
                    }
                    Err(e) => {
                        if let Err(fatal) = self.record_broker_failure("forwarder", e) {
                            stop.cancel();
                            return Err(fatal);
                        }
                    }
                }
            }
        }
    }

    /// One handler run, then settle the delivery. Holds the queue's permit.
    async fn run(self, delivery: Delivery, _permit: OwnedSemaphorePermit) {
        let envelope = delivery.envelope();
        let ctx = TaskContext::from(envelope);
        let started = Instant::now();

        let dispatch = self.mux.dispatch(envelope.kind(), envelope.payload(), ctx);
        let outcome = match tokio::time::timeout(self.config.task_timeout, dispatch).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::TimedOut(self.config.task_timeout)),
        };

        debug!(
            task_id = %envelope.id(),
            kind = %envelope.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Task run finished"
        );

        self.settle(&delivery, outcome).await;
    }

    /// Apply retry policy to a finished run
    async fn settle(&self, delivery: &Delivery, outcome: Result<(), TaskError>) {
        let envelope = delivery.envelope();

        let settled = match outcome {
            Ok(()) => {
                info!(
                    task_id = %envelope.id(),
                    kind = %envelope.kind(),
                    queue = %envelope.queue(),
                    retried = envelope.retried(),
                    "Processed task"
                );
                self.broker.ack(delivery).await
            }
            Err(e) if e.is_permanent() => {
                warn!(
                    task_id = %envelope.id(),
                    kind = %envelope.kind(),
                    queue = %envelope.queue(),
                    payload_len = envelope.payload().len(),
                    error = %e,
                    "Task failed permanently, archived without retry"
                );
                self.broker
                    .archive(delivery, &envelope.with_last_error(e.to_string()))
                    .await
            }
            Err(e) if envelope.retries_exhausted() => {
                error!(
                    task_id = %envelope.id(),
                    kind = %envelope.kind(),
                    queue = %envelope.queue(),
                    retried = envelope.retried(),
                    max_retry = envelope.max_retry(),
                    error = %e,
                    "Task retries exhausted, abandoned"
                );
                self.broker
                    .archive(delivery, &envelope.with_last_error(e.to_string()))
                    .await
            }
            Err(e) => {
                let next = envelope.failed(e.to_string());
                let delay = self.config.retry_backoff.delay(next.retried());
                let ready_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());

                warn!(
                    task_id = %envelope.id(),
                    kind = %envelope.kind(),
                    queue = %envelope.queue(),
                    retried = next.retried(),
                    max_retry = next.max_retry(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Task failed, retry scheduled"
                );
                self.broker.retry(delivery, &next, ready_at).await
            }
        };

        if let Err(e) = settled {
            error!(
                task_id = %envelope.id(),
                error = %e,
                "Failed to settle task, it stays active until recovered"
            );
        }
    }

    /// Collect finished runs without waiting
    async fn reap(&self, running: &mut JoinSet<()>, in_flight: &mut InFlight) {
        while let Some(joined) = running.try_join_next_with_id() {
            self.finish(joined, in_flight).await;
        }
    }

    async fn finish(&self, joined: Result<(Id, ()), JoinError>, in_flight: &mut InFlight) {
        match joined {
            Ok((id, ())) => {
                in_flight.remove(&id);
            }
            Err(e) => {
                let Some(delivery) = in_flight.remove(&e.id()) else {
                    return;
                };
                if e.is_panic() {
                    error!(task_id = %delivery.envelope().id(), "Task handler panicked");
                    self.settle(&delivery, Err(TaskError::transient("handler panicked")))
                        .await;
                } else {
                    in_flight.insert(e.id(), delivery);
                }
            }
        }
    }

    async fn drain(&self, queue: QueueClass, mut running: JoinSet<()>, mut in_flight: InFlight) {
        if running.is_empty() {
            return;
        }

        info!(queue = %queue, in_flight = running.len(), "Draining in-flight tasks");

        let deadline = tokio::time::sleep(self.config.drain_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = running.join_next_with_id() => match joined {
                    Some(joined) => self.finish(joined, &mut in_flight).await,
                    None => {
                        info!(queue = %queue, "Drained in-flight tasks");
                        return;
                    }
                },
                _ = &mut deadline => break,
            }
        }

        warn!(
            queue = %queue,
            remaining = running.len(),
            "Drain timeout elapsed, requeueing unfinished tasks"
        );

        running.abort_all();
        while let Some(joined) = running.join_next_with_id().await {
            self.finish(joined, &mut in_flight).await;
        }

        for delivery in in_flight.into_values() {
            let envelope = delivery.envelope();
            match self.broker.requeue(&delivery).await {
                Ok(true) => info!(
                    task_id = %envelope.id(),
                    kind = %envelope.kind(),
                    "Requeued unfinished task"
                ),
                Ok(false) => {}
                Err(e) => error!(
                    task_id = %envelope.id(),
                    error = %e,
                    "Failed to requeue unfinished task, it stays active until recovered"
                ),
            }
        }
    }

    /// Sleep one poll interval; true if stopped meanwhile
    async fn idle(&self, stop: &CancellationToken) -> bool {
        tokio::select! {
            _ = stop.cancelled() => true,
            _ = tokio::time::sleep(self.config.poll_interval) => false,
        }
    }

    fn record_broker_failure(&self, source: &str, err: QueueError) -> QueueResult<()> {
        let failures = self.broker_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures > self.config.max_broker_failures {
            error!(source, failures, error = %err, "Task broker unreachable, stopping processor");
            return Err(err);
        }
        warn!(source, failures, error = %err, "Task broker call failed");
        Ok(())
    }
}
