//! Processor Configuration

use std::time::Duration;

use crate::domain::queue::QueueClass;

/// Exponential backoff between transient failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random (0.2 = +/-20%)
    pub jitter: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(10 * 60),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryBackoff {
    /// Retry immediately on the next forward pass
    pub fn immediate() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay before attempt `retried + 1`, with `retried >= 1`
    pub fn delay(&self, retried: u32) -> Duration {
        if self.initial.is_zero() {
            return Duration::ZERO;
        }

        let exponent = retried.saturating_sub(1).min(32) as i32;
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());

        let jitter_range = capped * self.jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;

        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// Task processor configuration
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Concurrent handler runs for `critical`
    pub critical_concurrency: usize,
    /// Concurrent handler runs for `default`
    pub default_concurrency: usize,
    /// Sleep after an empty poll
    pub poll_interval: Duration,
    /// How often scheduled and retrying tasks are promoted
    pub forward_interval: Duration,
    /// Per-run limit; exceeding it counts as a transient failure
    pub task_timeout: Duration,
    pub retry_backoff: RetryBackoff,
    /// Consecutive broker errors tolerated before `serve` gives up
    pub max_broker_failures: u32,
    /// How long shutdown waits for in-flight runs before requeueing them
    pub drain_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            critical_concurrency: 10,
            default_concurrency: 5,
            poll_interval: Duration::from_secs(1),
            forward_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(30 * 60),
            retry_backoff: RetryBackoff::default(),
            max_broker_failures: 10,
            drain_timeout: Duration::from_secs(8),
        }
    }
}

impl ProcessorConfig {
    /// Fast polling and no backoff, for local runs and tests
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            forward_interval: Duration::from_millis(10),
            task_timeout: Duration::from_secs(5),
            retry_backoff: RetryBackoff::immediate(),
            max_broker_failures: 3,
            drain_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    pub fn concurrency(&self, queue: QueueClass) -> usize {
        match queue {
            QueueClass::Critical => self.critical_concurrency,
            QueueClass::Default => self.default_concurrency,
        }
    }
}
