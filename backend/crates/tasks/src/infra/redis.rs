//! Redis Broker Implementation
//!
//! Key layout under a namespace `ns`:
//! - `{ns}:{queue}:pending`   list, producers push left, workers move from the right
//! - `{ns}:{queue}:active`    list of entries currently being worked on
//! - `{ns}:{queue}:scheduled` sorted set scored by ready time (unix ms)
//! - `{ns}:archived`          capped list of dead entries
//!
//! Every multi-key move runs as a single command or Lua script so an entry is
//! never in two places or lost between them.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use crate::domain::broker::TaskBroker;
use crate::domain::envelope::{Delivery, TaskEnvelope};
use crate::domain::queue::QueueClass;
use crate::error::{QueueError, QueueResult};

pub const DEFAULT_NAMESPACE: &str = "tasks";

/// Archived entries kept for inspection
const ARCHIVE_CAPACITY: isize = 10_000;

/// Upper bound on entries promoted per forward call
const FORWARD_BATCH: usize = 100;

const RETRY_SCRIPT: &str = r#"
if redis.call('LREM', KEYS[1], 1, ARGV[1]) > 0 then
    redis.call('ZADD', KEYS[2], ARGV[3], ARGV[2])
    return 1
end
return 0
"#;

const ARCHIVE_SCRIPT: &str = r#"
redis.call('LREM', KEYS[1], 1, ARGV[1])
redis.call('LPUSH', KEYS[2], ARGV[2])
redis.call('LTRIM', KEYS[2], 0, tonumber(ARGV[3]) - 1)
return 1
"#;

const REQUEUE_SCRIPT: &str = r#"
if redis.call('LREM', KEYS[1], 1, ARGV[1]) > 0 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

const FORWARD_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
for _, entry in ipairs(due) do
    redis.call('ZREM', KEYS[1], entry)
    redis.call('LPUSH', KEYS[2], entry)
end
return #due
"#;

const RECOVER_SCRIPT: &str = r#"
local moved = 0
while redis.call('LMOVE', KEYS[1], KEYS[2], 'LEFT', 'RIGHT') do
    moved = moved + 1
end
return moved
"#;

/// Redis-backed broker.
///
/// The connection manager multiplexes one connection and reconnects on its
/// own; producer and consumer roles each get their own instance.
#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisBroker {
    /// Connect to `host:port` (or a full `redis://` URL)
    pub async fn connect(address: &str) -> QueueResult<Self> {
        Self::connect_with_namespace(address, DEFAULT_NAMESPACE).await
    }

    pub async fn connect_with_namespace(address: &str, namespace: &str) -> QueueResult<Self> {
        let url = if address.contains("://") {
            address.to_string()
        } else {
            format!("redis://{address}")
        };

        let client = Client::open(url.as_str()).map_err(|err| {
            QueueError::BrokerUnavailable(format!("invalid broker address {address}: {err}"))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|err| {
            QueueError::BrokerUnavailable(format!("unable to connect to {address}: {err}"))
        })?;

        tracing::info!(address = %address, namespace = %namespace, "Connected to task broker");

        Ok(Self {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn pending_key(&self, queue: QueueClass) -> String {
        format!("{}:{}:pending", self.namespace, queue)
    }

    fn active_key(&self, queue: QueueClass) -> String {
        format!("{}:{}:active", self.namespace, queue)
    }

    fn scheduled_key(&self, queue: QueueClass) -> String {
        format!("{}:{}:scheduled", self.namespace, queue)
    }

    fn archived_key(&self) -> String {
        format!("{}:archived", self.namespace)
    }

    /// Pull an undecodable entry out of the active list so it is not retried forever
    async fn bury(&self, queue: QueueClass, raw: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        Script::new(ARCHIVE_SCRIPT)
            .key(self.active_key(queue))
            .key(self.archived_key())
            .arg(raw)
            .arg(raw)
            .arg(ARCHIVE_CAPACITY)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }
}

impl TaskBroker for RedisBroker {
    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn enqueue(&self, envelope: &TaskEnvelope) -> QueueResult<()> {
        let raw = envelope.encode()?;
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(self.pending_key(envelope.queue()))
            .arg(raw)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn schedule(&self, envelope: &TaskEnvelope, ready_at: DateTime<Utc>) -> QueueResult<()> {
        let raw = envelope.encode()?;
        let mut conn = self.conn.clone();
        redis::cmd("ZADD")
            .arg(self.scheduled_key(envelope.queue()))
            .arg(ready_at.timestamp_millis())
            .arg(raw)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn dequeue(&self, queue: QueueClass) -> QueueResult<Option<Delivery>> {
        let mut conn = self.conn.clone();
        loop {
            let raw = redis::cmd("LMOVE")
                .arg(self.pending_key(queue))
                .arg(self.active_key(queue))
                .arg("RIGHT")
                .arg("LEFT")
                .query_async::<Option<String>>(&mut conn)
                .await?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            match TaskEnvelope::decode(&raw) {
                Ok(envelope) => return Ok(Some(Delivery::new(envelope, raw))),
                Err(e) => {
                    tracing::error!(
                        queue = %queue,
                        error = %e,
                        entry_len = raw.len(),
                        "Undecodable task entry archived"
                    );
                    self.bury(queue, &raw).await?;
                }
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("LREM")
            .arg(self.active_key(delivery.envelope().queue()))
            .arg(1)
            .arg(delivery.raw())
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn retry(
        &self,
        delivery: &Delivery,
        updated: &TaskEnvelope,
        ready_at: DateTime<Utc>,
    ) -> QueueResult<()> {
        let queue = delivery.envelope().queue();
        let mut conn = self.conn.clone();
        Script::new(RETRY_SCRIPT)
            .key(self.active_key(queue))
            .key(self.scheduled_key(queue))
            .arg(delivery.raw())
            .arg(updated.encode()?)
            .arg(ready_at.timestamp_millis())
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn archive(&self, delivery: &Delivery, updated: &TaskEnvelope) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        Script::new(ARCHIVE_SCRIPT)
            .key(self.active_key(delivery.envelope().queue()))
            .key(self.archived_key())
            .arg(delivery.raw())
            .arg(updated.encode()?)
            .arg(ARCHIVE_CAPACITY)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> QueueResult<bool> {
        let queue = delivery.envelope().queue();
        let mut conn = self.conn.clone();
        let moved = Script::new(REQUEUE_SCRIPT)
            .key(self.active_key(queue))
            .key(self.pending_key(queue))
            .arg(delivery.raw())
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(moved > 0)
    }

    async fn forward_due(&self, queue: QueueClass, now: DateTime<Utc>) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let moved = Script::new(FORWARD_SCRIPT)
            .key(self.scheduled_key(queue))
            .key(self.pending_key(queue))
            .arg(now.timestamp_millis())
            .arg(FORWARD_BATCH)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(moved.max(0) as usize)
    }

    async fn recover_orphans(&self, queue: QueueClass) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let moved = Script::new(RECOVER_SCRIPT)
            .key(self.active_key(queue))
            .key(self.pending_key(queue))
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(moved.max(0) as usize)
    }
}
