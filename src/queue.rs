//! Durable multi-consumer-group stream client.
//!
//! The ledger streams are Redis streams; each app daemon reads them under
//! its own consumer group, so delivery is at-least-once per group and
//! ordered per stream. Acknowledgment after full handling is the crash
//! recovery mechanism: an entry left unacked when the process dies is
//! redelivered on restart.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::error::Result;

/// One unacknowledged entry handed to the processing loop.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Stream the entry was read from
    pub stream: String,
    /// Entry id, passed back verbatim on acknowledgment
    pub id: String,
    /// Field map; exactly one of `fact` / `act` carries the event payload
    pub fields: HashMap<String, String>,
}

/// Trait for the durable queue store.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Ensure `group` exists on `stream`, creating the stream alongside it
    /// if absent. Idempotent.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Block up to `block` for one never-delivered entry across `streams`.
    /// Returns `None` on timeout.
    async fn read_next(
        &self,
        group: &str,
        consumer: &str,
        streams: &[&str],
        block: Duration,
    ) -> Result<Option<StreamEntry>>;

    /// Mark an entry processed for the group.
    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str) -> Result<()>;

    /// Append a new entry with a single payload field, returning its id.
    async fn append(&self, stream: &str, field: &str, payload: &str) -> Result<String>;
}

/// Redis-backed queue client for production use.
pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    /// Create a queue client from a Redis connection URL.
    pub fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    /// Obtain an async multiplexed connection from the Redis client.
    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;

        // XGROUP CREATE ... MKSTREAM creates the stream and group atomically;
        // BUSYGROUP means a prior start already did, which is the idempotent
        // no-op the startup sequence relies on.
        match conn
            .xgroup_create_mkstream::<_, _, _, ()>(stream, group, "$")
            .await
        {
            Ok(()) => {
                tracing::info!(stream = %stream, group = %group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!(stream = %stream, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_next(
        &self,
        group: &str,
        consumer: &str,
        streams: &[&str],
        block: Duration,
    ) -> Result<Option<StreamEntry>> {
        let mut conn = self.get_conn().await?;

        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(1)
            .block(block.as_millis() as usize);
        let ids: Vec<&str> = streams.iter().map(|_| ">").collect();

        let reply: Option<StreamReadReply> =
            conn.xread_options(streams, &ids, &options).await?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for key in reply.keys {
            if let Some(entry) = key.ids.into_iter().next() {
                let fields = entry
                    .map
                    .iter()
                    .filter_map(|(field, value)| {
                        redis::from_redis_value::<String>(value)
                            .ok()
                            .map(|v| (field.clone(), v))
                    })
                    .collect();
                return Ok(Some(StreamEntry {
                    stream: key.key,
                    id: entry.id,
                    fields,
                }));
            }
        }

        Ok(None)
    }

    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        conn.xack::<_, _, _, ()>(stream, group, &[entry_id]).await?;
        tracing::debug!(stream = %stream, entry_id = %entry_id, "Entry acknowledged");
        Ok(())
    }

    async fn append(&self, stream: &str, field: &str, payload: &str) -> Result<String> {
        let mut conn = self.get_conn().await?;
        let id: String = conn.xadd(stream, "*", &[(field, payload)]).await?;
        tracing::debug!(stream = %stream, entry_id = %id, "Entry appended");
        Ok(id)
    }
}

/// In-memory queue client for tests and development.
///
/// Models the group semantics the loop depends on: entries are delivered at
/// most once per group until acknowledged, and every call is recorded so
/// tests can assert on the exact read/ack/append traffic.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    streams: HashMap<String, VecDeque<(String, HashMap<String, String>)>>,
    groups: HashSet<(String, String)>,
    /// Delivered but not yet acknowledged, per (stream, group)
    pending: HashMap<(String, String), Vec<String>>,
    next_id: u64,
    acks: Vec<(String, String, String)>,
    appends: Vec<(String, String, String)>,
}

impl InMemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed an entry carrying a single payload field.
    pub async fn push(&self, stream: &str, field: &str, payload: &str) -> String {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = format!("{}-0", state.next_id);
        let fields = HashMap::from([(field.to_string(), payload.to_string())]);
        state
            .streams
            .entry(stream.to_string())
            .or_default()
            .push_back((id.clone(), fields));
        id
    }

    /// Whether the group exists on the stream.
    pub async fn has_group(&self, stream: &str, group: &str) -> bool {
        self.state
            .lock()
            .await
            .groups
            .contains(&(stream.to_string(), group.to_string()))
    }

    /// All acknowledgments seen, as `(stream, group, entry_id)`.
    pub async fn acks(&self) -> Vec<(String, String, String)> {
        self.state.lock().await.acks.clone()
    }

    /// All appends seen, as `(stream, field, payload)`.
    pub async fn appends(&self) -> Vec<(String, String, String)> {
        self.state.lock().await.appends.clone()
    }

    /// Entry ids delivered to the group and still unacknowledged.
    pub async fn unacked(&self, stream: &str, group: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .pending
            .get(&(stream.to_string(), group.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.streams.entry(stream.to_string()).or_default();
        state.groups.insert((stream.to_string(), group.to_string()));
        Ok(())
    }

    async fn read_next(
        &self,
        group: &str,
        _consumer: &str,
        streams: &[&str],
        _block: Duration,
    ) -> Result<Option<StreamEntry>> {
        let mut state = self.state.lock().await;
        for stream in streams {
            let Some(queue) = state.streams.get_mut(*stream) else {
                continue;
            };
            if let Some((id, fields)) = queue.pop_front() {
                state
                    .pending
                    .entry((stream.to_string(), group.to_string()))
                    .or_default()
                    .push(id.clone());
                return Ok(Some(StreamEntry {
                    stream: stream.to_string(),
                    id,
                    fields,
                }));
            }
        }
        Ok(None)
    }

    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(pending) = state
            .pending
            .get_mut(&(stream.to_string(), group.to_string()))
        {
            pending.retain(|id| id != entry_id);
        }
        state
            .acks
            .push((stream.to_string(), group.to_string(), entry_id.to_string()));
        Ok(())
    }

    async fn append(&self, stream: &str, field: &str, payload: &str) -> Result<String> {
        {
            let mut state = self.state.lock().await;
            state.appends.push((
                stream.to_string(),
                field.to_string(),
                payload.to_string(),
            ));
        }
        Ok(self.push(stream, field, payload).await)
    }
}
