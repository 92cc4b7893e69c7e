//! Shared session memory over a Redis-family store.
//!
//! The whole window is one string value per session, rewritten with
//! `SETEX` on every append so the value and its TTL move together.
//! Concurrent appends from the same session race; last-writer-wins is
//! acceptable (sessions are single-user).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use torque_core::types::{Message, Role};

use crate::error::{MemoryError, Result};
use crate::types::{decode_window, encode_window, push_bounded, session_key};

/// Live-session count and approximate memory of the backing store.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub sessions: usize,
    pub used_memory_bytes: u64,
}

/// Shared, TTL'd, size-bounded conversation store.
#[async_trait]
pub trait SessionMemory: Send + Sync {
    /// Append one message; enforces the window cap and refreshes the TTL.
    async fn append(&self, sid: &str, role: Role, content: &str) -> Result<()>;

    /// Oldest-first history. Missing or expired sessions read as empty.
    async fn history(&self, sid: &str) -> Result<Vec<Message>>;

    async fn clear(&self, sid: &str) -> Result<()>;

    async fn stats(&self) -> Result<MemoryStats>;
}

pub struct RedisSessionStore {
    conn: ConnectionManager,
    ttl_secs: u64,
    window: usize,
}

impl RedisSessionStore {
    /// Connect to the store. Fails fast when Redis is unreachable at
    /// startup; runtime outages surface per-operation as `Unavailable`.
    pub async fn connect(redis_url: &str, ttl_secs: u64, window: usize) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            ttl_secs,
            window,
        })
    }

    async fn read_window(&self, sid: &str) -> Result<Vec<Message>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(session_key(sid))
            .query_async(&mut conn)
            .await?;

        match raw {
            None => Ok(Vec::new()),
            Some(raw) => match decode_window(&raw) {
                Ok(window) => Ok(window),
                Err(e) => {
                    // A corrupt value means a writer bug or manual edit;
                    // start the session over rather than failing every turn.
                    warn!(sid, error = %e, "corrupt session window, resetting");
                    Ok(Vec::new())
                }
            },
        }
    }
}

#[async_trait]
impl SessionMemory for RedisSessionStore {
    async fn append(&self, sid: &str, role: Role, content: &str) -> Result<()> {
        let mut window = self.read_window(sid).await?;
        push_bounded(&mut window, Message::new(role, content), self.window);
        let payload = encode_window(&window)?;

        let mut conn = self.conn.clone();
        redis::cmd("SETEX")
            .arg(session_key(sid))
            .arg(self.ttl_secs)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(sid, len = window.len(), "session append");
        Ok(())
    }

    async fn history(&self, sid: &str) -> Result<Vec<Message>> {
        self.read_window(sid).await
    }

    async fn clear(&self, sid: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(session_key(sid))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<MemoryStats> {
        let mut conn = self.conn.clone();

        // Count live session keys with a cursor scan; KEYS would block the
        // server on large instances.
        let mut sessions = 0usize;
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("chat:session:*:history")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            sessions += batch.len();
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await?;
        let used_memory_bytes = parse_used_memory(&info);

        Ok(MemoryStats {
            sessions,
            used_memory_bytes,
        })
    }
}

fn parse_used_memory(info: &str) -> u64 {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory:"))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// In-process store with the same window and TTL semantics.
///
/// Used by tests and single-process deployments that run without Redis;
/// expiry is lazy (checked on read and write).
pub struct InMemorySessionStore {
    entries: DashMap<String, (Vec<Message>, Instant)>,
    ttl: Duration,
    window: usize,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, window: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            window,
        }
    }

    fn live_window(&self, sid: &str) -> Vec<Message> {
        // the read guard must be released before remove() touches the shard
        let expired = match self.entries.get(sid) {
            Some(entry) => {
                if entry.1.elapsed() < self.ttl {
                    return entry.0.clone();
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(sid);
        }
        Vec::new()
    }
}

#[async_trait]
impl SessionMemory for InMemorySessionStore {
    async fn append(&self, sid: &str, role: Role, content: &str) -> Result<()> {
        let mut window = self.live_window(sid);
        push_bounded(&mut window, Message::new(role, content), self.window);
        self.entries
            .insert(sid.to_string(), (window, Instant::now()));
        Ok(())
    }

    async fn history(&self, sid: &str) -> Result<Vec<Message>> {
        Ok(self.live_window(sid))
    }

    async fn clear(&self, sid: &str) -> Result<()> {
        self.entries.remove(sid);
        Ok(())
    }

    async fn stats(&self) -> Result<MemoryStats> {
        let sessions = self
            .entries
            .iter()
            .filter(|e| e.value().1.elapsed() < self.ttl)
            .count();
        let used_memory_bytes = self
            .entries
            .iter()
            .map(|e| e.value().0.iter().map(|m| m.content.len() as u64).sum::<u64>())
            .sum();
        Ok(MemoryStats {
            sessions,
            used_memory_bytes,
        })
    }
}
