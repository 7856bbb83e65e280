//! Shared key-value store
//!
//! Counters, lock-out keys and token caches live in Redis when `REDIS_URL`
//! is configured. Without it, an in-process map takes over; counters then
//! only cover this process, which multi-process deployments must accept.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mailgate_common::{Error, Result};
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tracing::info;

/// Shared key-value store with a Redis and an in-process backend
#[derive(Clone)]
pub enum KvStore {
    Redis(ConnectionManager),
    Memory(Arc<Mutex<MemoryKv>>),
}

/// In-process fallback state
#[derive(Default)]
pub struct MemoryKv {
    entries: HashMap<String, MemoryEntry>,
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryKv {
    fn purge(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
    }
}

impl KvStore {
    /// Connect to Redis when a URL is configured, otherwise fall back to
    /// process-local storage.
    pub async fn connect(redis_url: Option<&str>) -> Result<Self> {
        match redis_url {
            Some(url) => {
                let client = redis::Client::open(url)
                    .map_err(|e| Error::Config(format!("Invalid REDIS_URL: {}", e)))?;
                let manager = client
                    .get_connection_manager()
                    .await
                    .map_err(|e| Error::Internal(format!("Redis connection failed: {}", e)))?;
                info!(backend = "redis", "Shared key-value store ready");
                Ok(KvStore::Redis(manager))
            }
            None => {
                info!(
                    backend = "memory",
                    "Shared key-value store ready (counters are per-process)"
                );
                Ok(KvStore::Memory(Arc::new(Mutex::new(MemoryKv::default()))))
            }
        }
    }

    /// In-process store, for tests and fallback wiring
    pub fn memory() -> Self {
        KvStore::Memory(Arc::new(Mutex::new(MemoryKv::default())))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            KvStore::Redis(_) => "redis",
            KvStore::Memory(_) => "memory",
        }
    }

    /// Atomically increment `key`, setting `ttl` on first increment.
    /// Returns the post-increment count.
    pub async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        match self {
            KvStore::Redis(manager) => {
                let mut conn = manager.clone();
                let counts: Vec<i64> = redis::pipe()
                    .atomic()
                    .incr(key, 1)
                    .expire(key, ttl.as_secs() as i64)
                    .ignore()
                    .query_async(&mut conn)
                    .await
                    .map_err(into_error)?;
                Ok(counts.first().copied().unwrap_or(0))
            }
            KvStore::Memory(state) => {
                let mut state = state.lock().await;
                state.purge();
                let entry = state.entries.entry(key.to_string()).or_insert(MemoryEntry {
                    value: "0".to_string(),
                    expires_at: Some(Instant::now() + ttl),
                });
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                Ok(count)
            }
        }
    }

    /// Set `key` to `value` with an expiry
    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        match self {
            KvStore::Redis(manager) => {
                let mut conn = manager.clone();
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl.as_secs())
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(into_error)
            }
            KvStore::Memory(state) => {
                let mut state = state.lock().await;
                state.purge();
                state.entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: value.to_string(),
                        expires_at: Some(Instant::now() + ttl),
                    },
                );
                Ok(())
            }
        }
    }

    /// Get the value stored at `key`, if present and not expired
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            KvStore::Redis(manager) => {
                let mut conn = manager.clone();
                redis::cmd("GET")
                    .arg(key)
                    .query_async::<Option<String>>(&mut conn)
                    .await
                    .map_err(into_error)
            }
            KvStore::Memory(state) => {
                let mut state = state.lock().await;
                state.purge();
                Ok(state.entries.get(key).map(|entry| entry.value.clone()))
            }
        }
    }

    /// Delete `key`
    pub async fn del(&self, key: &str) -> Result<()> {
        match self {
            KvStore::Redis(manager) => {
                let mut conn = manager.clone();
                redis::cmd("DEL")
                    .arg(key)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(into_error)
            }
            KvStore::Memory(state) => {
                let mut state = state.lock().await;
                state.entries.remove(key);
                Ok(())
            }
        }
    }

    /// Remaining time-to-live of `key` in seconds, if the key exists
    pub async fn ttl_secs(&self, key: &str) -> Result<Option<u64>> {
        match self {
            KvStore::Redis(manager) => {
                let mut conn = manager.clone();
                let ttl: i64 = redis::cmd("TTL")
                    .arg(key)
                    .query_async(&mut conn)
                    .await
                    .map_err(into_error)?;
                Ok((ttl >= 0).then_some(ttl as u64))
            }
            KvStore::Memory(state) => {
                let mut state = state.lock().await;
                state.purge();
                Ok(state.entries.get(key).and_then(|entry| {
                    entry
                        .expires_at
                        .map(|at| at.saturating_duration_since(Instant::now()).as_secs())
                }))
            }
        }
    }
}

fn into_error(err: redis::RedisError) -> Error {
    Error::Internal(format!("Redis error: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_incr_counts_up() {
        let kv = KvStore::memory();
        assert_eq!(kv.incr("k", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(kv.incr("k", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(kv.incr("other", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_set_get_del() {
        let kv = KvStore::memory();
        kv.set_ex("token", "abc", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(kv.get("token").await.unwrap().as_deref(), Some("abc"));
        kv.del("token").await.unwrap();
        assert_eq!(kv.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_entries_expire() {
        let kv = KvStore::memory();
        kv.set_ex("gone", "x", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(kv.get("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_ttl_reports_remaining() {
        let kv = KvStore::memory();
        kv.set_ex("lock", "1", Duration::from_secs(90)).await.unwrap();
        let ttl = kv.ttl_secs("lock").await.unwrap().unwrap();
        assert!(ttl <= 90 && ttl > 80);
        assert_eq!(kv.ttl_secs("missing").await.unwrap(), None);
    }
}
