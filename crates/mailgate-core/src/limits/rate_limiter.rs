//! Per-credential request rate limiting
//!
//! The shared backend keys a counter per credential and minute bucket so
//! every gateway process sees the same window. The in-process fallback
//! covers only this process; with N processes the effective limit is N
//! times the configured one, which operators accept when the shared store
//! is down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailgate_common::types::ApiKeyId;
use mailgate_common::{Error, Result};
use mailgate_storage::KvStore;
use tokio::sync::Mutex;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Backend behind the per-minute credential limiter
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Count one request; fails with `RateLimitExceeded` past the limit
    async fn hit(&self, api_key_id: ApiKeyId, limit_per_minute: u32) -> Result<()>;

    /// Backend name, logged at startup
    fn name(&self) -> &'static str;
}

/// Shared-store limiter; counters are visible across processes
pub struct SharedRateLimiter {
    kv: KvStore,
}

impl SharedRateLimiter {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl RateLimiterBackend for SharedRateLimiter {
    async fn hit(&self, api_key_id: ApiKeyId, limit_per_minute: u32) -> Result<()> {
        let bucket = unix_now() / 60;
        let key = format!("rate:credential:{}:{}", api_key_id, bucket);
        let count = self.kv.incr(&key, WINDOW).await?;
        if count > limit_per_minute as i64 {
            debug!(api_key_id, count, limit_per_minute, "rate limit exceeded");
            return Err(Error::RateLimitExceeded);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}

/// Process-local fallback limiter
pub struct MemoryRateLimiter {
    windows: Arc<Mutex<HashMap<ApiKeyId, (u64, u32)>>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn hit_at(&self, api_key_id: ApiKeyId, limit_per_minute: u32, now: u64) -> Result<()> {
        let bucket = now / 60;
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(api_key_id).or_insert((bucket, 0));
        if entry.0 != bucket {
            *entry = (bucket, 0);
        }
        entry.1 += 1;
        if entry.1 > limit_per_minute {
            return Err(Error::RateLimitExceeded);
        }
        Ok(())
    }
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterBackend for MemoryRateLimiter {
    async fn hit(&self, api_key_id: ApiKeyId, limit_per_minute: u32) -> Result<()> {
        self.hit_at(api_key_id, limit_per_minute, unix_now()).await
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_limiter_trips_past_limit() {
        let limiter = MemoryRateLimiter::new();
        assert!(limiter.hit_at(1, 2, 1000).await.is_ok());
        assert!(limiter.hit_at(1, 2, 1001).await.is_ok());
        assert!(matches!(
            limiter.hit_at(1, 2, 1002).await,
            Err(Error::RateLimitExceeded)
        ));
    }

    #[tokio::test]
    async fn memory_limiter_resets_each_minute() {
        let limiter = MemoryRateLimiter::new();
        assert!(limiter.hit_at(1, 1, 60).await.is_ok());
        assert!(limiter.hit_at(1, 1, 61).await.is_err());
        // Next minute bucket
        assert!(limiter.hit_at(1, 1, 120).await.is_ok());
    }

    #[tokio::test]
    async fn memory_limiter_is_per_credential() {
        let limiter = MemoryRateLimiter::new();
        assert!(limiter.hit_at(1, 1, 30).await.is_ok());
        assert!(limiter.hit_at(2, 1, 30).await.is_ok());
        assert!(limiter.hit_at(1, 1, 31).await.is_err());
    }

    #[tokio::test]
    async fn shared_limiter_uses_minute_bucket_keys() {
        // Backed by the in-process KvStore flavor, the shared limiter still
        // exercises the INCR-with-expiry contract end to end.
        let limiter = SharedRateLimiter::new(KvStore::memory());
        assert!(limiter.hit(7, 2).await.is_ok());
        assert!(limiter.hit(7, 2).await.is_ok());
        assert!(matches!(limiter.hit(7, 2).await, Err(Error::RateLimitExceeded)));
        assert_eq!(limiter.name(), "shared");
    }
}
