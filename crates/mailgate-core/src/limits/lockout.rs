//! Admin login lock-out
//!
//! Failures are counted per `(lowercased username, client ip)`. Reaching
//! the threshold swaps the counter for a lock key whose TTL is the lock
//! window; while it lives, login short-circuits before any password check.

use std::time::Duration;

use mailgate_common::{Error, Result};
use mailgate_storage::KvStore;
use tracing::warn;

/// Login failure tracker
#[derive(Clone)]
pub struct LoginLockout {
    kv: KvStore,
    max_attempts: u32,
    lock_window: Duration,
}

impl LoginLockout {
    pub fn new(kv: KvStore, max_attempts: u32, lock_minutes: u64) -> Self {
        Self {
            kv,
            max_attempts,
            lock_window: Duration::from_secs(lock_minutes * 60),
        }
    }

    fn keys(username: &str, ip: Option<&str>) -> (String, String) {
        let user = username.trim().to_lowercase();
        let ip = ip.unwrap_or("unknown");
        (
            format!("login_fail:{}:{}", user, ip),
            format!("login_lock:{}:{}", user, ip),
        )
    }

    /// Fail with `AccountLocked` while a lock is active
    pub async fn check(&self, username: &str, ip: Option<&str>) -> Result<()> {
        let (_, lock_key) = Self::keys(username, ip);
        if let Some(ttl) = self.kv.ttl_secs(&lock_key).await? {
            let minutes = ttl.div_ceil(60).max(1);
            return Err(Error::AccountLocked(minutes));
        }
        Ok(())
    }

    /// Count one failed attempt; returns the lock error when this attempt
    /// reached the threshold.
    pub async fn record_failure(&self, username: &str, ip: Option<&str>) -> Result<()> {
        let (fail_key, lock_key) = Self::keys(username, ip);
        let count = self.kv.incr(&fail_key, self.lock_window).await?;
        if count >= self.max_attempts as i64 {
            warn!(username, "admin login locked after repeated failures");
            self.kv.del(&fail_key).await?;
            self.kv.set_ex(&lock_key, "1", self.lock_window).await?;
            let minutes = (self.lock_window.as_secs()).div_ceil(60).max(1);
            return Err(Error::AccountLocked(minutes));
        }
        Ok(())
    }

    /// Successful authentication clears both keys
    pub async fn clear(&self, username: &str, ip: Option<&str>) -> Result<()> {
        let (fail_key, lock_key) = Self::keys(username, ip);
        self.kv.del(&fail_key).await?;
        self.kv.del(&lock_key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lockout(max: u32) -> LoginLockout {
        LoginLockout::new(KvStore::memory(), max, 15)
    }

    #[tokio::test]
    async fn locks_at_threshold() {
        let lockout = lockout(3);
        assert!(lockout.check("root", Some("1.2.3.4")).await.is_ok());
        assert!(lockout.record_failure("root", Some("1.2.3.4")).await.is_ok());
        assert!(lockout.record_failure("root", Some("1.2.3.4")).await.is_ok());
        // Third failure trips the lock
        assert!(matches!(
            lockout.record_failure("root", Some("1.2.3.4")).await,
            Err(Error::AccountLocked(_))
        ));
        // And the lock holds even for a now-correct password attempt
        assert!(matches!(
            lockout.check("root", Some("1.2.3.4")).await,
            Err(Error::AccountLocked(_))
        ));
    }

    #[tokio::test]
    async fn username_is_case_insensitive() {
        let lockout = lockout(2);
        lockout.record_failure("Root", Some("1.2.3.4")).await.ok();
        assert!(matches!(
            lockout.record_failure("ROOT", Some("1.2.3.4")).await,
            Err(Error::AccountLocked(_))
        ));
    }

    #[tokio::test]
    async fn distinct_ips_track_separately() {
        let lockout = lockout(2);
        lockout.record_failure("root", Some("1.1.1.1")).await.ok();
        assert!(lockout.record_failure("root", Some("2.2.2.2")).await.is_ok());
    }

    #[tokio::test]
    async fn success_clears_counters() {
        let lockout = lockout(3);
        lockout.record_failure("root", None).await.ok();
        lockout.record_failure("root", None).await.ok();
        lockout.clear("root", None).await.unwrap();
        // Counter restarted
        assert!(lockout.record_failure("root", None).await.is_ok());
        assert!(lockout.check("root", None).await.is_ok());
    }

    #[tokio::test]
    async fn lock_error_reports_remaining_minutes() {
        let lockout = LoginLockout::new(KvStore::memory(), 1, 15);
        match lockout.record_failure("root", Some("9.9.9.9")).await {
            Err(Error::AccountLocked(minutes)) => assert_eq!(minutes, 15),
            other => panic!("expected lock, got {other:?}"),
        }
    }
}
