//! Periodic API-log retention
//!
//! Deletes records older than the retention window on a fixed interval.
//! A running flag prevents overlapping executions inside one process;
//! duplicate runs across processes are idempotent deletes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailgate_common::Result;
use mailgate_storage::repository::ApiLogRepository;
use tokio::time::interval;
use tracing::{error, info};

/// Background log retention task
pub struct LogRetentionJob {
    repo: ApiLogRepository,
    retention_days: i64,
    interval_minutes: u64,
    running: Arc<AtomicBool>,
}

impl LogRetentionJob {
    pub fn new(repo: ApiLogRepository, retention_days: i64, interval_minutes: u64) -> Self {
        Self {
            repo,
            retention_days,
            interval_minutes,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Loop forever; the caller owns the task handle and aborts it on
    /// shutdown, so this never keeps the process alive.
    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_secs(self.interval_minutes * 60));
        info!(
            retention_days = self.retention_days,
            interval_minutes = self.interval_minutes,
            "log retention job started"
        );
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "log retention pass failed");
            }
        }
    }

    /// One retention pass; skipped when a previous pass is still running
    pub async fn run_once(&self) -> Result<u64> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(0);
        }

        let result = self
            .repo
            .delete_older_than(cutoff(Utc::now(), self.retention_days))
            .await;
        self.running.store(false, Ordering::SeqCst);

        if let Ok(deleted) = &result {
            if *deleted > 0 {
                info!(deleted, "expired api log records removed");
            }
        }
        result
    }
}

/// Retention cutoff for a given reference time
fn cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    now - chrono::Duration::days(retention_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_subtracts_full_days() {
        let now = Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap();
        let cut = cutoff(now, 30);
        assert_eq!(cut, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn running_flag_blocks_reentry() {
        let flag = AtomicBool::new(false);
        assert!(flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok());
        // Second entry loses while the first is still marked running
        assert!(flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err());
        flag.store(false, Ordering::SeqCst);
        assert!(flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok());
    }
}
