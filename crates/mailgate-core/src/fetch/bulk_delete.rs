//! Bounded-concurrency message deletion
//!
//! Runs a deletion future per message id with a fixed number of permits.
//! Individual failures never abort the batch; the caller surfaces the
//! partial count.

use std::future::Future;
use std::sync::Arc;

use mailgate_common::Result;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub const DELETE_CONCURRENCY: usize = 10;

/// Delete every id with at most `concurrency` in flight.
/// Returns how many deletions succeeded.
pub async fn delete_batch<F, Fut>(ids: Vec<String>, concurrency: usize, delete_fn: F) -> usize
where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let total = ids.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(total);

    for id in ids {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let delete_fn = delete_fn.clone();
        handles.push(tokio::spawn(async move {
            let result = delete_fn(id.clone()).await;
            if let Err(e) = &result {
                warn!(message_id = id.as_str(), error = %e, "message deletion failed");
            }
            drop(permit);
            result.is_ok()
        }));
    }

    let mut deleted = 0usize;
    for handle in handles {
        if matches!(handle.await, Ok(true)) {
            deleted += 1;
        }
    }

    debug!(deleted, total, "bulk delete batch finished");
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailgate_common::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn counts_only_successes() {
        let ids: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let deleted = delete_batch(ids, 3, |id| async move {
            if id.parse::<u32>().unwrap() % 2 == 0 {
                Ok(())
            } else {
                Err(Error::GraphApiFailed("boom".into()))
            }
        })
        .await;
        assert_eq!(deleted, 5);
    }

    #[tokio::test]
    async fn respects_concurrency_bound() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let ids: Vec<String> = (0..30).map(|i| i.to_string()).collect();

        let (current_c, peak_c) = (current.clone(), peak.clone());
        let deleted = delete_batch(ids, 4, move |_id| {
            let current = current_c.clone();
            let peak = peak_c.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(deleted, 30);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let deleted = delete_batch(Vec::new(), 10, |_| async { Ok(()) }).await;
        assert_eq!(deleted, 0);
    }
}
