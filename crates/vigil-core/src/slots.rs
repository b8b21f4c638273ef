//! Execution slot pool
//!
//! Bounds how many job executions may run simultaneously. Each execution
//! spawns an expensive external agent process, so the pool defaults to a
//! small fixed size rather than scaling with the job count.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Counting semaphore with FIFO waiters.
///
/// Waiters are served strictly in arrival order; that is the documented
/// fairness guarantee of [`tokio::sync::Semaphore`].
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl SlotPool {
    /// Create a pool with `max_concurrent` slots (clamped to at least 1).
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Acquire a slot. Suspends until one is available.
    pub async fn acquire(&self) -> SlotPermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        debug!(available = self.semaphore.available_permits(), "execution slot acquired");
        SlotPermit { _permit: permit }
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured pool size.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// A held execution slot; released when dropped.
pub struct SlotPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_size_is_clamped() {
        let pool = SlotPool::new(0);
        assert_eq!(pool.max_concurrent(), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pool = SlotPool::new(2);
        let first = pool.acquire().await;
        let _second = pool.acquire().await;
        assert_eq!(pool.available(), 0);

        drop(first);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_held_count_never_exceeds_max() {
        let pool = Arc::new(SlotPool::new(2));
        let a = pool.acquire().await;
        let _b = pool.acquire().await;

        // Third acquire must wait until a permit is returned.
        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(a);
        let _c = waiter.await.unwrap();
        assert_eq!(pool.available(), 0);
    }
}
