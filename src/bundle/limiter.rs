//! Counting admission gate for attachment fetches.
//!
//! [`ConcurrencyLimiter`] wraps a Tokio [`Semaphore`]. Tokio's semaphore
//! queues waiters in request order, so slots are handed out FIFO: the first
//! task that found the gate full is the first one admitted when a slot frees.
//!
//! A slot is held by a [`LimiterPermit`] and released when the permit drops,
//! which covers early returns, cancellation, and panics in the holder.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Bounded-counting gate with FIFO admission.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// One admitted slot; dropping it releases the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

/// Returned when the gate was closed while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterClosed;

impl ConcurrencyLimiter {
    /// Creates a gate admitting at most `limit` holders.
    ///
    /// Callers validate `limit`; the pipeline rejects zero before
    /// constructing a limiter.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Waits for a free slot.
    ///
    /// Suspends only the calling task.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterClosed`] if [`close`](Self::close) was called.
    pub async fn acquire(&self) -> Result<LimiterPermit, LimiterClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)?;
        trace!(active = self.active(), limit = self.limit, "limiter slot acquired");
        Ok(LimiterPermit { _permit: permit })
    }

    /// Configured maximum number of holders.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn active(&self) -> usize {
        self.limit.saturating_sub(self.semaphore.available_permits())
    }

    /// Closes the gate; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release_updates_active() {
        let limiter = ConcurrencyLimiter::new(2);
        assert_eq!(limiter.active(), 0);

        let first = limiter.acquire().await.unwrap();
        let second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.active(), 2);

        drop(first);
        assert_eq!(limiter.active(), 1);
        drop(second);
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn test_waiter_pending_until_release() {
        let limiter = ConcurrencyLimiter::new(1);
        let mut holder = task::spawn(limiter.acquire());
        let permit = assert_ready!(holder.poll()).unwrap();

        let mut waiter = task::spawn(limiter.acquire());
        assert_pending!(waiter.poll());

        drop(permit);
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll()).unwrap();
    }

    #[test]
    fn test_waiters_admitted_in_fifo_order() {
        let limiter = ConcurrencyLimiter::new(1);
        let mut holder = task::spawn(limiter.acquire());
        let permit = assert_ready!(holder.poll()).unwrap();

        let mut first = task::spawn(limiter.acquire());
        let mut second = task::spawn(limiter.acquire());
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        drop(permit);
        // The slot goes to the head of the queue, not to whoever polls first.
        assert_pending!(second.poll());
        let first_permit = assert_ready!(first.poll()).unwrap();

        drop(first_permit);
        assert_ready!(second.poll()).unwrap();
    }

    #[test]
    fn test_close_fails_pending_waiters() {
        let limiter = ConcurrencyLimiter::new(1);
        let mut holder = task::spawn(limiter.acquire());
        let _permit = assert_ready!(holder.poll()).unwrap();

        let mut waiter = task::spawn(limiter.acquire());
        assert_pending!(waiter.poll());

        limiter.close();
        assert_eq!(assert_ready!(waiter.poll()).unwrap_err(), LimiterClosed);
    }

    #[tokio::test]
    async fn test_active_never_exceeds_limit_under_load() {
        let limiter = ConcurrencyLimiter::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..20 {
            let limiter = limiter.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn test_permit_released_when_holder_panics() {
        let limiter = ConcurrencyLimiter::new(1);

        let panicking = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                panic!("holder failed");
            })
        };
        assert!(panicking.await.is_err());

        assert_eq!(limiter.active(), 0);
        let _permit = limiter.acquire().await.unwrap();
        assert_eq!(limiter.active(), 1);
    }
}
