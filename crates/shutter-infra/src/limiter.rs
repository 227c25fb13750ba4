//! Concurrency limiter
//!
//! A counting semaphore with a FIFO wait queue. Permits are RAII guards: the
//! only way to hold one is through [`LimiterPermit`], which releases on drop,
//! error paths and cancelled futures included.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Concurrency limiter {0} is closed")]
pub struct LimiterClosed(pub &'static str);

#[derive(Clone)]
pub struct ConcurrencyLimiter {
    name: &'static str,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// A limiter admitting at most `capacity` holders (minimum 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a permit. Waiters are admitted in arrival order.
    pub async fn acquire(&self) -> Result<LimiterPermit, LimiterClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed(self.name))?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tracing::trace!(limiter = self.name, in_flight = now, "Permit acquired");

        Ok(LimiterPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once since creation.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Stop admitting; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Held permit. Dropping it releases the slot.
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let limiter = ConcurrencyLimiter::new("transfer", 2);
        let mut handles = Vec::new();

        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                assert!(limiter.in_flight() <= 2);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.peak(), 2);
    }

    #[tokio::test]
    async fn test_permit_released_on_error_path() {
        let limiter = ConcurrencyLimiter::new("compression", 1);

        let result: Result<(), &str> = async {
            let _permit = limiter.acquire().await.unwrap();
            Err("boom")
        }
        .await;
        assert!(result.is_err());

        let permit = tokio::time::timeout(Duration::from_millis(100), limiter.acquire())
            .await
            .expect("permit should be free again");
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let limiter = ConcurrencyLimiter::new("transfer", 0);
        assert_eq!(limiter.capacity(), 1);
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_limiter_rejects() {
        let limiter = ConcurrencyLimiter::new("transfer", 1);
        limiter.close();
        assert_eq!(
            limiter.acquire().await.err(),
            Some(LimiterClosed("transfer"))
        );
    }
}
