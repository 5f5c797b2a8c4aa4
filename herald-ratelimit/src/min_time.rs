//! Minimum-spacing limiter for outbound channel calls.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::{RateLimitError, Result};

/// Limits outbound calls to a maximum in-flight count and a minimum
/// spacing between task starts.
///
/// `min_time` is `per_period / max_requests`. Submissions queue in FIFO
/// order; a task runs once a concurrency slot is free and the spacing gate
/// permits. After [`close`](Self::close), submissions that have not
/// started fail with [`RateLimitError::Cancelled`] while in-flight tasks
/// run to completion.
pub struct MinTimeLimiter {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    min_time: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl MinTimeLimiter {
    /// Create a limiter from a request budget over a period.
    pub fn new(max_concurrent: usize, max_requests: u32, per_period: Duration) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(RateLimitError::Config(
                "max_concurrent must be > 0".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(RateLimitError::Config(
                "max_requests must be > 0".to_string(),
            ));
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            min_time: per_period / max_requests,
            next_slot: Mutex::new(None),
        })
    }

    /// Create a limiter from a per-second rate.
    pub fn per_second(max_concurrent: usize, rate: u32) -> Result<Self> {
        Self::new(max_concurrent, rate, Duration::from_secs(1))
    }

    /// Minimum spacing between task starts.
    pub fn min_time(&self) -> Duration {
        self.min_time
    }

    /// Maximum number of concurrently running tasks.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run a task under the concurrency and spacing gates.
    ///
    /// Returns the task's output, or [`RateLimitError::Cancelled`] when
    /// the limiter was closed before the task started.
    pub async fn schedule<T, F>(&self, task: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        // Semaphore::close wakes all waiters with an error, which is
        // exactly the cancel-pending contract.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RateLimitError::Cancelled)?;

        let slot = {
            let mut next = self.next_slot.lock().unwrap();
            let now = Instant::now();
            let start = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(start + self.min_time);
            start
        };

        tokio::time::sleep_until(slot.into()).await;
        Ok(task.await)
    }

    /// Close the limiter, failing all queued submissions.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Whether the limiter has been closed.
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

impl std::fmt::Debug for MinTimeLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinTimeLimiter")
            .field("max_concurrent", &self.max_concurrent)
            .field("min_time", &self.min_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_rejects_zero_config() {
        assert!(MinTimeLimiter::new(0, 10, Duration::from_secs(1)).is_err());
        assert!(MinTimeLimiter::new(5, 0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_min_time_division() {
        let limiter = MinTimeLimiter::new(5, 4, Duration::from_secs(1)).unwrap();
        assert_eq!(limiter.min_time(), Duration::from_millis(250));

        let limiter = MinTimeLimiter::per_second(5, 50).unwrap();
        assert_eq!(limiter.min_time(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_returns_task_output() {
        let limiter = MinTimeLimiter::per_second(2, 1000).unwrap();
        let out = limiter.schedule(async { 41 + 1 }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let limiter = Arc::new(MinTimeLimiter::per_second(3, 10_000).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .schedule(async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_minimum_spacing_between_starts() {
        let limiter = Arc::new(MinTimeLimiter::new(5, 10, Duration::from_secs(1)).unwrap());
        let starts = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .schedule(async move {
                        starts.lock().unwrap().push(Instant::now());
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = starts.lock().unwrap().clone();
        times.sort();
        for pair in times.windows(2) {
            // 100ms spacing with a little scheduling slack
            assert!(pair[1] - pair[0] >= Duration::from_millis(80));
        }
    }

    #[tokio::test]
    async fn test_close_cancels_pending() {
        let limiter = Arc::new(MinTimeLimiter::per_second(1, 1000).unwrap());

        // occupy the single slot
        let blocker = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .schedule(async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        "done"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // queue one more, then close before it can start
        let pending = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.schedule(async { "late" }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        limiter.close();

        assert_eq!(pending.await.unwrap(), Err(RateLimitError::Cancelled));
        // the in-flight task drains normally
        assert_eq!(blocker.await.unwrap(), Ok("done"));
    }

    #[tokio::test]
    async fn test_schedule_after_close_fails() {
        let limiter = MinTimeLimiter::per_second(2, 100).unwrap();
        limiter.close();

        assert!(limiter.is_closed());
        assert_eq!(
            limiter.schedule(async { 1 }).await,
            Err(RateLimitError::Cancelled)
        );
    }
}
