//! Token bucket limiter for producer pacing.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::{RateLimitError, Result};

/// Token bucket state.
#[derive(Debug)]
struct BucketState {
    /// Current number of tokens.
    tokens: f64,
    /// Last time tokens were added.
    last_refill: Instant,
}

/// Token bucket rate limiter.
///
/// Capacity equals the per-second rate and the bucket starts full, so a
/// fresh limiter admits one burst of up to `rate_per_second` acquisitions
/// before settling into the sustained rate.
pub struct TokenBucket {
    /// Maximum tokens (burst capacity), equal to the refill rate.
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a new token bucket limiter.
    ///
    /// Fails with a configuration error when `rate_per_second` is not
    /// strictly positive.
    pub fn new(rate_per_second: f64) -> Result<Self> {
        if rate_per_second <= 0.0 || !rate_per_second.is_finite() {
            return Err(RateLimitError::Config(format!(
                "rate_per_second must be > 0, got {}",
                rate_per_second
            )));
        }

        Ok(Self {
            capacity: rate_per_second,
            refill_rate: rate_per_second,
            state: Mutex::new(BucketState {
                tokens: rate_per_second,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Refill tokens based on elapsed wall-clock time.
    ///
    /// A zero elapsed delta is a no-op.
    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }

        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Try to consume a token without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Consume a token, waiting until one is available.
    ///
    /// The wait is a sleep-recheck loop rather than a busy spin: when the
    /// bucket is empty the caller sleeps for half the estimated refill
    /// time, clamped to the 10–50 ms band, then re-checks.
    pub async fn acquire(&self) {
        loop {
            let estimated_wait_ms = {
                let mut state = self.state.lock().unwrap();
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let needed = 1.0 - state.tokens;
                let refill_per_ms = self.refill_rate / 1000.0;
                needed / refill_per_ms
            };

            let sleep_ms = (estimated_wait_ms / 2.0).min(50.0).max(10.0);
            tokio::time::sleep(Duration::from_millis(sleep_ms as u64)).await;
        }
    }

    /// Current number of whole tokens available.
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        state.tokens as u64
    }

    /// Burst capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .finish()
    }
}
