//! Exponential-backoff retry for transient external calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, trace, warn};

/// Run an operation with exponential backoff.
///
/// The operation is attempted up to `max_retries + 1` times; the delay
/// before retry `k` is `base_delay * 2^(k-1)`. Each retry logs a warning,
/// exhaustion logs an error and returns the last failure.
pub async fn retry_with_backoff<T, E, F, Fut>(
    name: &str,
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        trace!(component = "retry", name, attempt, "attempting operation");
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                attempt += 1;
                warn!(
                    component = "retry",
                    name,
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                error!(
                    component = "retry",
                    name,
                    attempts = attempt + 1,
                    error = %err,
                    "operation failed permanently"
                );
                return Err(err);
            }
        }
    }
}
