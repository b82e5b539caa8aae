//! Bounded exponential-backoff retry for transient remote failures.
//!
//! Backend errors (5xx), rate limiting and transient network failures are
//! retried up to [`MAX_RETRIES`] times with a delay of `1s * 2^attempt` plus
//! up to one second of jitter. Idle timeouts are never retried: the
//! connection was deliberately cancelled and the operation must be re-driven
//! by the next sync.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use gdrive_core::domain::SyncError;

/// Maximum number of retries for a transient failure.
pub const MAX_RETRIES: u32 = 5;

/// Base delay doubled on every attempt.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Runs `f`, retrying transient failures with exponential backoff.
///
/// Non-retryable errors are returned immediately; the final retryable error
/// is returned once [`MAX_RETRIES`] is exhausted.
pub async fn with_retry<F, Fut, T>(operation: &str, f: F) -> Result<T, SyncError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < MAX_RETRIES && err.is_retryable() => {
                let delay = backoff_delay(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BASE_DELAY * 2u32.saturating_pow(attempt);
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
    exponential + jitter
}
