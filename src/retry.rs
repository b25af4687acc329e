//! Retry logic with exponential backoff
//!
//! The delay schedule is deterministic: after failed attempt `i` (0-indexed)
//! the caller sleeps `base_delay * 2^i`, capped at `max_delay`. No jitter is
//! applied, so a given configuration always produces the same delays.
//!
//! # Example
//!
//! ```no_run
//! use channel_ingest::config::RetryConfig;
//! use channel_ingest::retry::retry_with_backoff;
//! use channel_ingest::Error;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let value = retry_with_backoff(&config, &cancel, |_, _, _| {}, || async {
//!     Ok::<_, Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (tool exited non-zero, deadline exceeded, connection reset)
/// should return `true`. Permanent failures (bad configuration, cancellation)
/// should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Any tool failure is one opaque kind and always worth another attempt
            Error::ToolInvocation { .. } => true,
            Error::Timeout { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Upload { .. } => false,
            Error::ArtifactMissing { .. } => false,
            Error::Listing(_) => false,
            Error::Config { .. } => false,
            Error::Cancelled => false,
            Error::Serialization(_) => false,
        }
    }
}

/// Delay slept after failed attempt `attempt` (0-indexed)
///
/// Equals `base_delay * 2^attempt`, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| config.base_delay.checked_mul(factor))
        .map_or(config.max_delay, |delay| delay.min(config.max_delay))
}

/// Execute an async operation up to `config.max_attempts` times
///
/// Returns the first success, or the last error once the budget is exhausted.
/// Non-retryable errors are returned immediately. `on_retry` is called with the
/// 1-based number of the failed attempt, the upcoming delay and the error,
/// before each backoff sleep. Cancelling `cancel` interrupts a backoff sleep
/// and returns the error that preceded it.
///
/// No sleep follows the final failed attempt.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    R: FnMut(u32, Duration, &E),
{
    let max_attempts = config.max_attempts.get();
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(config, attempt);
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                on_retry(attempt, delay, &e);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(attempt, "Backoff interrupted by cancellation");
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}
