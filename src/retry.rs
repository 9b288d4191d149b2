//! Retry logic with exponential backoff
//!
//! Retrieval talks to a remote host through an interactive client, so a share of failures
//! are transient (connection drops, "service not available" replies, timeouts). This module
//! retries those with exponential backoff and optional jitter; everything else fails fast.
//!
//! # Example
//!
//! ```no_run
//! use dsmig::config::RetryConfig;
//! use dsmig::retry::with_retry;
//! use dsmig::Error;
//!
//! # async fn example() -> dsmig::Result<()> {
//! let config = RetryConfig::default();
//! let listing = with_retry(&config, || async {
//!     // a 421 reply is worth another attempt, a 550 is not
//!     Err::<String, _>(Error::Transfer {
//!         dataset: "HLQ.PAYROLL.DATA".into(),
//!         reason: "421 Service not available".into(),
//!     })
//! })
//! .await;
//! assert!(listing.is_err());
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, dropped connections, busy host) should return `true`.
/// Permanent failures (dataset not found, bad layout, missing tool) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// FTP replies and client messages that indicate a transient condition
const TRANSIENT_MARKERS: &[&str] = &[
    "421", // service not available, closing control connection
    "425", // can't open data connection
    "426", // connection closed, transfer aborted
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "temporary",
    "busy",
];

fn mentions_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // A slow host may answer on the next attempt
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
            // Collaborator failures are classified by their reply text
            Error::Transfer { reason, .. } => mentions_transient(reason),
            Error::ExternalTool(msg) => mentions_transient(msg),
            // Decoding the same bytes again gives the same answer
            Error::Conversion { .. } => false,
            Error::Cancelled(_) => false,
            Error::NotSupported(_) => false,
            Error::Config { .. }
            | Error::Format { .. }
            | Error::DuplicateKey { .. }
            | Error::InvalidDataset { .. }
            | Error::Persistence { .. }
            | Error::Csv(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or `config.max_attempts` retries
/// have been spent
///
/// Waits `initial_delay` before the first retry and multiplies the wait by
/// `backoff_multiplier` after each one, capped at `max_delay`. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;
    let mut delay = config.initial_delay;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "succeeded after retrying");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            tracing::debug!(%error, "permanent failure, not retrying");
            return Err(error);
        }
        if retries >= config.max_attempts {
            tracing::warn!(%error, attempts = retries + 1, "giving up after retries");
            return Err(error);
        }

        retries += 1;
        let wait = if config.jitter { add_jitter(delay) } else { delay };
        tracing::warn!(
            %error,
            retry = retries,
            max_attempts = config.max_attempts,
            wait_ms = wait.as_millis() as u64,
            "transient failure, retrying"
        );
        tokio::time::sleep(wait).await;
        delay = next_delay(delay, config);
    }
}

fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay)
}

/// Stretch `delay` by a random factor in `[1, 2]` so parallel sessions do not reconnect in step
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn transfer_error(reason: &str) -> Error {
        Error::Transfer {
            dataset: "HLQ.DATA".into(),
            reason: reason.into(),
        }
    }

    #[tokio::test]
    async fn test_success_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(2), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn test_transient_reply_is_retried_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transfer_error("421 Service not available"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(2), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(Error::Timeout {
                    operation: "fetch HLQ.DATA".into(),
                    after: Duration::from_secs(1),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should try initial + 2 retries"
        );
    }

    #[tokio::test]
    async fn test_permanent_error_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(transfer_error("550 Data set not found"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exponential_backoff() {
        let start = std::time::Instant::now();
        let _ = with_retry(&fast_config(3), || async {
            Err::<i32, _>(transfer_error("426 Connection closed; transfer aborted"))
        })
        .await;

        // 10ms + 20ms + 40ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(25),
            ..fast_config(5)
        };
        let second = next_delay(config.initial_delay, &config);
        assert_eq!(second, Duration::from_millis(20));
        assert_eq!(next_delay(second, &config), Duration::from_millis(25));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..20 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(transfer_error("425 Can't open data connection").is_retryable());
        assert!(transfer_error("ftp: connect: Connection refused").is_retryable());
        assert!(!transfer_error("530 Login incorrect").is_retryable());
        assert!(!transfer_error("550 Data set not found").is_retryable());
        assert!(
            !Error::Conversion {
                dataset: "A".into(),
                reason: "timeout in copybook".into()
            }
            .is_retryable()
        );
        assert!(Error::ExternalTool("ftp timed out".into()).is_retryable());
        assert!(!Error::NotSupported("GDG".into()).is_retryable());
        assert!(!Error::Cancelled("shutdown".into()).is_retryable());
        assert!(
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset"
            ))
            .is_retryable()
        );
    }
}
