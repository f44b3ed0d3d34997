// =============================================================================
// transport.rs — THE RESILIENCE GUARDIAN
// =============================================================================
//
// Every outbound network call in the engine — feed fetches, Telegram
// sends — goes through here. The policy is bounded exponential backoff:
//
//   attempt 1 immediately, then wait 1s, 2s, 4s, 8s, ... (capped at
//   max_backoff) between attempts, giving up after max_retries total
//   attempts and surfacing the last failure as Exhausted.
//
// Failures come in two flavors and the distinction matters:
//
//   Retryable — timeouts, connection resets, 5xx, rate limits. The remote
//               end is having a moment; waiting helps.
//   Fatal     — 4xx (other than 429), malformed responses. Waiting does
//               not make a 404 stop being a 404. These surface on the
//               first attempt without consuming any retry budget.
//
// Each attempt is independently boxed in a tokio timeout. A hung socket
// counts as a retryable failure, same as an honest error. Callers pick
// the timeout per operation: short for metadata fetches, long for
// document sends.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Transport-level failure taxonomy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The kind of failure that waiting might fix.
    #[error("retryable failure: {0}")]
    Retryable(anyhow::Error),

    /// The kind of failure that waiting will not fix. Surfaces
    /// immediately without consuming retry budget.
    #[error("permanent failure: {0}")]
    Fatal(anyhow::Error),

    /// A single attempt exceeded its timeout. Counts as retryable.
    #[error("attempt timed out after {0:?}")]
    AttemptTimeout(Duration),

    /// The retry budget ran out. Carries the failure from the last attempt.
    #[error("exhausted after {attempts} attempts, last failure: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<TransportError>,
    },
}

impl TransportError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Retryable(_) | TransportError::AttemptTimeout(_)
        )
    }
}

/// Classify an HTTP status into the transport taxonomy. 429 and 5xx are
/// the remote end asking for patience; everything else non-success is a
/// request we should stop repeating.
pub fn error_for_status(status: reqwest::StatusCode, context: &str) -> TransportError {
    let err = anyhow::anyhow!("{context} returned HTTP {status}");
    if status.as_u16() == 429 || status.is_server_error() {
        TransportError::Retryable(err)
    } else {
        TransportError::Fatal(err)
    }
}

/// Classify a reqwest error. Connection-level trouble is retryable;
/// a response body that fails to decode is malformed and fatal.
pub fn classify_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_decode() || err.is_builder() {
        TransportError::Fatal(err.into())
    } else {
        TransportError::Retryable(err.into())
    }
}

/// The retrying wrapper. Cheap to clone; every clone shares the same
/// policy and nothing else.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryingTransport {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Run `call` under the retry policy. `call` is invoked once per
    /// attempt and must produce a fresh future each time; each attempt is
    /// separately bounded by `attempt_timeout`.
    pub async fn execute<T, F, Fut>(
        &self,
        op: &str,
        attempt_timeout: Duration,
        mut call: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let outcome = match tokio::time::timeout(attempt_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::AttemptTimeout(attempt_timeout)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op, attempt, "operation recovered after retries");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_retries {
                        warn!(op, attempts = attempt, error = %err, "retry budget exhausted");
                        return Err(TransportError::Exhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        op,
                        attempt,
                        max_attempts = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "attempt failed — backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(op, attempt, error = %err, "permanent failure — not retrying");
                    return Err(err);
                }
            }
        }
    }

    /// Delay before the next attempt, given how many attempts have
    /// already completed: initial * 2^(completed - 1), capped.
    fn backoff_delay(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1).min(20);
        let raw = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent));
        raw.min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn transport() -> RetryingTransport {
        RetryingTransport::new(5, Duration::from_secs(1), Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_fifth_attempt_with_doubling_backoff() {
        let attempts = Arc::new(AtomicU32::new(0));
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        let result = {
            let attempts = attempts.clone();
            let stamps = stamps.clone();
            transport()
                .execute("test", Duration::from_secs(30), move || {
                    let attempts = attempts.clone();
                    let stamps = stamps.clone();
                    async move {
                        stamps.lock().unwrap().push(Instant::now());
                        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 5 {
                            Err(TransportError::Retryable(anyhow::anyhow!("flaky")))
                        } else {
                            Ok(42u32)
                        }
                    }
                })
                .await
        };

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);

        let stamps = stamps.lock().unwrap();
        let gaps: Vec<u64> = stamps
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_exactly_max_retries() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = {
            let attempts = attempts.clone();
            transport()
                .execute("test", Duration::from_secs(30), move || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(TransportError::Retryable(anyhow::anyhow!("down hard")))
                    }
                })
                .await
        };

        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        match result.unwrap_err() {
            TransportError::Exhausted { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_do_not_consume_retry_budget() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = {
            let attempts = attempts.clone();
            transport()
                .execute("test", Duration::from_secs(30), move || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(TransportError::Fatal(anyhow::anyhow!("404 forever")))
                    }
                })
                .await
        };

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), TransportError::Fatal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempts_time_out_and_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let short = RetryingTransport::new(2, Duration::from_secs(1), Duration::from_secs(300));

        let result: Result<(), _> = {
            let attempts = attempts.clone();
            short
                .execute("test", Duration::from_secs(10), move || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(())
                    }
                })
                .await
        };

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        match result.unwrap_err() {
            TransportError::Exhausted { last, .. } => {
                assert!(matches!(*last, TransportError::AttemptTimeout(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped_at_max() {
        let capped = RetryingTransport::new(10, Duration::from_secs(1), Duration::from_secs(4));
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(AtomicU32::new(0));

        let _result: Result<(), _> = {
            let stamps = stamps.clone();
            let attempts = attempts.clone();
            capped
                .execute("test", Duration::from_secs(30), move || {
                    let stamps = stamps.clone();
                    let attempts = attempts.clone();
                    async move {
                        stamps.lock().unwrap().push(Instant::now());
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(TransportError::Retryable(anyhow::anyhow!("still down")))
                    }
                })
                .await
        };

        let stamps = stamps.lock().unwrap();
        let gaps: Vec<u64> = stamps
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        // 1, 2, then pinned at the 4-second ceiling.
        assert_eq!(gaps, vec![1, 2, 4, 4, 4, 4, 4, 4, 4]);
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, "feed"),
            TransportError::Retryable(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, "feed"),
            TransportError::Retryable(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, "feed"),
            TransportError::Fatal(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, "feed"),
            TransportError::Fatal(_)
        ));
    }
}
