//! Retry with exponential backoff and jitter for collaborator calls.
//!
//! Retries live below the verification state machine: a call site wraps its
//! ledger or storage invocation in a policy, only transient failures are
//! retried, and whatever survives the attempts surfaces unchanged.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::error::CollaboratorError;

/// Retry policy: (max attempts, base delay, jitter), plus an exponential
/// growth cap.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap on the exponentially growing delay
    pub max_delay: Duration,
    /// Backoff multiplier per attempt
    pub multiplier: f64,
    /// Jitter factor in [0.0, 1.0]; the delay varies by up to this fraction
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Policy for ledger index and descriptor reads.
    pub fn ledger() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            ..Self::default()
        }
    }

    /// Policy for object-storage content fetches (larger payloads, a little
    /// more patience).
    pub fn storage() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(20),
            ..Self::default()
        }
    }

    /// Tight policy for tests and in-memory collaborators.
    pub fn fast() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delayed = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delayed)
    }

    /// Run `operation`, retrying failures for which `should_retry` holds.
    pub async fn run_if<F, Fut, T, E, P>(
        &self,
        context: &str,
        operation: F,
        should_retry: P,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(context, attempts = attempt + 1, "call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= self.max_retries || !should_retry(&e) {
                        if attempt > 0 {
                            tracing::warn!(
                                context,
                                attempts = attempt + 1,
                                error = %e,
                                "call failed, retries exhausted"
                            );
                        }
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        context,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run `operation`, retrying only transient collaborator failures.
    pub async fn run_transient<F, Fut, T>(
        &self,
        context: &str,
        operation: F,
    ) -> Result<T, CollaboratorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        self.run_if(context, operation, CollaboratorError::is_transient).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        // Capped
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_varies_delay() {
        let policy = RetryPolicy::default().with_jitter(0.5);
        let delays: Vec<_> = (0..16).map(|_| policy.delay_for_attempt(2)).collect();
        let all_same = delays.iter().all(|d| *d == delays[0]);
        assert!(!all_same);
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let policy = RetryPolicy::fast();
        let result: Result<i32, CollaboratorError> =
            policy.run_transient("test", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::fast();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = policy
            .run_transient("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CollaboratorError::Timeout("slow".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let policy = RetryPolicy::fast();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), CollaboratorError> = policy
            .run_transient("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CollaboratorError::Malformed("bad payload".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let policy = RetryPolicy::fast().with_max_retries(2);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), CollaboratorError> = policy
            .run_transient("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CollaboratorError::Connection("reset".into()))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), CollaboratorError::Connection("reset".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }
}
