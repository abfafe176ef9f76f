use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ApiError;

/// Default retry budget: 4 retries, 5 total attempts.
const DEFAULT_MAX_RETRIES: u32 = 4;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Bounded retry with exponential backoff, shared by every outbound call to the
/// GitHub, Notion and summarizer services. Which failures are worth retrying
/// differs per service, so the predicate is supplied at the call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Run `op`, retrying while `retryable` matches and attempts remain.
    /// The wait before attempt n+1 is `base_delay * 2^n`. Non-retryable errors
    /// and the final attempt's error propagate unchanged.
    pub async fn execute<T, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        P: Fn(&ApiError) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && retryable(&err) => {
                    let delay = self.base_delay * 2u32.pow(attempt);
                    warn!(
                        "{} request failed ({}), retrying in {:.1}s",
                        err.service(),
                        err,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Service;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_millis(1))
    }

    fn rate_limited() -> ApiError {
        ApiError::Status {
            service: Service::Notion,
            status: 429,
            body: "rate limited".to_string(),
        }
    }

    fn bad_request() -> ApiError {
        ApiError::Status {
            service: Service::Notion,
            status: 400,
            body: "bad request".to_string(),
        }
    }

    fn retry_on_429(err: &ApiError) -> bool {
        matches!(err.status(), Some(429))
    }

    #[tokio::test]
    async fn test_success_after_k_retryable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy()
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        if n < 2 {
                            Err(rate_limited())
                        } else {
                            Ok("done")
                        }
                    }
                },
                retry_on_429,
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        // k failures then success means exactly k + 1 calls
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_after_max_plus_one_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = fast_policy()
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(rate_limited())
                    }
                },
                retry_on_429,
            )
            .await;

        assert_eq!(result.unwrap_err().status(), Some(429));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_non_retryable_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = fast_policy()
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(bad_request())
                    }
                },
                retry_on_429,
            )
            .await;

        assert_eq!(result.unwrap_err().status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_success_makes_one_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy()
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(42)
                    }
                },
                retry_on_429,
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let _: Result<(), _> = policy
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(rate_limited())
                    }
                },
                retry_on_429,
            )
            .await;

        // 1s after the first attempt, 2s after the second
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
