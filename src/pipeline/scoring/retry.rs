use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::client::LlmError;
use crate::config::RetryConfig;

/// Wait before retry number `attempt + 1`: `base × 2^attempt` plus uniform
/// jitter from the configured window.
pub fn backoff_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    let base = policy
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(16));
    let jitter = if policy.jitter_max_ms > policy.jitter_min_ms {
        rand::thread_rng().gen_range(policy.jitter_min_ms..=policy.jitter_max_ms)
    } else {
        policy.jitter_min_ms
    };
    Duration::from_millis(base.saturating_add(jitter))
}

/// Run `op` until it succeeds, fails with a non-transient error, or uses up
/// `policy.max_attempts` attempts. The last error is returned on exhaustion.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(policy, attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    kind = e.kind(),
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        kind = e.kind(),
                        error = %e,
                        "Retry attempts exhausted"
                    );
                } else {
                    tracing::error!(operation, kind = e.kind(), error = %e, "Non-retryable failure");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn transient() -> LlmError {
        LlmError::Transient {
            status: 503,
            body: "overloaded".into(),
        }
    }

    #[test]
    fn delay_doubles_with_jitter_window() {
        let policy = RetryConfig::default();
        for attempt in 0..3 {
            let delay = backoff_delay(&policy, attempt).as_millis() as u64;
            let base = 2_000 * (1 << attempt);
            assert!(delay >= base + 1_000, "attempt {attempt}: {delay}");
            assert!(delay <= base + 3_000, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn immediate_policy_has_no_delay() {
        assert_eq!(backoff_delay(&RetryConfig::immediate(3), 5), Duration::ZERO);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_retry(&RetryConfig::immediate(3), "test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(transient())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryConfig::immediate(3), "test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Timeout(format!("attempt {n}")))
        })
        .await;
        assert_eq!(result, Err(LlmError::Timeout("attempt 2".into())));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_error_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryConfig::immediate(3), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Request {
                status: 400,
                body: "bad".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(LlmError::Request { status: 400, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_sleeps_between_attempts() {
        let policy = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 100,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        };
        let start = tokio::time::Instant::now();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let _: Result<(), _> = with_retry(&policy, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
