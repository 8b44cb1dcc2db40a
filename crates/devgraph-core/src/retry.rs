//! Bounded timeouts and exponential backoff for infrastructure calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::LimitsConfig;
use crate::error::{DevgraphError, DevgraphResult};

/// Timeout and retry settings for calls into the graph database or the
/// embeddings backend.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            max_retries: limits.max_retries,
            base_delay: Duration::from_millis(limits.retry_base_delay_ms),
            timeout: Duration::from_millis(limits.request_timeout_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` under the policy's timeout, retrying transient failures.
///
/// Non-transient errors return immediately. A transient failure that
/// outlives every retry escalates to `ServiceUnavailable`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> DevgraphResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DevgraphResult<T>>,
{
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(DevgraphError::Timeout {
                operation: operation.to_string(),
                elapsed: policy.timeout,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_transient() => {
                return Err(DevgraphError::unavailable(format!(
                    "{} failed after {} retries: {}",
                    operation, policy.max_retries, e
                )));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), "ping", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DevgraphError::transient("connection reset"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_retries() {
        let calls = AtomicU32::new(0);
        let result: DevgraphResult<()> = with_retry(&fast_policy(), "ping", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DevgraphError::transient("503"))
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
        assert!(!err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_validation_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: DevgraphResult<()> = with_retry(&fast_policy(), "create", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DevgraphError::validation("bad type"))
        })
        .await;
        assert_eq!(result.unwrap_err().code(), "VALIDATION");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        };
        let calls = AtomicU32::new(0);
        let result: DevgraphResult<()> = with_retry(&policy, "slow", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().code(), "SERVICE_UNAVAILABLE");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
