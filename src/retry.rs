//! Timeout plus a single retry for remote calls.
//!
//! Every remote collaborator (embedding providers, the OCR service) gets
//! the same policy: each attempt is bounded by `timeout`, a failed or
//! timed-out first attempt is retried exactly once after a fixed
//! `backoff`, and the second failure is returned to the caller.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

/// Attempts made per call: the first try and one retry.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout_secs: u64, backoff_ms: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            backoff: Duration::from_millis(backoff_ms),
        }
    }
}

/// Run `op` under `policy`. `what` names the call in errors and logs.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            tokio::time::sleep(policy.backoff).await;
        }
        let err = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => anyhow!("timed out after {:?}", policy.timeout),
        };
        warn!(attempt, error = %format!("{:#}", err), "{} failed", what);
        last_err = Some(err);
    }

    let err = last_err.unwrap_or_else(|| anyhow!("no attempt made"));
    Err(anyhow!(
        "{} failed after {} attempts: {:#}",
        what,
        MAX_ATTEMPTS,
        err
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_second_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let value = with_retry(fast(), "flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("transient");
            }
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exactly_one_retry() {
        let calls = AtomicU32::new(0);
        let err = with_retry(fast(), "broken", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("down"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.to_string().contains("broken failed after 2 attempts: down"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let err = with_retry(fast(), "slow", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
