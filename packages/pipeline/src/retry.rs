//! Per-query retry and timeout policy.
//!
//! The clients in [`cellplan_feeds`] issue exactly one request per call.
//! The orchestrator wraps every call in [`run_query`], which adds:
//!
//! 1. an optional timeout per attempt (reported as
//!    [`QueryError::SourceUnavailable`]),
//! 2. exponential backoff retries for transport failures,
//! 3. retries for malformed bodies only when explicitly enabled.
//!
//! [`QueryError::NoData`] is an answer, not a failure, and is never
//! retried. Retrying stops as soon as the owning generation is superseded.

use std::future::Future;
use std::time::Duration;

use cellplan_feeds::QueryError;
use serde::Deserialize;

/// Largest backoff exponent; keeps the shift from overflowing.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// How failed queries are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,
    /// Whether [`QueryError::MalformedResponse`] is retried.
    pub retry_malformed: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 500,
            retry_malformed: false,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn should_retry(&self, error: &QueryError) -> bool {
        match error {
            QueryError::SourceUnavailable { .. } => true,
            QueryError::MalformedResponse { .. } => self.retry_malformed,
            QueryError::NoData => false,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << shift))
    }
}

/// Runs `query` under `policy`, applying `timeout` to each attempt.
///
/// `still_wanted` is consulted before every retry; once it returns
/// `false` the last error is returned without further attempts.
///
/// # Errors
///
/// Returns the final [`QueryError`] once retries are exhausted, the error
/// is not retryable, or the result is no longer wanted.
pub async fn run_query<T, F, Fut, W>(
    label: &str,
    policy: &RetryPolicy,
    timeout: Option<Duration>,
    still_wanted: W,
    query: F,
) -> Result<T, QueryError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
    W: Fn() -> bool,
{
    let mut attempt = 0;

    loop {
        let result = with_timeout(timeout, query()).await;

        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= policy.max_retries || !policy.should_retry(&error) {
            return Err(error);
        }
        if !still_wanted() {
            log::debug!("{label}: superseded, not retrying after: {error}");
            return Err(error);
        }

        attempt += 1;
        let delay = policy.delay(attempt);
        log::warn!(
            "{label}: {error} (retry {attempt}/{} in {delay:?})",
            policy.max_retries
        );
        tokio::time::sleep(delay).await;
    }
}

async fn with_timeout<T, Fut>(timeout: Option<Duration>, query: Fut) -> Result<T, QueryError>
where
    Fut: Future<Output = Result<T, QueryError>>,
{
    let Some(limit) = timeout else {
        return query.await;
    };

    tokio::time::timeout(limit, query)
        .await
        .unwrap_or_else(|_| {
            Err(QueryError::SourceUnavailable {
                message: format!("timed out after {limit:?}"),
            })
        })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn unavailable() -> QueryError {
        QueryError::SourceUnavailable {
            message: "HTTP 503".to_string(),
        }
    }

    fn malformed() -> QueryError {
        QueryError::MalformedResponse {
            message: "truncated".to_string(),
        }
    }

    const fn policy(max_retries: u32, retry_malformed: bool) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 0,
            retry_malformed,
        }
    }

    #[test]
    fn delay_doubles() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn no_data_is_never_retried() {
        assert!(!policy(5, true).should_retry(&QueryError::NoData));
        assert!(policy(5, false).should_retry(&unavailable()));
        assert!(!policy(5, false).should_retry(&malformed()));
        assert!(policy(5, true).should_retry(&malformed()));
    }

    #[tokio::test]
    async fn retries_transport_failures_until_success() {
        let calls = &AtomicU32::new(0);
        let result = run_query("test", &policy(3, false), None, || true, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let query = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(unavailable())
        };
        let result = run_query("test", &policy(2, false), None, || true, query).await;

        assert_eq!(result, Err(unavailable()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_is_not_retried_by_default() {
        let calls = &AtomicU32::new(0);
        let query = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(malformed())
        };
        let result = run_query("test", &policy(4, false), None, || true, query).await;

        assert_eq!(result, Err(malformed()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_retrying_when_superseded() {
        let calls = &AtomicU32::new(0);
        let query = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(unavailable())
        };
        let result = run_query("test", &policy(4, false), None, || false, query).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_unavailable() {
        let result: Result<(), _> = run_query(
            "test",
            &policy(0, false),
            Some(Duration::from_millis(10)),
            || true,
            || std::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(QueryError::SourceUnavailable { .. })));
    }
}
