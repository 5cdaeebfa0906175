//! Bounded exponential-backoff retries under a shared deadline.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;
use crate::fetch::context::FetchContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based).
    ///
    /// `min(initial * multiplier^(attempt-1), max)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }

    /// Sum of every backoff wait if all attempts fail.
    #[must_use]
    pub fn worst_case_delay(&self) -> Duration {
        (1..self.max_attempts).map(|n| self.backoff(n)).sum()
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` runs are used up.
///
/// Each attempt and each wait between attempts races `ctx`; if the context
/// finishes first its error is returned immediately. Otherwise the last
/// observed error is returned unchanged.
pub async fn with_backoff<T, F, Fut>(
    ctx: &FetchContext,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match ctx.run(operation()).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= max_attempts {
            tracing::debug!(attempts = attempt, error = %err, "retries exhausted");
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        tracing::debug!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "attempt failed, backing off"
        );
        ctx.sleep(delay).await?;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use bytes::Bytes;
    use tokio::time::Instant;

    use super::*;

    fn transport() -> FetchError {
        FetchError::Transport {
            message: "connection refused".into(),
        }
    }

    #[test]
    fn backoff_schedule_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        };
        let schedule: Vec<_> = (1..=5).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(schedule, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn worst_case_of_defaults() {
        assert_eq!(
            RetryPolicy::default().worst_case_delay(),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn huge_exponent_saturates_to_max() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 10.0,
        };
        assert_eq!(policy.backoff(400), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_runs_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let ctx = FetchContext::with_timeout(Duration::from_secs(60));
        let err = with_backoff(&ctx, &RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(FetchError::UpstreamStatus {
                status: 503,
                body: Bytes::from_static(b"down"),
            })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.upstream_status(), Some(503));
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_retrying() {
        let calls = AtomicU32::new(0);
        let ctx = FetchContext::with_timeout(Duration::from_secs(60));
        let value = with_backoff(&ctx, &RetryPolicy::default(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(transport())
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let ctx = FetchContext::with_timeout(Duration::from_secs(60));
        let err = with_backoff(&ctx, &RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(FetchError::Decode {
                message: "expected value".into(),
                body: Bytes::new(),
            })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_backoff_short() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        };
        let ctx = FetchContext::with_timeout(Duration::from_millis(1500));
        let start = Instant::now();
        let calls = AtomicU32::new(0);

        let err = with_backoff(&ctx, &policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(transport())
        })
        .await
        .unwrap_err();

        // Attempt at t=0, wait 1s, attempt at t=1s, then the 2s wait is cut
        // off by the deadline at t=1.5s.
        assert!(matches!(err, FetchError::DeadlineExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_is_abandoned_at_deadline() {
        let ctx = FetchContext::with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let err = with_backoff(&ctx, &RetryPolicy::default(), || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, FetchError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::DeadlineExceeded));
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_open_consumes_attempts() {
        let calls = AtomicU32::new(0);
        let ctx = FetchContext::with_timeout(Duration::from_secs(60));
        let err = with_backoff(&ctx, &RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(FetchError::BreakerOpen {
                endpoint: "http://svc:80".into(),
            })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, FetchError::BreakerOpen { .. }));
    }
}
