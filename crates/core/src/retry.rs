//! Bounded exponential-backoff retry driver.
//!
//! A retry sequence runs its attempts strictly one after another. After the
//! `n`-th failure the next attempt is delayed by
//! `initial_delay * backoff_factor^n` (no jitter), as a cooperative tokio
//! sleep. The sequence completes exactly once: with the first success, or
//! with the last error once `max_attempts` attempts have failed.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Attempt bound and delay schedule for one retry sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
}

impl RetryPolicy {
    /// Create a policy. A bound of 0 is treated as a single attempt.
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_factor,
        }
    }

    /// Policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt that follows the `failures`-th failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let nanos =
            self.initial_delay.as_nanos() as f64 * self.backoff_factor.powi(failures as i32);
        if nanos.is_nan() || nanos <= 0.0 {
            Duration::ZERO
        } else if nanos >= u64::MAX as f64 {
            Duration::from_nanos(u64::MAX)
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

/// Run `worker` until it succeeds or the policy's attempt bound is reached.
///
/// Every error is retried. The worker receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, worker: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_when(policy, worker, |_| true).await
}

/// Like [`retry`], but stops early on errors for which `should_retry`
/// returns false; such an error completes the sequence immediately.
pub async fn retry_when<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut worker: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut failures: u32 = 0;

    loop {
        let attempt = failures + 1;
        match worker(attempt).await {
            Ok(value) => {
                if failures > 0 {
                    debug!(attempt, "Attempt succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) => {
                failures += 1;

                if failures >= policy.max_attempts {
                    warn!(
                        attempts = failures,
                        error = %e,
                        "Giving up after reaching attempt bound"
                    );
                    return Err(e);
                }

                if !should_retry(&e) {
                    debug!(attempt, error = %e, "Error is not retryable");
                    return Err(e);
                }

                let delay = policy.delay_for(failures);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );

                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_delay_schedule_is_pure_exponential() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_zero_attempt_bound_means_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), 2.0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_worker_runs_exactly_max_attempts() {
        for max_attempts in 1..=5 {
            let calls = Arc::new(AtomicU32::new(0));
            let policy = RetryPolicy::new(max_attempts, Duration::from_millis(10), 2.0);

            let counter = Arc::clone(&calls);
            let result: Result<(), String> = retry(&policy, move |attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(format!("failure {}", attempt))
                }
            })
            .await;

            assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
            assert_eq!(result.unwrap_err(), format!("failure {}", max_attempts));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_succeeding_after_k_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10), 2.0);

        let counter = Arc::clone(&calls);
        let result: Result<&str, String> = retry(&policy, move |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt <= 2 {
                    Err("not yet".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_does_not_sleep() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60), 2.0);
        let start = Instant::now();

        let result: Result<u32, String> = retry(&policy, |_| async { Ok(7) }).await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0);
        let start = Instant::now();

        let result: Result<(), String> = retry(&policy, |_| async { Err("nope".to_string()) }).await;

        assert!(result.is_err());
        // 200ms after the first failure, 400ms after the second.
        assert!(start.elapsed() >= Duration::from_millis(600));
        assert!(start.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10), 2.0);

        let counter = Arc::clone(&calls);
        let result: Result<(), String> = retry_when(
            &policy,
            move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
            |e: &String| e != "fatal",
        )
        .await;

        assert_eq!(result.unwrap_err(), "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_never_overlap() {
        let in_flight = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(4, Duration::from_millis(5), 1.0);

        let gauge = Arc::clone(&in_flight);
        let _: Result<(), String> = retry(&policy, move |_| {
            let gauge = Arc::clone(&gauge);
            async move {
                let concurrent = gauge.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                gauge.fetch_sub(1, Ordering::SeqCst);
                if concurrent > 1 {
                    panic!("attempts overlapped");
                }
                Err("again".to_string())
            }
        })
        .await;

        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }
}
