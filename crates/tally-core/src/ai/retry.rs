//! Retry with timeout and exponential backoff for model calls
//!
//! Every attempt gets its own [`CancellationToken`] and is bounded by the
//! policy timeout. A timed-out attempt has its token cancelled and its future
//! dropped, then counts as a failure like any other.
//!
//! Delays between attempts come from [`Backoff`], a small state machine that
//! only knows the attempt counter and the policy:
//! - normal failure after attempt `i` (zero-based): `base_delay * 2^i`
//! - failure whose message mentions a rate limit: fixed cooldown (60s default)
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can observe delays
//! without waiting on real timers.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry/timeout settings for a model call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (0 is treated as 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each retry
    pub base_delay: Duration,
    /// Upper bound on a single attempt
    pub timeout: Duration,
    /// Fixed delay after a rate-limited attempt
    pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Effective attempt count
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the zero-based attempt `attempt_index` failed
    pub fn delay_for(&self, attempt_index: u32, rate_limited: bool) -> Duration {
        if rate_limited {
            return self.rate_limit_cooldown;
        }
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt_index))
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait this long, then try again
    Retry(Duration),
    /// No attempts left
    Exhausted,
}

/// Attempt counter for one invocation
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
}

impl<'a> Backoff<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Zero-based index of the attempt currently in flight
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure of the current attempt and decide the next step
    pub fn on_failure(&mut self, error: &Error) -> Step {
        let index = self.attempt;
        if index + 1 >= self.policy.attempts() {
            return Step::Exhausted;
        }
        self.attempt += 1;
        Step::Retry(self.policy.delay_for(index, error.is_rate_limit()))
    }
}

/// Suspends the current task between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real timer-based sleeping
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Run `operation` under `policy`, retrying failures with backoff
///
/// `operation` is called once per attempt with a fresh cancellation token.
/// Returns the first successful result, or `Error::InvocationExhausted`
/// wrapping the last failure.
pub async fn invoke<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(policy);

    loop {
        let attempt = backoff.attempt() + 1;
        let cancel = CancellationToken::new();

        let outcome = match tokio::time::timeout(policy.timeout, operation(cancel.clone())).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(Error::Timeout(policy.timeout))
            }
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Model call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        match backoff.on_failure(&error) {
            Step::Retry(delay) => {
                warn!(
                    attempt,
                    max_attempts = policy.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Model call failed, retrying"
                );
                sleeper.sleep(delay).await;
            }
            Step::Exhausted => {
                warn!(attempts = attempt, error = %error, "Model call attempts exhausted");
                return Err(Error::InvocationExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy_ms(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            timeout: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_exponential_delay() {
        let policy = policy_ms(6, 1000);
        for index in 0..=4 {
            assert_eq!(
                policy.delay_for(index, false),
                Duration::from_millis(1000 * 2u64.pow(index))
            );
        }
    }

    #[test]
    fn test_rate_limit_delay_ignores_attempt_index() {
        let policy = policy_ms(6, 1000);
        for index in 0..5 {
            assert_eq!(policy.delay_for(index, true), Duration::from_millis(60000));
        }
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = policy_ms(3, 1000);
        let mut backoff = Backoff::new(&policy);
        let err = Error::Backend("connection reset".into());

        assert_eq!(backoff.on_failure(&err), Step::Retry(Duration::from_secs(1)));
        assert_eq!(backoff.on_failure(&err), Step::Retry(Duration::from_secs(2)));
        assert_eq!(backoff.on_failure(&err), Step::Exhausted);
        assert_eq!(backoff.attempt(), 2);
    }

    #[test]
    fn test_backoff_rate_limit_detected_from_message() {
        let policy = policy_ms(3, 1000);
        let mut backoff = Backoff::new(&policy);

        let err = Error::Backend("upstream said: rate limit reached".into());
        assert_eq!(backoff.on_failure(&err), Step::Retry(Duration::from_secs(60)));

        let err = Error::RateLimited("429".into());
        assert_eq!(backoff.on_failure(&err), Step::Retry(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = policy_ms(0, 1000);
        let mut backoff = Backoff::new(&policy);
        assert_eq!(backoff.on_failure(&Error::Cancelled), Step::Exhausted);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt_after_two_sleeps() {
        let policy = policy_ms(3, 1000);
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let result = invoke(&policy, &sleeper, |_cancel| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::Backend(format!("attempt {} failed", n)))
                } else {
                    Ok(format!("attempt {}", n))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "attempt 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_first_success_does_not_sleep() {
        let policy = policy_ms(3, 1000);
        let sleeper = RecordingSleeper::new();

        let result = invoke(&policy, &sleeper, |_cancel| async { Ok(7) })
            .await
            .unwrap();

        assert_eq!(result, 7);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_wraps_last_error() {
        let policy = policy_ms(3, 10);
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let err = invoke::<(), _, _>(&policy, &sleeper, |_cancel| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(Error::Backend(format!("failure {}", n))) }
        })
        .await
        .unwrap_err();

        match err {
            Error::InvocationExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "Model backend error: failure 3");
            }
            other => panic!("expected InvocationExhausted, got {:?}", other),
        }
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_attempts_use_cooldown() {
        let policy = policy_ms(3, 1000);
        let sleeper = RecordingSleeper::new();

        let err = invoke::<(), _, _>(&policy, &sleeper, |_cancel| async {
            Err(Error::RateLimited("too many requests".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InvocationExhausted { .. }));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(60), Duration::from_secs(60)]
        );
    }

    #[tokio::test]
    async fn test_timeout_cancels_attempt() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
            rate_limit_cooldown: Duration::from_secs(60),
        };
        let sleeper = RecordingSleeper::new();
        let tokens: Mutex<Vec<CancellationToken>> = Mutex::new(Vec::new());

        let err = invoke::<(), _, _>(&policy, &sleeper, |cancel| {
            tokens.lock().unwrap().push(cancel.clone());
            async move {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
        })
        .await
        .unwrap_err();

        match err {
            Error::InvocationExhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, Error::Timeout(_)));
            }
            other => panic!("expected InvocationExhausted, got {:?}", other),
        }

        let tokens = tokens.lock().unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| t.is_cancelled()));
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(1)]);
    }
}
