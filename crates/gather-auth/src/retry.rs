//! Bounded retry with pluggable delay policies.
//!
//! [`retry_with_policy`] drives an async operation until it succeeds, the
//! retry predicate rejects the error, the attempt budget runs out, or the
//! caller cancels. The refresh coordinator leans on it to retry transient
//! refresh failures without retrying definitive rejections.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Delay schedule applied before retry attempts.
///
/// Attempt 0 never waits; the delay for attempt `n > 0` depends on the
/// policy.
#[derive(Clone)]
pub enum DelayPolicy {
    /// No delay between attempts
    Immediate,
    /// The same delay before every retry
    Constant(Duration),
    /// `min(max_delay, initial * multiplier^(attempt - 1))`
    Exponential {
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
    /// Caller-provided schedule
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl DelayPolicy {
    /// Delay applied before the given attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Constant(delay) => *delay,
            Self::Exponential {
                initial,
                multiplier,
                max_delay,
            } => {
                let scaled = initial.as_secs_f64() * multiplier.powi(attempt as i32 - 1);
                Duration::from_secs_f64(scaled.min(max_delay.as_secs_f64()))
            }
            Self::Custom(schedule) => schedule(attempt),
        }
    }
}

impl fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "Immediate"),
            Self::Constant(delay) => f.debug_tuple("Constant").field(delay).finish(),
            Self::Exponential {
                initial,
                multiplier,
                max_delay,
            } => f
                .debug_struct("Exponential")
                .field("initial", initial)
                .field("multiplier", multiplier)
                .field("max_delay", max_delay)
                .finish(),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Failure of a retried operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The caller cancelled; cancellation is re-raised, never retried
    #[error("operation cancelled")]
    Cancelled,

    /// The operation failed and the predicate or budget stopped the loop
    #[error("{0}")]
    Operation(E),
}

/// Repeatedly invoke `attempt` until it succeeds, `should_retry` rejects the
/// error, the budget runs out, or `cancel` fires.
///
/// `attempts_left` counts *additional* attempts: a budget of 0 runs the
/// operation exactly once. The delay policy is consulted only before attempts
/// after the first. On exhaustion or rejection the last observed error is
/// returned.
pub async fn retry_with_policy<T, E, F, Fut>(
    should_retry: impl Fn(&E) -> bool,
    delay_policy: DelayPolicy,
    attempts_left: u32,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts_left = attempts_left;
    let mut current_attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let delay = delay_policy.delay_for(current_attempt);
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = sleep(delay) => {}
            }
        }

        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                // Cancellation observed during the attempt is re-raised even
                // when the predicate would accept the error.
                if cancel.is_cancelled() {
                    return Err(RetryError::Cancelled);
                }
                if !should_retry(&error) || attempts_left == 0 {
                    return Err(RetryError::Operation(error));
                }
                attempts_left -= 1;
                current_attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn count_attempts() -> (Arc<AtomicU32>, impl Fn() -> u32) {
        let counter = Arc::new(AtomicU32::new(0));
        let reader = {
            let counter = Arc::clone(&counter);
            move || counter.load(Ordering::SeqCst)
        };
        (counter, reader)
    }

    #[tokio::test]
    async fn zero_budget_runs_exactly_once() {
        let (counter, attempts) = count_attempts();
        let cancel = CancellationToken::new();

        let result: Result<u32, _> = retry_with_policy(
            |_: &&str| true,
            DelayPolicy::Immediate,
            0,
            &cancel,
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("boom")
                }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Operation("boom")));
        assert_eq!(attempts(), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let (counter, attempts) = count_attempts();
        let cancel = CancellationToken::new();

        let result = retry_with_policy(
            |_: &&str| true,
            DelayPolicy::Immediate,
            5,
            &cancel,
            || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts(), 3);
    }

    #[tokio::test]
    async fn predicate_rejection_stops_immediately() {
        let (counter, attempts) = count_attempts();
        let cancel = CancellationToken::new();

        let result: Result<u32, _> = retry_with_policy(
            |error: &&str| *error != "fatal",
            DelayPolicy::Immediate,
            5,
            &cancel,
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Operation("fatal")));
        assert_eq!(attempts(), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let (counter, attempts) = count_attempts();
        let cancel = CancellationToken::new();

        let result: Result<u32, _> = retry_with_policy(
            |_: &String| true,
            DelayPolicy::Immediate,
            2,
            &cancel,
            || {
                let counter = Arc::clone(&counter);
                async move { Err(format!("attempt {}", counter.fetch_add(1, Ordering::SeqCst))) }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Operation("attempt 2".to_string())));
        assert_eq!(attempts(), 3);
    }

    #[tokio::test]
    async fn pre_cancelled_token_aborts_before_any_attempt() {
        let (counter, attempts) = count_attempts();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<u32, _> = retry_with_policy(
            |_: &&str| true,
            DelayPolicy::Immediate,
            5,
            &cancel,
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("boom")
                }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(attempts(), 0);
    }

    #[tokio::test]
    async fn cancellation_during_attempt_is_not_masked_by_predicate() {
        let (counter, attempts) = count_attempts();
        let cancel = CancellationToken::new();

        let result: Result<u32, _> = retry_with_policy(
            // Predicate would happily retry this error.
            |_: &&str| true,
            DelayPolicy::Immediate,
            5,
            &cancel,
            || {
                let counter = Arc::clone(&counter);
                let cancel = cancel.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel();
                    Err("interrupted")
                }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_delay_applies_only_between_attempts() {
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let result: Result<u32, _> = retry_with_policy(
            |_: &&str| true,
            DelayPolicy::Constant(Duration::from_secs(1)),
            2,
            &cancel,
            || async { Err("boom") },
        )
        .await;

        assert_eq!(result, Err(RetryError::Operation("boom")));
        // Three attempts, delays before the second and third only.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn exponential_delay_table_matches_contract() {
        let policy = DelayPolicy::Exponential {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        };

        let delays: Vec<u64> = (0..=6).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn first_attempt_never_waits() {
        let constant = DelayPolicy::Constant(Duration::from_secs(30));
        assert_eq!(constant.delay_for(0), Duration::ZERO);

        let custom = DelayPolicy::Custom(Arc::new(|attempt| Duration::from_secs(attempt as u64)));
        assert_eq!(custom.delay_for(0), Duration::ZERO);
        assert_eq!(custom.delay_for(3), Duration::from_secs(3));
    }

    #[test]
    fn immediate_policy_is_always_zero() {
        let policy = DelayPolicy::Immediate;
        for attempt in 0..5 {
            assert_eq!(policy.delay_for(attempt), Duration::ZERO);
        }
    }
}
