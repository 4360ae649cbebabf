//! Exponential backoff shared by every fallible step: opening connections,
//! one-shot RPC calls, and receipt polling.
//!
//! The delay between attempt `i` and attempt `i + 1` is `initial_delay * 2^(i-1)`,
//! or a constant `initial_delay` for [`RetryPolicy::fixed`] polling.
//! Every sleep races the cancellation token, so a cancelled run never starts
//! another attempt.

use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Error;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
/// One initial try plus eight retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
    /// Growth of the delay per failed attempt; 1 keeps it constant.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS)
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    #[error("non-retryable failure on attempt {attempts}: {error}")]
    Fatal { attempts: u32, error: E },
}

impl<E: Display> RetryError<E> {
    /// Flattens into the crate error, naming the operation that gave up.
    pub fn into_error(self, label: impl Into<String>) -> Error {
        let label = label.into();
        match self {
            RetryError::Cancelled { .. } => Error::Cancelled { label },
            RetryError::Exhausted {
                attempts,
                last_error,
            }
            | RetryError::Fatal {
                attempts,
                error: last_error,
            } => Error::RetryExhausted {
                label,
                attempts,
                last_error: last_error.to_string(),
            },
        }
    }
}

/// What a [`Backoff`] decided after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffStep {
    /// Slept for the given delay; the next attempt may begin.
    Retry(Duration),
    Exhausted,
    Cancelled,
}

/// Stateful view of a [`RetryPolicy`] for loops that keep `&mut` state
/// across attempts.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed attempt, then sleeps until the next attempt is due.
    pub async fn failed(&mut self, cancel: &CancellationToken) -> BackoffStep {
        self.failures += 1;
        if cancel.is_cancelled() {
            return BackoffStep::Cancelled;
        }
        if self.failures >= self.policy.max_attempts {
            return BackoffStep::Exhausted;
        }
        let delay = self.policy.delay_after(self.failures);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => BackoffStep::Cancelled,
            _ = tokio::time::sleep(delay) => BackoffStep::Retry(delay),
        }
    }
}

impl RetryPolicy {
    pub const fn new(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_attempts,
            factor: 2,
        }
    }

    /// Same delay before every attempt.
    pub const fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: interval,
            max_attempts,
            factor: 1,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            failures: 0,
        }
    }

    /// Delay before the attempt that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        self.initial_delay
            .saturating_mul(self.factor.saturating_pow(exp))
    }

    /// Runs `op` until it succeeds, treating every error as retryable.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn retry<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        label: &str,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.retry_if(cancel, label, op, |_| true).await
    }

    /// Like [`RetryPolicy::retry`], but stops on the first error for which
    /// `retryable` returns false.
    pub async fn retry_if<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        label: &str,
        mut op: F,
        retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut backoff = self.backoff();
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: backoff.failures(),
                });
            }
            let attempt = backoff.failures() + 1;
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !retryable(&error) {
                return Err(RetryError::Fatal {
                    attempts: attempt,
                    error,
                });
            }
            match backoff.failed(cancel).await {
                BackoffStep::Retry(delay) => {
                    warn!("failed to execute {label}: {error}. retry #{attempt} in {delay:?}");
                }
                BackoffStep::Exhausted => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                BackoffStep::Cancelled => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn delays_double_from_initial() {
        let policy = RetryPolicy::new(Duration::from_millis(100), 5);
        let delays = (1..=4).map(|i| policy.delay_after(i)).collect::<Vec<_>>();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn fixed_policy_keeps_the_interval() {
        let policy = RetryPolicy::fixed(Duration::from_millis(500), 21);
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(20), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn makes_at_most_max_attempts_with_doubling_gaps() {
        let policy = RetryPolicy::new(Duration::from_millis(50), 4);
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let stamps = Arc::new(Mutex::new(vec![]));

        let res: Result<(), _> = policy
            .retry(&cancel, "always fails", |_| {
                let stamps = stamps.clone();
                async move {
                    stamps.lock().unwrap().push(started.elapsed());
                    Err("boom")
                }
            })
            .await;

        match res {
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let stamps = stamps.lock().unwrap().clone();
        assert_eq!(stamps.len(), 4);
        let gaps = stamps.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(200),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let res = policy
            .retry(&cancel, "flaky", |attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(res.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_immediately_on_non_retryable_error() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0));
        let res: Result<(), _> = policy
            .retry_if(
                &cancel,
                "fatal",
                |_| {
                    let calls = calls.clone();
                    async move {
                        *calls.lock().unwrap() += 1;
                        Err("insufficient funds")
                    }
                },
                |e| !e.contains("insufficient funds"),
            )
            .await;
        assert!(matches!(res, Err(RetryError::Fatal { attempts: 1, .. })));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_prevents_new_attempts() {
        let policy = RetryPolicy::new(Duration::from_secs(10), 100);
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            canceller.cancel();
        });

        let res: Result<(), _> = policy
            .retry(&cancel, "cancelled", |_| {
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    Err("down")
                }
            })
            .await;

        // attempts at t=0 and t=10s; the 20s sleep is interrupted at t=15s
        assert!(matches!(res, Err(RetryError::Cancelled { attempts: 2 })));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn already_cancelled_token_never_runs_op() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(Mutex::new(0));
        let res: Result<(), RetryError<&str>> = RetryPolicy::default()
            .retry(&cancel, "noop", |_| {
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    Ok(())
                }
            })
            .await;
        assert!(matches!(res, Err(RetryError::Cancelled { attempts: 0 })));
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
