//! Bounded retry with backoff
//!
//! One helper for every "poll until it works" loop in the host: backend health
//! polling during bootstrap and the initial supervisor start.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every failed attempt, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub const fn exponential(attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Exponential { initial, max },
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// What the final attempt produced
#[derive(Debug)]
pub enum LastAttempt<T, E> {
    /// Completed, but the predicate did not accept the value
    Rejected(T),
    /// The operation itself failed
    Failed(E),
}

/// Every attempt was used without an accepted result
#[derive(Debug)]
pub struct Exhausted<T, E> {
    pub attempts: u32,
    pub last: Option<LastAttempt<T, E>>,
}

impl<T, E: std::fmt::Display> std::fmt::Display for Exhausted<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.last {
            Some(LastAttempt::Failed(e)) => {
                write!(f, "gave up after {} attempts: {}", self.attempts, e)
            }
            Some(LastAttempt::Rejected(_)) => write!(
                f,
                "gave up after {} attempts: last result was not accepted",
                self.attempts
            ),
            None => write!(f, "no attempts were made"),
        }
    }
}

/// Run `op` until `accept` approves its output or the policy runs out
///
/// No delay follows the final attempt.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut op: F,
    accept: P,
) -> Result<T, Exhausted<T, E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
    E: std::fmt::Display,
{
    let mut last = None;

    for attempt in 1..=policy.attempts {
        match op(attempt).await {
            Ok(value) if accept(&value) => return Ok(value),
            Ok(value) => {
                debug!(attempt, max = policy.attempts, "Attempt not accepted");
                last = Some(LastAttempt::Rejected(value));
            }
            Err(e) => {
                debug!(attempt, max = policy.attempts, error = %e, "Attempt failed");
                last = Some(LastAttempt::Failed(e));
            }
        }

        if attempt < policy.attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Err(Exhausted {
        attempts: policy.attempts,
        last,
    })
}
