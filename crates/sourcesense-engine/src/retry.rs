//! Bounded retry with an injected backoff policy

use sourcesense_core::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every attempt
    Fixed(Duration),

    /// Doubling delay, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the 1-based `attempt` failed
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Fixed-delay policy from the `[retry]` config section
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Backoff::Fixed(Duration::from_secs(config.delay_secs)),
        )
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted
    ///
    /// `on_wait(attempt, delay)` is called before each sleep so callers can
    /// publish that a wait is in progress. At least one attempt is made.
    pub async fn run<T, E, Op, Fut, Retry, Wait>(
        &self,
        mut op: Op,
        should_retry: Retry,
        mut on_wait: Wait,
    ) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Retry: Fn(&E) -> bool,
        Wait: FnMut(u32, Duration),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && should_retry(&e) => {
                    let delay = self.backoff.delay(attempt);
                    on_wait(attempt, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
