//! Bounded retry shared by the document fetcher and the model client.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Delay schedule between attempts. `attempt` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base ^ attempt` seconds.
    Exponential { base: f64 },
    /// `step * (attempt + 1)`.
    Linear { step: Duration },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential { base } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                Duration::try_from_secs_f64(base.powi(exponent)).unwrap_or(Duration::ZERO)
            }
            Backoff::Linear { step } => step.saturating_mul(attempt.saturating_add(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

#[derive(Error, Debug, PartialEq)]
pub enum RetryError<E> {
    /// The predicate classified the error as not worth retrying.
    #[error("{0}")]
    Fatal(E),
    #[error("{last} (gave up after {attempts} attempts)")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 0-based attempt index.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
                Err(e) => {
                    if attempt + 1 >= attempts {
                        tracing::warn!(op = label, attempts, error = %e, "retries exhausted");
                        return Err(RetryError::Exhausted { attempts, last: e });
                    }
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        op = label,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
