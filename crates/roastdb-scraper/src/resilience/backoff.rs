//! Retry with exponential back-off and jitter for rate-limited operations.
//!
//! [`BackoffRetrier::run`] retries only errors that report themselves as
//! rate limited through [`RateLimitAware`]. Every other error is returned
//! immediately. Back-off schedule with the default policy:
//!
//! | Attempt | Sleep before next attempt  |
//! |---------|----------------------------|
//! | 1       | 30 s × 2⁰ ± 10 % jitter    |
//! | 2       | 30 s × 2¹ ± 10 % jitter    |
//! | 3       | none (terminal)            |
//!
//! Delays are capped at `max_delay`.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Errors that can signal a rate limit.
pub trait RateLimitAware {
    fn is_rate_limited(&self) -> bool;

    /// Server-suggested wait, e.g. from `Retry-After`.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Fractional jitter, e.g. `0.1` for ±10 %.
    pub jitter_range: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            max_attempts: 3,
            jitter_range: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered wait after failed attempt `attempt` (0-based):
    /// `min(base_delay * multiplier^attempt, max_delay)`.
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// `nominal * (1 + sample * jitter_range)`, capped at `max_delay`.
    /// `sample` is in `[-1.0, 1.0]`.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32, sample: f64) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let factor = 1.0 + sample.clamp(-1.0, 1.0) * self.jitter_range.abs();
        Duration::from_secs_f64((nominal * factor).max(0.0)).min(self.max_delay)
    }

    /// Nominal waits between consecutive attempts; `max_attempts - 1` items.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.nominal_delay(attempt))
    }
}

#[derive(Debug, Error)]
pub enum BackoffError<E> {
    /// Still rate limited after every attempt.
    #[error("still rate limited after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    /// A non-rate-limit error, returned without retrying.
    #[error(transparent)]
    Failed(E),
}

impl<E> BackoffError<E> {
    /// The underlying error either way.
    pub fn into_inner(self) -> E {
        match self {
            BackoffError::Exhausted { last, .. } | BackoffError::Failed(last) => last,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackoffRetrier {
    policy: BackoffPolicy,
}

impl BackoffRetrier {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails with a non-rate-limit error,
    /// or stays rate limited for `max_attempts` attempts.
    ///
    /// The wait is the jittered delay, or the error's `retry_after` hint
    /// when that is longer (never beyond `max_delay`).
    ///
    /// # Errors
    ///
    /// [`BackoffError::Failed`] for non-rate-limit errors,
    /// [`BackoffError::Exhausted`] once attempts run out.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, BackoffError<E>>
    where
        E: RateLimitAware + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_rate_limited() {
                return Err(BackoffError::Failed(err));
            }
            if attempt + 1 >= max_attempts {
                tracing::error!(label, attempts = attempt + 1, error = %err, "rate limit persisted, giving up");
                return Err(BackoffError::Exhausted {
                    attempts: attempt + 1,
                    last: err,
                });
            }

            let sample = rand::random::<f64>().mul_add(2.0, -1.0);
            let mut delay = self.policy.jittered_delay(attempt, sample);
            if let Some(hint) = err.retry_after() {
                delay = delay.max(hint.min(self.policy.max_delay));
            }
            tracing::warn!(
                label,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
