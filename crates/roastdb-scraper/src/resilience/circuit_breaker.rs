//! Three-phase circuit breaker for a downstream dependency.
//!
//! ```text
//!   Closed --(failure_count reaches failure_threshold)--> Open
//!   Open   --(next call after `timeout` since last failure)--> HalfOpen
//!   HalfOpen --(any failure)--> Open
//!   HalfOpen --(success_threshold consecutive successes)--> Closed
//! ```
//!
//! In `Closed`, each success decrements `failure_count` toward zero rather
//! than resetting it, so sustained intermittent failure still trips.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitPhase::Closed => write!(f, "closed"),
            CircuitPhase::Open => write!(f, "open"),
            CircuitPhase::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitState {
    pub phase: CircuitPhase,
    pub failure_count: u32,
    /// Consecutive successes while half-open.
    pub success_count: u32,
    pub last_failure_time: Option<Instant>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Rejected without invoking the operation.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }
}

/// One breaker per protected operation kind, shared by every caller of it.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(CircuitState::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn phase(&self) -> CircuitPhase {
        self.lock().phase
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().clone()
    }

    /// Invokes `operation` unless the breaker is open, recording the
    /// outcome.
    ///
    /// # Errors
    ///
    /// [`CircuitError::Open`] without invoking `operation` while open;
    /// [`CircuitError::Inner`] when `operation` fails.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitError::Open {
                name: self.name.clone(),
            });
        }
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> bool {
        let mut state = self.lock();
        if state.phase != CircuitPhase::Open {
            return true;
        }
        let cooled = state
            .last_failure_time
            .is_none_or(|at| at.elapsed() > self.config.timeout);
        if cooled {
            state.phase = CircuitPhase::HalfOpen;
            state.success_count = 0;
            tracing::info!(breaker = %self.name, "circuit half-open, probing");
        }
        cooled
    }

    fn record_success(&self) {
        let mut state = self.lock();
        match state.phase {
            CircuitPhase::Closed => {
                state.failure_count = state.failure_count.saturating_sub(1);
            }
            CircuitPhase::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    state.phase = CircuitPhase::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    tracing::info!(breaker = %self.name, "circuit closed");
                }
            }
            CircuitPhase::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut state = self.lock();
        state.last_failure_time = Some(Instant::now());
        match state.phase {
            CircuitPhase::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    state.phase = CircuitPhase::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        "circuit opened"
                    );
                }
            }
            CircuitPhase::HalfOpen => {
                state.phase = CircuitPhase::Open;
                state.success_count = 0;
                tracing::warn!(breaker = %self.name, "probe failed, circuit reopened");
            }
            CircuitPhase::Open => {}
        }
    }
}
