//! Protection for any fallible operation: rate-limit-aware exponential
//! backoff and a three-phase circuit breaker.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{BackoffError, BackoffPolicy, BackoffRetrier, RateLimitAware};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitPhase, CircuitState,
};
