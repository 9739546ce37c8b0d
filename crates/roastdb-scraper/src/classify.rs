//! Outcome classification for a single HTTP attempt.
//!
//! | Outcome                         | Decision  |
//! |---------------------------------|-----------|
//! | timeout / connection failure    | `Retry`   |
//! | other transport failure         | `Fail`    |
//! | status < 400 (including 304)    | `Succeed` |
//! | 400–499 (including 429)         | `Fail`    |
//! | ≥ 500                           | `Retry`   |
//!
//! 429 is deliberately not retried here; adapters surface it as a
//! rate-limit signal that ends the current pagination pass.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Succeed,
    Retry,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    Timeout,
    Connect,
    Other,
}

impl TransportFault {
    #[must_use]
    pub fn of(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportFault::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            TransportFault::Connect
        } else {
            TransportFault::Other
        }
    }
}

/// What one attempt produced, stripped to what classification needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Status(u16),
    Transport(TransportFault),
}

#[must_use]
pub fn classify(outcome: AttemptOutcome) -> RetryDecision {
    match outcome {
        AttemptOutcome::Transport(TransportFault::Timeout | TransportFault::Connect) => {
            RetryDecision::Retry
        }
        AttemptOutcome::Transport(TransportFault::Other) => RetryDecision::Fail,
        AttemptOutcome::Status(status) if status < 400 => RetryDecision::Succeed,
        AttemptOutcome::Status(status) if status < 500 => RetryDecision::Fail,
        AttemptOutcome::Status(_) => RetryDecision::Retry,
    }
}
