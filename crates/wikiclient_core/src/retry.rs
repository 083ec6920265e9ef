use std::time::Duration;

use crate::error::WikiError;

/// Backoff for server-signalled replication lag (`maxlag`).
///
/// This is the only automatic retry path; every other failure propagates
/// to the caller on first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_idle: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_idle: Duration) -> Self {
        Self {
            max_retries,
            initial_idle,
        }
    }

    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempts: 0,
            idle: self.initial_idle,
        }
    }
}

/// Per-request backoff state. One is created for every logical request.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: usize,
    idle: Duration,
}

impl Backoff {
    /// Returns how long to sleep before retrying, or `RateLimitExhausted`
    /// once `max_retries` retries have already been spent.
    pub fn next_delay(&mut self) -> Result<Duration, WikiError> {
        if self.attempts >= self.policy.max_retries {
            return Err(WikiError::RateLimitExhausted {
                attempts: self.attempts,
            });
        }
        let delay = self.idle;
        self.attempts += 1;
        self.idle = self.idle.saturating_mul(2);
        Ok(delay)
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}
