use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::Clock;

/// Enforces a minimum gap between physical requests of one session.
///
/// The session calls `wait` while holding its request lock, so the recorded
/// issue time always belongs to the request that is about to go out.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request_at: None,
            request_count: 0,
        }
    }

    pub fn wait(&mut self, clock: &dyn Clock) {
        if let Some(last) = self.last_request_at {
            let elapsed = clock.now().saturating_duration_since(last);
            if elapsed < self.interval {
                let remaining = self.interval - elapsed;
                debug!(
                    wait_ms = remaining.as_millis() as u64,
                    "throttling before next API request"
                );
                clock.sleep(remaining);
            }
        }
        self.last_request_at = Some(clock.now());
        self.request_count += 1;
    }

    pub fn last_request_at(&self) -> Option<Instant> {
        self.last_request_at
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }
}
