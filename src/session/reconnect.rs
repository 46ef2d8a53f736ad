//! Reconnect policy with exponential backoff
//!
//! `delay(n) = min(base * 2^n, max)`. The attempt counter is incremented
//! before the delay is computed, so the first retry waits `base * 2`.

use std::time::Duration;

/// Default number of failures before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Default delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Attempt counter and backoff schedule for one controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempts: u32,
    /// Failures tolerated before the session enters `Error`
    pub max_attempts: u32,
    /// Base delay (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ReconnectPolicy {
    /// Create a policy with a zeroed attempt counter
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Failures recorded since the last reset
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Backoff delay for attempt `n`
    #[must_use]
    pub fn delay(&self, n: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(n))
            .min(self.max_delay)
    }

    /// Record a failure and return the delay before the next attempt
    ///
    /// Returns `None` once `max_attempts` failures have been recorded; the
    /// counter stays at the cap until [`reset`](Self::reset).
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1).min(self.max_attempts);
        if self.attempts < self.max_attempts {
            Some(self.delay(self.attempts))
        } else {
            None
        }
    }

    /// Whether the failure budget is spent
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Zero the counter after a manual connect or a successful open
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }
}
