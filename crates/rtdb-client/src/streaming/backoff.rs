//! Reconnect delays for dropped streams
//!
//! Delays grow exponentially from `initial` up to `max`. There is no retry
//! limit: a subscription keeps reconnecting until it is cancelled or fails
//! fatally.

use std::time::Duration;

/// Exponential backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt
    pub initial: Duration,
    /// Upper bound on any single delay
    pub max: Duration,
    /// Growth factor applied per consecutive failure (at least 1.0)
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy; `max` is raised to `initial` and `multiplier` to 1.0
    /// when given smaller values.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            initial,
            max: max.max(initial),
            multiplier,
        }
    }

    /// Delay before reconnect number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.initial.is_zero() {
            return Duration::ZERO;
        }

        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Backoff state for one subscription
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Delay to wait now; each call counts as one failed attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Forget previous failures once a connection delivers data again
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failed attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
