//! Reconnect backoff.
//!
//! Delay before reconnect attempt `k` (zero-based):
//!
//! ```text
//! raw_k   = min(max_delay, base_delay * 2^k)
//! delay_k = max(delay_{k-1}, min(max_delay, raw_k * (1 + jitter_factor * r)))
//! ```
//!
//! with `r` uniform in `[0, 1)`. Jitter only ever stretches a delay, and
//! each delay is clamped to at least the previous one, so the sequence
//! is non-decreasing and never exceeds `max_delay`.
//!
//! Jitter therefore only spreads clients apart while the delay is still
//! ramping up. Once the raw delay reaches `max_delay`, every retry waits
//! exactly `max_delay`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default cap on the reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default jitter factor.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Reconnect delay parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Upward jitter, `0.0..=1.0` of the raw delay.
    pub jitter_factor: f64,
    /// Consecutive failed attempts before giving up (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffPolicy {
    /// Creates the default policy.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            max_attempts: None,
        }
    }

    /// Sets the base delay.
    #[inline]
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[inline]
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter factor.
    #[inline]
    #[must_use]
    pub const fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Gives up after `attempts` consecutive failures.
    #[inline]
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a delay is zero, the base exceeds the
    /// cap, or the jitter factor is outside `0.0..=1.0`.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(Error::config("backoff base delay must be non-zero"));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::config(format!(
                "backoff base delay {:?} exceeds max delay {:?}",
                self.base_delay, self.max_delay
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(Error::config(format!(
                "backoff jitter factor {} outside 0.0..=1.0",
                self.jitter_factor
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::config("backoff max attempts must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Stateful delay generator for one run of consecutive failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    last_delay: Duration,
}

impl Backoff {
    /// Creates a generator at attempt zero.
    #[inline]
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Returns the number of delays handed out since the last reset.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Returns to the base delay. Called after a successful connect.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_delay = Duration::ZERO;
    }

    /// Returns the next delay, or `None` once `max_attempts` is used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.next_delay_with(rand::random::<f64>())
    }

    /// Same as [`Backoff::next_delay`] with an explicit random sample in
    /// `[0, 1)`.
    pub fn next_delay_with(&mut self, random: f64) -> Option<Duration> {
        if self
            .policy
            .max_attempts
            .is_some_and(|max| self.attempt >= max)
        {
            return None;
        }

        let exponent = self.attempt.min(31);
        let raw = self
            .policy
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.policy.max_delay);

        let stretch = 1.0 + self.policy.jitter_factor * random.clamp(0.0, 1.0);
        let jittered = if stretch > 1.0 {
            raw.mul_f64(stretch).max(raw).min(self.policy.max_delay)
        } else {
            raw
        };
        let delay = jittered.max(self.last_delay);

        self.attempt += 1;
        self.last_delay = delay;

        Some(delay)
    }
}

// ============================================================================
// Tests
// ============================================================================
