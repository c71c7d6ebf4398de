//! Retry policy
//!
//! Decides whether a failed attempt is re-run and how long to pause first.
//! The pause is fixed by default; exponential growth is an explicit opt-in.

use crate::client::error_classification::ErrorClass;
use std::time::Duration;

/// Inter-attempt delay strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Always wait `RetryConfig::delay`.
    Fixed,
    /// Wait `delay * multiplier^attempt`, capped at `max_delay`.
    Exponential { multiplier: f64, max_delay: Duration },
}

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            delay: Duration::from_millis(1000),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabled config with a fixed delay.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            enabled: true,
            max_retries,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Opt into exponential backoff. Non-finite or sub-1 multipliers fall back to 1.
    pub fn with_exponential_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self.backoff = Backoff::Exponential {
            multiplier,
            max_delay,
        };
        self
    }

    /// Upper bound on attempts for one logical call, the first included.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }
}

/// Decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// `attempt` is 0-based: the first failure is attempt 0.
    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        if !self.config.enabled || attempt >= self.config.max_retries {
            return false;
        }
        class.is_retryable()
    }

    /// Pause before the attempt following `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        match self.config.backoff {
            Backoff::Fixed => self.config.delay,
            Backoff::Exponential {
                multiplier,
                max_delay,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let scaled = self.config.delay.as_nanos() as f64 * multiplier.powi(exponent);
                if !scaled.is_finite() || scaled >= max_delay.as_nanos() as f64 {
                    max_delay
                } else {
                    Duration::from_nanos(scaled.round() as u64)
                }
            }
        }
    }

    pub fn decide(&self, class: ErrorClass, attempt: u32) -> Decision {
        if self.should_retry(class, attempt) {
            Decision::Retry {
                delay: self.next_delay(attempt),
            }
        } else {
            Decision::Fail
        }
    }
}
