//! Retry policy for failed pictogram fetches
//!
//! A failed fetch is not retried on the next call; the entry records a
//! `retry_after` instant computed from this policy and callers get a
//! `BackingOff` error until it passes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::defaults::{
    DEFAULT_FETCH_BACKOFF_MULTIPLIER, DEFAULT_FETCH_INITIAL_DELAY_MS, DEFAULT_FETCH_MAX_ATTEMPTS,
    DEFAULT_FETCH_MAX_DELAY_SECS,
};
use crate::config::duration_serde;
use crate::utils::jitter::generate_jitter_percent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Fetch attempts before the entry gives up until a manual refresh
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait after the first failure
    #[serde(default = "default_initial_delay", with = "duration_serde::duration")]
    pub initial_delay: Duration,
    /// Upper bound for any single wait
    #[serde(default = "default_max_delay", with = "duration_serde::duration")]
    pub max_delay: Duration,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Add up to 25% jitter to each wait
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    DEFAULT_FETCH_MAX_ATTEMPTS
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(DEFAULT_FETCH_INITIAL_DELAY_MS)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(DEFAULT_FETCH_MAX_DELAY_SECS)
}

fn default_backoff_multiplier() -> f64 {
    DEFAULT_FETCH_BACKOFF_MULTIPLIER
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Deterministic policy for tests and scripted runs
    pub fn fixed(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: initial_delay.saturating_mul(64),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    /// Wait imposed after the `attempt`-th consecutive failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let exponential_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.max(1.0).powi((attempt - 1) as i32);

        let delay_ms = exponential_delay.min(self.max_delay.as_millis() as f64) as u64;

        let final_delay = if self.jitter {
            delay_ms + generate_jitter_percent(delay_ms, 25)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
