//! Reconnection policy: a pure exponential-backoff-with-jitter timer.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INITIAL_DELAY, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER,
};

/// Parameters for the reconnection backoff sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectionConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// `-1` means unbounded attempts.
    pub max_attempts: i64,
    pub jitter_factor: f64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_attempts: -1,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Exponential-backoff timer with additive jitter and an attempt counter.
///
/// `next_delay` yields `min(initial * multiplier^attempt, max) * (1 +
/// U[0, jitter_factor])`, consuming one attempt each call. `reset` zeros the
/// counter on a successful connect.
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    config: ReconnectionConfig,
    attempt: u32,
}

impl ReconnectionPolicy {
    #[must_use]
    pub fn new(config: ReconnectionConfig) -> Self {
        Self { config, attempt: 0 }
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether another attempt should be made.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.config.max_attempts < 0 || i64::from(self.attempt) < self.config.max_attempts
    }

    /// Consume one attempt and return the delay to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let base_ms = (self.config.initial_delay.as_millis() as f64)
            * self.config.multiplier.powi(self.attempt as i32);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let jitter_ms = if self.config.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(0.0..=(capped_ms * self.config.jitter_factor))
        } else {
            0.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis((capped_ms + jitter_ms).round() as u64)
    }

    /// Zero the attempt counter, as done on any successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
