//! Reconnect backoff policy.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Maximum number of consecutive failed attempts (`None` = retry forever).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Deterministic delay for the given attempt number, capped at
    /// `max_delay`. Attempt numbers start at 1.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_millis = (self.initial_delay.as_millis() as f64 * multiplier) as u64;
        Duration::from_millis(delay_millis).min(self.max_delay)
    }

    /// Delay for the given attempt with a uniform jitter factor in
    /// [0.5, 1.5) applied, still capped at `max_delay`.
    ///
    /// Jitter spreads the dial times of many channels reconnecting to the
    /// same unreachable endpoint.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_millis((base.as_millis() as f64 * factor) as u64);
        jittered.min(self.max_delay)
    }

    /// Check whether another reconnection attempt is allowed.
    #[must_use]
    pub fn should_reconnect(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}
