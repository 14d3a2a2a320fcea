//! Reconnection Policy
//!
//! Delay schedule between connection attempts. Venue sockets use a fixed
//! delay; the store's initial connect uses exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (1.0 keeps the delay fixed).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum number of attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Same delay before every attempt, no jitter, unlimited attempts.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Backoff for the store's initial connection. Retries until shutdown.
    #[must_use]
    pub const fn store_connect() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

/// Reconnection policy: stateful delay schedule.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;

        let delay = jittered(self.current_delay, self.config.jitter_factor);
        self.current_delay = self.grown(self.current_delay);
        Some(delay)
    }

    /// Wait for the next delay unless `cancel` fires first.
    ///
    /// Returns `false` if cancelled or attempts are exhausted.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let Some(delay) = self.next_delay() else {
            return false;
        };
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn grown(&self, delay: Duration) -> Duration {
        let factor = self.config.multiplier;
        if !factor.is_finite() || factor <= 0.0 {
            return self.config.initial_delay.min(self.config.max_delay);
        }
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }
}

fn jittered(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return delay;
    }

    let base = delay.as_secs_f64();
    let spread = base * factor;
    let offset: f64 = rand::rng().random_range(-spread..=spread);
    Duration::try_from_secs_f64((base + offset).max(0.001)).unwrap_or(delay)
}
