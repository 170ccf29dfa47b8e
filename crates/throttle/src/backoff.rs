//! Exponential backoff with full jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff configuration for bounded retry loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0.0 = deterministic, 1.0 = full jitter (delay drawn from [0, delay]).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 1.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (1-indexed). Exponential growth
    /// capped at `max_delay`, then jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(2_u32.saturating_pow(pow));
        let capped = raw.min(self.max_delay);
        apply_jitter(capped, self.jitter)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Full-jitter: delay * uniform(1 - jitter, 1). Spreads synchronized
/// retries so contending replicas do not stampede.
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let jitter = jitter.min(1.0);
    let factor: f64 = rand::rng().random_range((1.0 - jitter)..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
        }
    }

    #[test]
    fn exponential_growth_until_cap() {
        let config = no_jitter();
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
        assert_eq!(config.delay_for(4), Duration::from_millis(800));
        // Capped.
        assert_eq!(config.delay_for(5), Duration::from_secs(1));
        assert_eq!(config.delay_for(30), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = BackoffConfig {
            jitter: 1.0,
            ..no_jitter()
        };
        for attempt in 1..=6 {
            let deterministic = no_jitter().delay_for(attempt);
            for _ in 0..50 {
                let jittered = config.delay_for(attempt);
                assert!(jittered <= deterministic);
            }
        }
    }

    #[test]
    fn retry_attempt_limit() {
        let config = no_jitter();
        assert!(config.should_retry(1));
        assert!(config.should_retry(3));
        assert!(!config.should_retry(4));
        assert!(!config.should_retry(10));
    }
}
