//! Per-key exponential backoff for failed reconciles
//!
//! The kube runtime asks `error_policy` how long to wait after a failure.
//! [`ErrorBackoff`] counts consecutive failures per SidecarWorkload and
//! answers with an exponentially growing, jittered delay. A successful
//! reconcile resets the count.

use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;

use crate::crd::ObjectKey;

/// Backoff tuning
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Un-jittered delay for the given 1-based failure count, capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Apply 0.5x to 1.5x jitter, still capped at `max_delay`
    fn jitter(&self, delay: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(
            (delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Consecutive-failure counts per SidecarWorkload
#[derive(Debug, Default)]
pub struct ErrorBackoff {
    config: BackoffConfig,
    failures: DashMap<ObjectKey, u32>,
}

impl ErrorBackoff {
    /// Create an empty backoff table
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let attempt = {
            let mut count = self.failures.entry(key.clone()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        self.config.jitter(self.config.delay_for_attempt(attempt))
    }

    /// Forget the failures for `key`
    pub fn reset(&self, key: &ObjectKey) {
        self.failures.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).map(|c| *c).unwrap_or(0)
    }
}
