//! Per-key exponential backoff for the error policy
//!
//! The controller runtime dedupes and serializes work per schedule key; this
//! tracker supplies the rate limiting half of the queue contract. Each
//! failed reconcile doubles the key's delay from a 1s base up to a 5m cap,
//! and a successful reconcile forgets the key so the next failure starts
//! over at the base delay.

use std::time::Duration;

use dashmap::DashMap;

/// Base delay for the first failure
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the delay
const MAX_DELAY: Duration = Duration::from_secs(300);

/// Exponent cap; beyond this the delay saturates at the maximum anyway
const MAX_SHIFT: u32 = 16;

/// Tracks consecutive failures per schedule key
pub struct BackoffTracker {
    attempts: DashMap<String, u32>,
    base: Duration,
    max: Duration,
}

impl Default for BackoffTracker {
    fn default() -> Self {
        Self::new(BASE_DELAY, MAX_DELAY)
    }
}

impl BackoffTracker {
    /// Create a tracker with the given base and cap
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            attempts: DashMap::new(),
            base,
            max,
        }
    }

    /// Record a failure for the key and return the delay before retrying
    pub fn delay(&self, key: &str) -> Duration {
        let mut entry = self.attempts.entry(key.to_string()).or_insert(0);
        *entry += 1;
        let shift = (*entry - 1).min(MAX_SHIFT);
        self.base
            .checked_mul(1u32 << shift)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Clear the key after a successful reconcile
    pub fn forget(&self, key: &str) {
        self.attempts.remove(key);
    }
}
