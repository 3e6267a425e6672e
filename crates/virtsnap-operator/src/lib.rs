//! virtsnap operator library
//!
//! Exposes the controller runner and its configuration so integration
//! harnesses can embed the operator without going through the binary.

#![deny(missing_docs)]

pub mod controller_runner;

use std::time::Duration;

/// Number of parallel reconcile workers when the env var is unset
const DEFAULT_THREADINESS: u16 = 3;

/// Informer resync interval when the env var is unset
const DEFAULT_RESYNC_SECS: u64 = 300;

/// Controller configuration, read from the environment rather than flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Number of schedules reconciled concurrently
    pub threadiness: u16,
    /// Interval at which every known schedule is re-enqueued
    pub resync_period: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            threadiness: DEFAULT_THREADINESS,
            resync_period: Duration::from_secs(DEFAULT_RESYNC_SECS),
        }
    }
}

impl ControllerConfig {
    /// Read `VIRTSNAP_THREADINESS` and `VIRTSNAP_RESYNC_SECONDS`, falling
    /// back to the defaults on missing or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            threadiness: std::env::var("VIRTSNAP_THREADINESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.threadiness),
            resync_period: std::env::var("VIRTSNAP_RESYNC_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.resync_period),
        }
    }
}
