//! Retention selection for scheduled snapshots
//!
//! Given the snapshots a schedule holds for one VM, retention decides which
//! ones to delete under two simultaneous limits:
//!
//! - **age**: snapshots older than `expires` are removed
//! - **count**: of the snapshots surviving the age rule, the oldest beyond
//!   `maxCount` are removed
//!
//! The limits compose with OR, and the count rule runs after the age rule
//! so expired snapshots do not count against the cap. Selection depends
//! only on `(creationTimestamp, name)` and the policy, so it is fully
//! deterministic; equal timestamps fall back to name order.

use std::time::Duration;

use chrono::{DateTime, Utc};

use virtsnap_common::crd::RetentionPolicy;
use virtsnap_common::Error;

/// Parsed retention limits
#[derive(Debug, Clone, Default)]
pub struct RetentionLimits {
    /// Maximum snapshot age
    pub expires: Option<Duration>,
    /// Maximum snapshot count per VM
    pub max_count: Option<usize>,
}

impl RetentionLimits {
    /// Parse a retention policy's duration string and count bound.
    pub fn from_policy(schedule: &str, policy: &RetentionPolicy) -> Result<Self, Error> {
        let expires = match &policy.expires {
            Some(s) => Some(humantime::parse_duration(s).map_err(|e| {
                Error::validation_for(
                    schedule,
                    format!("invalid retention.expires {:?}: {}", s, e),
                )
            })?),
            None => None,
        };

        let max_count = match policy.max_count {
            Some(n) if n < 0 => {
                return Err(Error::validation_for(
                    schedule,
                    format!("retention.maxCount must be >= 0, got {}", n),
                ))
            }
            Some(n) => Some(n as usize),
            None => None,
        };

        Ok(Self { expires, max_count })
    }
}

/// Select the snapshots to delete for one VM.
///
/// `snapshots` are `(name, creationTimestamp)` pairs in any order; the
/// returned names are ordered oldest-first.
pub fn select_for_deletion(
    snapshots: &[(String, DateTime<Utc>)],
    limits: &RetentionLimits,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut sorted: Vec<&(String, DateTime<Utc>)> = snapshots.iter().collect();
    sorted.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut to_delete: Vec<String> = Vec::new();

    if let Some(expires) = limits.expires {
        let expires =
            chrono::Duration::from_std(expires).unwrap_or_else(|_| chrono::Duration::max_value());
        for (name, created) in &sorted {
            if now - *created > expires {
                to_delete.push(name.clone());
            }
        }
    }

    if let Some(max_count) = limits.max_count {
        let remaining: Vec<&(String, DateTime<Utc>)> = sorted
            .iter()
            .copied()
            .filter(|(name, _)| !to_delete.contains(name))
            .collect();
        if remaining.len() > max_count {
            let excess = remaining.len() - max_count;
            for (name, _) in remaining.into_iter().take(excess) {
                to_delete.push(name.clone());
            }
        }
    }

    to_delete
}
