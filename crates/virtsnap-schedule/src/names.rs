//! Snapshot name generation
//!
//! Names follow `"<schedule>-<vm>-YYYYMMDD-HHMMSS"` (UTC). The timestamp
//! has second granularity, which also makes same-minute re-reconciles
//! idempotent: the second create hits AlreadyExists and is treated as
//! success. Names that would exceed the Kubernetes object-name limit are
//! truncated and suffixed with a digest of the full name.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use virtsnap_common::MAX_NAME_LENGTH;

/// Hex characters of the digest suffix appended to truncated names
const HASH_SUFFIX_LEN: usize = 16;

/// Build the name for a snapshot fired at the given instant.
pub fn snapshot_name(schedule: &str, vm: &str, fired_at: DateTime<Utc>) -> String {
    let name = format!("{}-{}-{}", schedule, vm, fired_at.format("%Y%m%d-%H%M%S"));
    if name.len() <= MAX_NAME_LENGTH {
        return name;
    }

    let digest = Sha256::digest(name.as_bytes());
    let hash: String = digest
        .iter()
        .take(HASH_SUFFIX_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect();

    let keep = MAX_NAME_LENGTH - HASH_SUFFIX_LEN - 1;
    let prefix: String = name.chars().take(keep).collect();
    format!("{}-{}", prefix.trim_end_matches('-'), hash)
}
