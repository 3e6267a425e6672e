//! VirtualMachineSnapshot Custom Resource Definition
//!
//! A VirtualMachineSnapshot is a request that a VM be captured point-in-time.
//! The schedule controller only creates and deletes these objects; the
//! snapshot engine that quiesces the VM and copies volumes runs elsewhere
//! and reports progress through the status subresource.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, SourceRef, StatusError};

/// What to do with the snapshot content when the snapshot object is deleted
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Delete the snapshot content along with the snapshot object
    #[default]
    Delete,
    /// Keep the snapshot content around after the snapshot object is deleted
    Retain,
}

/// Current phase of a VirtualMachineSnapshot, written by the snapshot engine
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SnapshotPhase {
    /// The engine has not picked up the request yet
    #[default]
    Pending,
    /// The capture is underway
    InProgress,
    /// The capture completed and the snapshot is usable
    Succeeded,
    /// The capture failed or hit its failure deadline
    Failed,
}

impl std::fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a VirtualMachineSnapshot
///
/// Read-only for the schedule controller.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotStatus {
    /// Current phase of the capture
    #[serde(default)]
    pub phase: SnapshotPhase,

    /// Whether the snapshot finished and can be restored from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    /// When the underlying capture completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,

    /// Last error encountered during the capture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Specification for a VirtualMachineSnapshot
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "snapshot.virtsnap.io",
    version = "v1alpha1",
    kind = "VirtualMachineSnapshot",
    plural = "virtualmachinesnapshots",
    shortname = "vmsnap",
    namespaced,
    status = "VirtualMachineSnapshotStatus",
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.source.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"ReadyToUse","type":"boolean","jsonPath":".status.readyToUse"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotSpec {
    /// The VirtualMachine to capture, in the snapshot's namespace
    pub source: SourceRef,

    /// What to do with the snapshot content when this object is deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,

    /// Time limit for the capture to complete, as a duration string
    /// (e.g. "5m"). The engine marks the snapshot Failed past this deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_deadline: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_spec(yaml: &str) -> VirtualMachineSnapshotSpec {
        let value = crate::yaml::parse_yaml(yaml).expect("parse yaml");
        serde_json::from_value(value).expect("parse spec")
    }

    #[test]
    fn test_snapshot_spec_roundtrip() {
        let spec = parse_spec(
            r#"
source:
  apiGroup: kubevirt.io
  kind: VirtualMachine
  name: web-0
deletionPolicy: Retain
failureDeadline: "10m"
"#,
        );

        assert_eq!(spec.source.name, "web-0");
        assert_eq!(spec.source.kind, "VirtualMachine");
        assert_eq!(spec.deletion_policy, Some(DeletionPolicy::Retain));
        assert_eq!(spec.failure_deadline.as_deref(), Some("10m"));
    }

    #[test]
    fn test_snapshot_spec_defaults() {
        let spec = parse_spec(
            r#"
source:
  kind: VirtualMachine
  name: db-0
"#,
        );

        assert!(spec.deletion_policy.is_none());
        assert!(spec.failure_deadline.is_none());
    }

    #[test]
    fn test_snapshot_phase_display() {
        assert_eq!(SnapshotPhase::Pending.to_string(), "Pending");
        assert_eq!(SnapshotPhase::InProgress.to_string(), "InProgress");
        assert_eq!(SnapshotPhase::Succeeded.to_string(), "Succeeded");
        assert_eq!(SnapshotPhase::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_snapshot_status_serialization() {
        let status = VirtualMachineSnapshotStatus {
            phase: SnapshotPhase::Succeeded,
            ready_to_use: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "Succeeded");
        assert_eq!(json["readyToUse"], true);
        assert!(json.get("error").is_none());
    }
}
