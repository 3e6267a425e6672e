//! VirtualMachineSnapshotSchedule Custom Resource Definition
//!
//! A VirtualMachineSnapshotSchedule pairs a cron expression with a set of
//! VirtualMachines and a retention policy. The schedule controller fires
//! snapshot creations at cron ticks, prunes old snapshots, and maintains
//! the phase state machine (Active / Paused / Failed) through the status
//! subresource.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::snapshot::DeletionPolicy;
use super::types::{Condition, SourceRef, StatusError, VmSelector};

/// How the schedule reacts to snapshot creation failures
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep firing on subsequent ticks even if a snapshot failed
    #[default]
    Continue,
    /// Stop firing until the error clears or an operator intervenes
    Pause,
}

/// Current phase of a schedule
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SchedulePhase {
    /// The schedule is active and taking snapshots
    #[default]
    Active,
    /// The schedule is paused (disabled or paused by failure policy)
    Paused,
    /// The schedule has encountered an error
    Failed,
}

impl std::fmt::Display for SchedulePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Paused => write!(f, "Paused"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Retention policy for snapshots produced by a schedule
///
/// `expires` and `maxCount` compose with OR: a snapshot is deleted when
/// either limit applies. The count limit is evaluated after the age limit
/// so that expired snapshots do not count against the cap.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// Maximum snapshot age as a duration string (e.g. "168h" for 1 week)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// Maximum number of snapshots to retain per VirtualMachine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<i32>,
}

/// Settings stamped onto each VirtualMachineSnapshot the schedule creates
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTemplate {
    /// Labels to add to each snapshot
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Annotations to add to each snapshot
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Deletion policy for the snapshot content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,

    /// Time limit for each capture; defaults to "5m" when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_deadline: Option<String>,
}

/// Per-VM snapshot bookkeeping within the schedule status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmSnapshotStatus {
    /// Name of the VirtualMachine
    pub vm_name: String,

    /// Name of the newest snapshot taken for this VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_snapshot_name: Option<String>,

    /// When the newest snapshot for this VM was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_snapshot_time: Option<DateTime<Utc>>,

    /// Number of snapshots currently held for this VM
    #[serde(default)]
    pub current_snapshot_count: i32,

    /// Last error for this VM's snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
}

/// Status of a VirtualMachineSnapshotSchedule
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotScheduleStatus {
    /// Current phase of the schedule
    #[serde(default)]
    pub phase: SchedulePhase,

    /// The most recent instant at which the controller fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_snapshot_time: Option<DateTime<Utc>>,

    /// The next cron instant the controller will fire at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_snapshot_time: Option<DateTime<Utc>>,

    /// Name of the newest owned snapshot that completed successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_snapshot_name: Option<String>,

    /// Total snapshots owned by this schedule across all VMs
    #[serde(default)]
    pub current_snapshot_count: i32,

    /// Time and message of the last reconciler failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Per-VM snapshot bookkeeping, sorted by VM name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vm_snapshot_statuses: Vec<VmSnapshotStatus>,
}

/// Specification for a VirtualMachineSnapshotSchedule
///
/// Exactly one of `source` and `vmSelector` should be set; when both are
/// present, `source` takes precedence.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "snapshot.virtsnap.io",
    version = "v1alpha1",
    kind = "VirtualMachineSnapshotSchedule",
    plural = "virtualmachinesnapshotschedules",
    shortname = "vmsched",
    namespaced,
    status = "SnapshotScheduleStatus",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"NextSnapshot","type":"string","jsonPath":".status.nextSnapshotTime"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotScheduleSpec {
    /// A single VirtualMachine to snapshot; takes precedence over vmSelector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,

    /// Label selector matching VirtualMachines in the schedule's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_selector: Option<VmSelector>,

    /// Cron expression for when snapshots are taken, interpreted in UTC.
    /// Supports five-field cron and the shortcuts @hourly, @daily, @weekly,
    /// @monthly, @yearly.
    pub schedule: String,

    /// When true the schedule is inactive
    #[serde(default)]
    pub disabled: bool,

    /// Policy for pruning old snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionPolicy>,

    /// Settings for the snapshots this schedule creates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_template: Option<SnapshotTemplate>,

    /// How to handle snapshot creation failures; defaults to Continue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}
