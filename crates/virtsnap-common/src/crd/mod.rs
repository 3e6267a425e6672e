//! Custom Resource Definitions for virtsnap
//!
//! This module contains the CRDs owned by the virtsnap operator. The
//! external VirtualMachine resource (kubevirt.io) is deliberately not
//! defined here; it is accessed dynamically by the schedule controller.

mod schedule;
mod snapshot;
mod types;

pub use schedule::{
    FailurePolicy, RetentionPolicy, SchedulePhase, SnapshotScheduleSpec, SnapshotScheduleStatus,
    SnapshotTemplate, VirtualMachineSnapshotSchedule, VmSnapshotStatus,
};
pub use snapshot::{
    DeletionPolicy, SnapshotPhase, VirtualMachineSnapshot, VirtualMachineSnapshotSpec,
    VirtualMachineSnapshotStatus,
};
pub use types::{
    Condition, ConditionStatus, LabelSelectorOperator, LabelSelectorRequirement, SourceRef,
    StatusError, VmSelector,
};
