//! Schedule controller for virtsnap
//!
//! This crate implements the reconciliation core for
//! VirtualMachineSnapshotSchedule resources:
//!
//! - **controller**: the reconcile loop - resolve target VMs, decide whether
//!   a cron tick has arrived, fire snapshot creations, apply retention,
//!   update status, and return the requeue delay
//! - **api**: the `ScheduleOps` trait abstracting Kubernetes reads/writes,
//!   with a kube-backed production implementation
//! - **kubevirt**: dynamic access to the external VirtualMachine resource
//! - **cron**: cron parsing (five-field + shortcuts) and next-run math, UTC
//! - **retention**: deterministic selection of snapshots to prune under the
//!   age and count limits
//! - **status**: field-wise status comparison and the JSON-Patch writer
//! - **names**: snapshot name generation with truncate-and-hash
//! - **backoff**: per-key exponential backoff for the error policy

pub mod api;
pub mod backoff;
pub mod controller;
pub mod cron;
pub mod kubevirt;
pub mod names;
pub mod retention;
pub mod status;
