//! Kubernetes Event emission for the schedule controller.
//!
//! Reconcile paths describe what happened as a [`ControllerEvent`] and hand
//! it to an [`EventPublisher`] sink. The production sink posts through
//! `kube`'s event Recorder; a failed delivery is logged and dropped, since
//! a broken event sink must never fail a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// One event about a schedule, ready to be posted to the cluster.
#[derive(Debug)]
pub struct ControllerEvent {
    /// Normal or Warning
    pub severity: EventType,
    /// Machine-readable reason, shown in the REASON column of
    /// `kubectl get events`
    pub reason: &'static str,
    /// The controller activity that produced the event
    pub action: &'static str,
    /// Free-form detail for `kubectl describe`
    pub note: String,
}

impl ControllerEvent {
    /// An informational event (snapshot created, retention delete).
    pub fn normal(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            severity: EventType::Normal,
            reason,
            action,
            note: note.into(),
        }
    }

    /// A warning event (create failure, bad cron, empty selector match).
    pub fn warning(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            severity: EventType::Warning,
            reason,
            action,
            note: note.into(),
        }
    }
}

/// Sink for controller events.
///
/// `publish` is deliberately infallible: implementations own their delivery
/// problems.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Post one event about the given object.
    async fn publish(&self, target: &ObjectReference, event: ControllerEvent);
}

/// Sink backed by the Kubernetes Events API.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a sink reporting as `controller`.
    ///
    /// When `POD_NAME` is set (downward API), it becomes the reporting
    /// instance on the emitted Events, so multi-replica deployments stay
    /// distinguishable.
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, target: &ObjectReference, event: ControllerEvent) {
        let posted = self
            .recorder
            .publish(
                &kube::runtime::events::Event {
                    type_: event.severity,
                    reason: event.reason.to_string(),
                    action: event.action.to_string(),
                    note: Some(event.note),
                    secondary: None,
                },
                target,
            )
            .await;

        if let Err(err) = posted {
            warn!(reason = event.reason, error = %err, "dropping event after failed delivery");
        }
    }
}

/// Sink that discards everything; stands in for the real one in tests and
/// offline tooling.
pub struct NullEventPublisher;

#[async_trait]
impl EventPublisher for NullEventPublisher {
    async fn publish(&self, _target: &ObjectReference, _event: ControllerEvent) {}
}

/// Reason strings emitted by the schedule controller. Part of the API
/// contract; consumers filter `kubectl get events` on them.
pub mod reasons {
    /// A scheduled snapshot was created for a VM
    pub const SCHEDULED_SNAPSHOT_CREATED: &str = "ScheduledSnapshotCreated";
    /// A snapshot owned by a schedule was deleted
    pub const SCHEDULED_SNAPSHOT_DELETED: &str = "ScheduledSnapshotDeleted";
    /// Retention removed a snapshot past its age or count limit
    pub const RETENTION_CLEANUP: &str = "RetentionCleanup";
    /// Snapshot creation failed for one or more VMs
    pub const SCHEDULED_SNAPSHOT_FAILED: &str = "ScheduledSnapshotFailed";
    /// The schedule's cron expression failed to parse
    pub const INVALID_CRON_EXPRESSION: &str = "InvalidCronExpression";
    /// The vmSelector matched no VirtualMachines
    pub const NO_VMS_MATCHED_SELECTOR: &str = "NoVMsMatchedSelector";
}

/// Action strings attached to emitted events.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Creating snapshot request objects at a cron tick
    pub const SNAPSHOT: &str = "Snapshot";
    /// Deleting snapshots under the retention policy
    pub const CLEANUP: &str = "Cleanup";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_severity_and_note() {
        let ev = ControllerEvent::normal(
            reasons::SCHEDULED_SNAPSHOT_CREATED,
            actions::SNAPSHOT,
            "Created snapshot nightly-db-0-20240101-020000 for VM db-0",
        );
        assert!(matches!(&ev.severity, EventType::Normal));
        assert_eq!(ev.action, "Snapshot");
        assert!(ev.note.contains("db-0"));

        let ev = ControllerEvent::warning(
            reasons::SCHEDULED_SNAPSHOT_FAILED,
            actions::SNAPSHOT,
            "Failed to create snapshot: 500",
        );
        assert!(matches!(&ev.severity, EventType::Warning));
        assert_eq!(ev.reason, "ScheduledSnapshotFailed");
    }

    #[test]
    fn test_reason_vocabulary_is_stable() {
        assert_eq!(
            reasons::SCHEDULED_SNAPSHOT_CREATED,
            "ScheduledSnapshotCreated"
        );
        assert_eq!(
            reasons::SCHEDULED_SNAPSHOT_DELETED,
            "ScheduledSnapshotDeleted"
        );
        assert_eq!(reasons::RETENTION_CLEANUP, "RetentionCleanup");
        assert_eq!(reasons::SCHEDULED_SNAPSHOT_FAILED, "ScheduledSnapshotFailed");
        assert_eq!(reasons::INVALID_CRON_EXPRESSION, "InvalidCronExpression");
        assert_eq!(reasons::NO_VMS_MATCHED_SELECTOR, "NoVMsMatchedSelector");
    }

    #[tokio::test]
    async fn test_null_publisher_discards_events() {
        NullEventPublisher
            .publish(
                &ObjectReference::default(),
                ControllerEvent::normal(reasons::RETENTION_CLEANUP, actions::CLEANUP, "gone"),
            )
            .await;
    }
}
