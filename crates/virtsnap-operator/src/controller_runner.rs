//! Controller runner - wires the schedule controller into the kube runtime
//!
//! Event ingress per the controller contract: the primary watch covers
//! VirtualMachineSnapshotSchedules, a secondary watch maps snapshot events
//! back to their owning schedule through the schedule-name label, and a
//! periodic ticker re-enqueues every known schedule so the controller
//! converges even after missed events.

use std::sync::Arc;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::Config as RuntimeConfig;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Client, ResourceExt};

use virtsnap_common::crd::{VirtualMachineSnapshot, VirtualMachineSnapshotSchedule};
use virtsnap_common::LABEL_SCHEDULE_NAME;
use virtsnap_schedule::controller::{error_policy, reconcile, Context};

use crate::ControllerConfig;

/// Run the schedule controller until shutdown
pub async fn run_controller(client: Client, config: ControllerConfig) {
    let ctx = Arc::new(Context::new(client.clone()));

    let schedules: Api<VirtualMachineSnapshotSchedule> = Api::all(client.clone());
    let snapshots: Api<VirtualMachineSnapshot> = Api::all(client);

    tracing::info!(
        threadiness = config.threadiness,
        resync_secs = config.resync_period.as_secs(),
        "Starting VirtualMachineSnapshotSchedule controller"
    );

    let resync = futures::stream::unfold(
        tokio::time::interval(config.resync_period),
        |mut interval| async move {
            interval.tick().await;
            Some(((), interval))
        },
    );

    Controller::new(schedules, WatcherConfig::default())
        .with_config(RuntimeConfig::default().concurrency(config.threadiness))
        .watches(
            snapshots,
            WatcherConfig::default(),
            map_snapshot_to_schedule,
        )
        .reconcile_all_on(resync)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(schedule = %obj.name, ?action, "Schedule reconciliation completed");
                }
                Err(e) => tracing::error!(error = ?e, "Schedule reconciliation error"),
            }
        })
        .await;

    tracing::info!("Schedule controller shut down");
}

/// Map a snapshot event to the schedule it belongs to.
///
/// The owning schedule is read from the snapshot's schedule-name label;
/// snapshots without that label are ignored.
fn map_snapshot_to_schedule(
    snapshot: VirtualMachineSnapshot,
) -> Option<ObjectRef<VirtualMachineSnapshotSchedule>> {
    let namespace = snapshot.namespace()?;
    let schedule = snapshot.labels().get(LABEL_SCHEDULE_NAME)?;
    Some(ObjectRef::new(schedule).within(&namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use kube::api::ObjectMeta;
    use virtsnap_common::crd::{SourceRef, VirtualMachineSnapshotSpec};

    fn snapshot(labels: Option<BTreeMap<String, String>>) -> VirtualMachineSnapshot {
        VirtualMachineSnapshot {
            metadata: ObjectMeta {
                name: Some("nightly-db-0-20240101-020000".to_string()),
                namespace: Some("prod".to_string()),
                labels,
                ..Default::default()
            },
            spec: VirtualMachineSnapshotSpec {
                source: SourceRef::virtual_machine("db-0"),
                deletion_policy: None,
                failure_deadline: None,
            },
            status: None,
        }
    }

    #[test]
    fn test_labeled_snapshot_maps_to_schedule() {
        let labels = BTreeMap::from([(LABEL_SCHEDULE_NAME.to_string(), "nightly".to_string())]);
        let obj_ref = map_snapshot_to_schedule(snapshot(Some(labels))).unwrap();
        assert_eq!(obj_ref.name, "nightly");
        assert_eq!(obj_ref.namespace.as_deref(), Some("prod"));
    }

    #[test]
    fn test_unlabeled_snapshot_is_ignored() {
        assert!(map_snapshot_to_schedule(snapshot(None)).is_none());
        assert!(map_snapshot_to_schedule(snapshot(Some(BTreeMap::from([(
            "unrelated".to_string(),
            "label".to_string()
        )]))))
        .is_none());
    }
}
