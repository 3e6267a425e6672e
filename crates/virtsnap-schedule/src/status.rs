//! Status comparison and writing
//!
//! The status writer reads the latest stored schedule, compares the
//! candidate status field by field, and only issues the JSON-Patch when
//! something actually changed. Patch conflicts surface as errors and are
//! retried through the queue's backoff, never internally.

use tracing::debug;

use virtsnap_common::crd::SnapshotScheduleStatus;
use virtsnap_common::Error;

use crate::api::ScheduleOps;

/// Field-wise status equality.
///
/// Compares phase, snapshot count, last successful snapshot name, the
/// last/next snapshot times, and (deeply) the per-VM sub-status. Matches
/// the write-skip contract; `error` and `conditions` changes alone do not
/// force a write.
pub fn statuses_equal(a: &SnapshotScheduleStatus, b: &SnapshotScheduleStatus) -> bool {
    a.phase == b.phase
        && a.current_snapshot_count == b.current_snapshot_count
        && a.last_successful_snapshot_name == b.last_successful_snapshot_name
        && a.last_snapshot_time == b.last_snapshot_time
        && a.next_snapshot_time == b.next_snapshot_time
        && a.vm_snapshot_statuses == b.vm_snapshot_statuses
}

/// Write the candidate status unless the stored status already matches.
pub async fn write_status(
    api: &dyn ScheduleOps,
    namespace: &str,
    name: &str,
    candidate: &SnapshotScheduleStatus,
) -> Result<(), Error> {
    let Some(current) = api.get_schedule(namespace, name).await? else {
        debug!(schedule = %name, "schedule no longer exists, skipping status update");
        return Ok(());
    };

    if let Some(existing) = &current.status {
        if statuses_equal(existing, candidate) {
            debug!(schedule = %name, "status unchanged, skipping update");
            return Ok(());
        }
    }

    api.patch_schedule_status(namespace, name, candidate, current.status.is_some())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use kube::api::ObjectMeta;

    use virtsnap_common::crd::{
        SchedulePhase, SnapshotScheduleSpec, StatusError, VirtualMachineSnapshotSchedule,
        VmSnapshotStatus,
    };

    use crate::api::MockScheduleOps;

    fn schedule_with_status(
        status: Option<SnapshotScheduleStatus>,
    ) -> VirtualMachineSnapshotSchedule {
        VirtualMachineSnapshotSchedule {
            metadata: ObjectMeta {
                name: Some("s1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: SnapshotScheduleSpec::default(),
            status,
        }
    }

    fn sample_status() -> SnapshotScheduleStatus {
        SnapshotScheduleStatus {
            phase: SchedulePhase::Active,
            last_snapshot_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap()),
            next_snapshot_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap()),
            current_snapshot_count: 2,
            vm_snapshot_statuses: vec![VmSnapshotStatus {
                vm_name: "vmA".to_string(),
                current_snapshot_count: 2,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_statuses_equal_same_fields() {
        assert!(statuses_equal(&sample_status(), &sample_status()));
    }

    #[test]
    fn test_statuses_differ_on_listed_fields() {
        let base = sample_status();

        let mut other = sample_status();
        other.phase = SchedulePhase::Failed;
        assert!(!statuses_equal(&base, &other));

        let mut other = sample_status();
        other.current_snapshot_count = 3;
        assert!(!statuses_equal(&base, &other));

        let mut other = sample_status();
        other.next_snapshot_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap());
        assert!(!statuses_equal(&base, &other));

        let mut other = sample_status();
        other.vm_snapshot_statuses[0].current_snapshot_count = 3;
        assert!(!statuses_equal(&base, &other));
    }

    #[test]
    fn test_error_only_change_does_not_force_write() {
        let base = sample_status();
        let mut other = sample_status();
        other.error = Some(StatusError::new(Utc::now(), "transient"));
        assert!(statuses_equal(&base, &other));
    }

    #[tokio::test]
    async fn test_write_skipped_when_status_unchanged() {
        let mut mock = MockScheduleOps::new();
        mock.expect_get_schedule()
            .returning(|_, _| Ok(Some(schedule_with_status(Some(sample_status())))));
        // No patch expectation: a patch call would panic the mock.

        let api: Arc<dyn ScheduleOps> = Arc::new(mock);
        write_status(api.as_ref(), "default", "s1", &sample_status())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_replaces_when_status_changed() {
        let mut mock = MockScheduleOps::new();
        mock.expect_get_schedule()
            .returning(|_, _| Ok(Some(schedule_with_status(Some(sample_status())))));
        mock.expect_patch_schedule_status()
            .withf(|ns, name, status, replace| {
                ns == "default" && name == "s1" && status.current_snapshot_count == 5 && *replace
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut candidate = sample_status();
        candidate.current_snapshot_count = 5;

        let api: Arc<dyn ScheduleOps> = Arc::new(mock);
        write_status(api.as_ref(), "default", "s1", &candidate)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_write_uses_add() {
        let mut mock = MockScheduleOps::new();
        mock.expect_get_schedule()
            .returning(|_, _| Ok(Some(schedule_with_status(None))));
        mock.expect_patch_schedule_status()
            .withf(|_, _, _, replace| !*replace)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let api: Arc<dyn ScheduleOps> = Arc::new(mock);
        write_status(api.as_ref(), "default", "s1", &sample_status())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_skipped_when_schedule_gone() {
        let mut mock = MockScheduleOps::new();
        mock.expect_get_schedule().returning(|_, _| Ok(None));

        let api: Arc<dyn ScheduleOps> = Arc::new(mock);
        write_status(api.as_ref(), "default", "s1", &sample_status())
            .await
            .unwrap();
    }
}
