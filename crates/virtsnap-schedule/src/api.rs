//! Kubernetes operations for the schedule controller
//!
//! `ScheduleOps` abstracts every read and write the reconciler performs,
//! allowing the reconciliation logic to be unit tested against a mock while
//! production uses the kube-backed implementation.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use virtsnap_common::crd::{
    SnapshotScheduleStatus, VirtualMachineSnapshot, VirtualMachineSnapshotSchedule,
};
use virtsnap_common::kube_utils::{get_optional, patch_status_json};
use virtsnap_common::{Error, LABEL_SCHEDULE_NAME};

use crate::kubevirt::{self, VmHandle};

/// Outcome of a snapshot create call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The snapshot was newly created
    Created,
    /// A snapshot with this name already exists (same-minute re-reconcile);
    /// treated as success
    AlreadyExists,
}

/// Kubernetes reads and writes performed by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScheduleOps: Send + Sync {
    /// Fetch the latest version of a schedule, None if it no longer exists
    async fn get_schedule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualMachineSnapshotSchedule>, Error>;

    /// Write the schedule's status subresource with a JSON-Patch.
    ///
    /// `replace` selects `replace /status` over `add /status` depending on
    /// whether the stored object already carries a status.
    async fn patch_schedule_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SnapshotScheduleStatus,
        replace: bool,
    ) -> Result<(), Error>;

    /// Look up one VirtualMachine by name
    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VmHandle>, Error>;

    /// List all VirtualMachines in a namespace
    async fn list_vms(&self, namespace: &str) -> Result<Vec<VmHandle>, Error>;

    /// Create a snapshot request object
    async fn create_snapshot(
        &self,
        snapshot: &VirtualMachineSnapshot,
    ) -> Result<CreateOutcome, Error>;

    /// Delete a snapshot; a missing snapshot is success
    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// List the snapshots owned by a schedule (by schedule-name label)
    async fn list_owned_snapshots(
        &self,
        namespace: &str,
        schedule: &str,
    ) -> Result<Vec<VirtualMachineSnapshot>, Error>;
}

/// Production implementation backed by the kube client
pub struct KubeScheduleOps {
    client: Client,
}

impl KubeScheduleOps {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn schedules(&self, namespace: &str) -> Api<VirtualMachineSnapshotSchedule> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn snapshots(&self, namespace: &str) -> Api<VirtualMachineSnapshot> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ScheduleOps for KubeScheduleOps {
    async fn get_schedule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualMachineSnapshotSchedule>, Error> {
        get_optional(&self.schedules(namespace), name).await
    }

    async fn patch_schedule_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SnapshotScheduleStatus,
        replace: bool,
    ) -> Result<(), Error> {
        patch_status_json::<VirtualMachineSnapshotSchedule, _>(
            &self.client,
            namespace,
            name,
            status,
            replace,
        )
        .await
    }

    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VmHandle>, Error> {
        kubevirt::get_vm(&self.client, namespace, name).await
    }

    async fn list_vms(&self, namespace: &str) -> Result<Vec<VmHandle>, Error> {
        kubevirt::list_vms(&self.client, namespace).await
    }

    async fn create_snapshot(
        &self,
        snapshot: &VirtualMachineSnapshot,
    ) -> Result<CreateOutcome, Error> {
        let namespace = snapshot.namespace().unwrap_or_else(|| "default".to_string());
        match self
            .snapshots(&namespace)
            .create(&PostParams::default(), snapshot)
            .await
        {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!(snapshot = %snapshot.name_any(), "snapshot already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self
            .snapshots(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(snapshot = %name, "snapshot already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_owned_snapshots(
        &self,
        namespace: &str,
        schedule: &str,
    ) -> Result<Vec<VirtualMachineSnapshot>, Error> {
        let params =
            ListParams::default().labels(&format!("{}={}", LABEL_SCHEDULE_NAME, schedule));
        let list = self.snapshots(namespace).list(&params).await?;
        Ok(list.items)
    }
}
