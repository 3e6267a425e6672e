//! VirtualMachineSnapshotSchedule controller implementation
//!
//! One reconcile pass over a schedule: validate the cron expression, honor
//! the disabled flag, resolve the target VMs, decide whether a cron tick
//! has arrived, create snapshots, apply retention, and write status along
//! with the delay until the next tick.
//!
//! The reconciler is single-writer per schedule (the runtime serializes
//! keys) and concurrent across schedules. It never holds locks across I/O;
//! the API server is the only shared mutable resource.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use virtsnap_common::crd::{
    FailurePolicy, SchedulePhase, SnapshotScheduleStatus, SourceRef, StatusError,
    VirtualMachineSnapshot, VirtualMachineSnapshotSchedule, VirtualMachineSnapshotSpec,
    VmSnapshotStatus,
};
use virtsnap_common::events::{actions, reasons, ControllerEvent, EventPublisher};
use virtsnap_common::metrics::{self, ReconcileTimer, SchedulePhaseLabel};
use virtsnap_common::{
    Error, KubeEventPublisher, DEFAULT_FAILURE_DEADLINE, LABEL_SCHEDULED, LABEL_SCHEDULE_NAME,
    LABEL_SCHEDULE_NAMESPACE, LABEL_SOURCE_NAME, VIRTUAL_MACHINE_KIND,
};

use crate::api::{CreateOutcome, KubeScheduleOps, ScheduleOps};
use crate::backoff::BackoffTracker;
use crate::cron;
use crate::kubevirt::VmHandle;
use crate::names;
use crate::retention::{self, RetentionLimits};
use crate::status::write_status;

/// Floor for the requeue delay after a successful reconcile
const MIN_REQUEUE: Duration = Duration::from_secs(1);

/// Shared context for the schedule controller
///
/// The context is shared across all reconciliation calls and holds the
/// Kubernetes operations (trait object for testability), the event
/// publisher, and the per-key backoff consulted by the error policy.
pub struct Context {
    /// Kubernetes reads and writes
    pub api: Arc<dyn ScheduleOps>,
    /// Event publisher for emitting Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Per-key exponential backoff for failed reconciles
    pub backoff: BackoffTracker,
}

impl Context {
    /// Build a production context from a kube client
    pub fn new(client: Client) -> Self {
        Self {
            api: Arc::new(KubeScheduleOps::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(
                client,
                "virtsnap-schedule-controller",
            )),
            backoff: BackoffTracker::default(),
        }
    }

    /// Build a context from explicit parts (tests and embedders)
    pub fn with_parts(api: Arc<dyn ScheduleOps>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            api,
            events,
            backoff: BackoffTracker::default(),
        }
    }
}

fn queue_key(schedule: &VirtualMachineSnapshotSchedule) -> String {
    format!(
        "{}/{}",
        schedule.namespace().unwrap_or_default(),
        schedule.name_any()
    )
}

/// Reconcile one schedule.
///
/// Returns the `Action` carrying the delay until the next cron tick, or an
/// error that the error policy turns into a rate-limited requeue.
#[instrument(
    skip(schedule, ctx),
    fields(
        schedule = %schedule.name_any(),
        namespace = %schedule.namespace().unwrap_or_default(),
    )
)]
pub async fn reconcile(
    schedule: Arc<VirtualMachineSnapshotSchedule>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let timer = ReconcileTimer::start(schedule.name_any());
    let result = reconcile_at(&schedule, &ctx, Utc::now()).await;
    match &result {
        Ok(_) => {
            timer.success();
            ctx.backoff.forget(&queue_key(&schedule));
        }
        Err(e) => {
            timer.error(if e.is_retryable() {
                "transient"
            } else {
                "permanent"
            });
        }
    }
    result
}

/// Error policy for the controller
///
/// Requeues the failed key with per-key exponential backoff (1s doubling up
/// to 5m). Successful reconciles reset the key.
pub fn error_policy(
    schedule: Arc<VirtualMachineSnapshotSchedule>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let delay = ctx.backoff.delay(&queue_key(&schedule));
    error!(
        error = %error,
        schedule = %schedule.name_any(),
        delay_secs = delay.as_secs(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}

/// The reconcile body with an injected clock, so the cron math and snapshot
/// names are testable against fixed instants.
async fn reconcile_at(
    schedule: &VirtualMachineSnapshotSchedule,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let name = schedule.name_any();
    let namespace = schedule.namespace().unwrap_or_else(|| "default".to_string());
    info!(schedule = %name, namespace = %namespace, "Reconciling snapshot schedule");

    if schedule.meta().deletion_timestamp.is_some() {
        // Owner references cascade-delete the owned snapshots.
        debug!(schedule = %name, "schedule is being deleted, nothing to do");
        return Ok(Action::await_change());
    }

    // Initialize status if absent; all updates go through a fresh candidate.
    let mut status = schedule.status.clone().unwrap_or_default();

    // Validate the cron expression before any lookup
    let cron_schedule = match cron::parse_cron(&name, &schedule.spec.schedule) {
        Ok(parsed) => parsed,
        Err(e) => {
            return fail(
                schedule,
                ctx,
                &namespace,
                &mut status,
                now,
                reasons::INVALID_CRON_EXPRESSION,
                e,
            )
            .await;
        }
    };

    if schedule.spec.disabled {
        status.phase = SchedulePhase::Paused;
        status.error = None;
        write_status(ctx.api.as_ref(), &namespace, &name, &status).await?;
        metrics::set_schedule_phase_count(SchedulePhaseLabel::Paused, 1);
        // Only a subsequent mutation re-enqueues a paused schedule
        return Ok(Action::await_change());
    }

    let vms = match resolve_target_vms(schedule, ctx, &namespace).await {
        Ok(vms) => vms,
        Err(e) => {
            return fail(
                schedule,
                ctx,
                &namespace,
                &mut status,
                now,
                reasons::SCHEDULED_SNAPSHOT_FAILED,
                e,
            )
            .await;
        }
    };

    let mut per_vm_errors: BTreeMap<String, String> = BTreeMap::new();

    if vms.is_empty() {
        warn!(schedule = %name, "no VirtualMachines matched the selector");
        ctx.events
            .publish(
                &schedule.object_ref(&()),
                ControllerEvent::warning(
                    reasons::NO_VMS_MATCHED_SELECTOR,
                    actions::RECONCILE,
                    "No VirtualMachines matched the selector",
                ),
            )
            .await;
    } else if let Some(next_run) = cron::next_run(&cron_schedule, status.last_snapshot_time, now) {
        if now >= next_run {
            per_vm_errors = fire(schedule, ctx, &namespace, &vms, now).await;

            if !per_vm_errors.is_empty() {
                let joined = per_vm_errors
                    .iter()
                    .map(|(vm, e)| format!("VM {}: {}", vm, e))
                    .collect::<Vec<_>>()
                    .join("; ");
                let err = Error::snapshot_create(&name, joined);

                if schedule.spec.failure_policy == Some(FailurePolicy::Pause) {
                    return fail(
                        schedule,
                        ctx,
                        &namespace,
                        &mut status,
                        now,
                        reasons::SCHEDULED_SNAPSHOT_FAILED,
                        err,
                    )
                    .await;
                }

                // Continue policy: log, emit, and keep going
                warn!(schedule = %name, error = %err, "snapshot creation failed, continuing");
                ctx.events
                    .publish(
                        &schedule.object_ref(&()),
                        ControllerEvent::warning(
                            reasons::SCHEDULED_SNAPSHOT_FAILED,
                            actions::SNAPSHOT,
                            format!("Failed to create snapshot: {}", err),
                        ),
                    )
                    .await;
            }

            // Advance the fire clock even on partial failure so the same
            // tick is not re-fired in a tight loop.
            status.last_snapshot_time = Some(now);
        }
    }

    let owned = ctx.api.list_owned_snapshots(&namespace, &name).await?;

    let deleted = if vms.is_empty() {
        Vec::new()
    } else {
        apply_retention(schedule, ctx, &namespace, &vms, &owned, now).await
    };
    let remaining: Vec<&VirtualMachineSnapshot> = owned
        .iter()
        .filter(|s| !deleted.contains(&s.name_any()))
        .collect();

    finish_active(
        schedule,
        ctx,
        &namespace,
        status,
        &cron_schedule,
        &vms,
        &remaining,
        &per_vm_errors,
        now,
    )
    .await
}

/// Transition to Failed: record the error in status, write it, emit the
/// event, and hand the error to the queue for a rate-limited requeue.
async fn fail(
    schedule: &VirtualMachineSnapshotSchedule,
    ctx: &Context,
    namespace: &str,
    status: &mut SnapshotScheduleStatus,
    now: DateTime<Utc>,
    reason: &'static str,
    err: Error,
) -> Result<Action, Error> {
    status.phase = SchedulePhase::Failed;
    status.error = Some(StatusError::new(now, err.to_string()));
    write_status(ctx.api.as_ref(), namespace, &schedule.name_any(), status).await?;

    ctx.events
        .publish(
            &schedule.object_ref(&()),
            ControllerEvent::warning(reason, actions::RECONCILE, format!("Schedule failed: {}", err)),
        )
        .await;
    metrics::set_schedule_phase_count(SchedulePhaseLabel::Failed, 1);

    Err(err)
}

/// Resolve the VMs this schedule targets.
///
/// Source mode looks up the named VM; selector mode lists the schedule's
/// namespace and filters by labels. A selector matching nothing is not an
/// error and yields an empty vec.
async fn resolve_target_vms(
    schedule: &VirtualMachineSnapshotSchedule,
    ctx: &Context,
    namespace: &str,
) -> Result<Vec<VmHandle>, Error> {
    let name = schedule.name_any();

    if let Some(source) = &schedule.spec.source {
        if source.kind != VIRTUAL_MACHINE_KIND {
            return Err(Error::validation_for(
                name,
                format!("source kind must be VirtualMachine, got {}", source.kind),
            ));
        }
        return match ctx.api.get_vm(namespace, &source.name).await? {
            Some(vm) => Ok(vec![vm]),
            None => Err(Error::vm_not_found(namespace, &source.name)),
        };
    }

    if let Some(selector) = &schedule.spec.vm_selector {
        let vms = ctx.api.list_vms(namespace).await?;
        return Ok(vms
            .into_iter()
            .filter(|vm| selector.matches(&vm.labels))
            .collect());
    }

    Err(Error::validation_for(
        name,
        "either source or vmSelector must be specified",
    ))
}

/// Create one snapshot per target VM. Returns per-VM failure messages;
/// AlreadyExists counts as success (same-minute re-reconcile).
async fn fire(
    schedule: &VirtualMachineSnapshotSchedule,
    ctx: &Context,
    namespace: &str,
    vms: &[VmHandle],
    now: DateTime<Utc>,
) -> BTreeMap<String, String> {
    let name = schedule.name_any();
    let mut failures = BTreeMap::new();
    let mut created = 0u64;

    for vm in vms {
        let snapshot = build_snapshot(schedule, namespace, vm, now);
        let snapshot_name = snapshot.name_any();
        match ctx.api.create_snapshot(&snapshot).await {
            Ok(CreateOutcome::Created) => {
                created += 1;
                info!(schedule = %name, snapshot = %snapshot_name, vm = %vm.name, "created scheduled snapshot");
                ctx.events
                    .publish(
                        &schedule.object_ref(&()),
                        ControllerEvent::normal(
                            reasons::SCHEDULED_SNAPSHOT_CREATED,
                            actions::SNAPSHOT,
                            format!("Created snapshot {} for VM {}", snapshot_name, vm.name),
                        ),
                    )
                    .await;
            }
            Ok(CreateOutcome::AlreadyExists) => {
                debug!(schedule = %name, snapshot = %snapshot_name, "snapshot already exists");
            }
            Err(e) => {
                failures.insert(vm.name.clone(), e.to_string());
            }
        }
    }

    if created > 0 {
        metrics::record_snapshots_created(&name, created);
    }
    failures
}

/// Build the snapshot object for one VM, stamping the schedule labels, the
/// template settings, and the controller owner reference.
fn build_snapshot(
    schedule: &VirtualMachineSnapshotSchedule,
    namespace: &str,
    vm: &VmHandle,
    fired_at: DateTime<Utc>,
) -> VirtualMachineSnapshot {
    let name = schedule.name_any();
    let template = schedule.spec.snapshot_template.as_ref();

    let mut labels = BTreeMap::from([
        (LABEL_SCHEDULE_NAME.to_string(), name.clone()),
        (LABEL_SCHEDULE_NAMESPACE.to_string(), namespace.to_string()),
        (LABEL_SCHEDULED.to_string(), "true".to_string()),
        (LABEL_SOURCE_NAME.to_string(), vm.name.clone()),
    ]);
    if let Some(template) = template {
        for (k, v) in &template.labels {
            labels.insert(k.clone(), v.clone());
        }
    }

    let annotations = template
        .map(|t| t.annotations.clone())
        .filter(|a| !a.is_empty());

    VirtualMachineSnapshot {
        metadata: ObjectMeta {
            name: Some(names::snapshot_name(&name, &vm.name, fired_at)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations,
            owner_references: schedule.controller_owner_ref(&()).map(|o| vec![o]),
            ..Default::default()
        },
        spec: VirtualMachineSnapshotSpec {
            source: SourceRef::virtual_machine(&vm.name),
            deletion_policy: template.and_then(|t| t.deletion_policy),
            failure_deadline: template
                .and_then(|t| t.failure_deadline.clone())
                .or_else(|| Some(DEFAULT_FAILURE_DEADLINE.to_string())),
        },
        status: None,
    }
}

/// Apply the retention policy per VM. Deletion failures are logged and
/// retried on the next reconcile, never fatal. Returns the names actually
/// deleted so the status recount can exclude them.
async fn apply_retention(
    schedule: &VirtualMachineSnapshotSchedule,
    ctx: &Context,
    namespace: &str,
    vms: &[VmHandle],
    owned: &[VirtualMachineSnapshot],
    now: DateTime<Utc>,
) -> Vec<String> {
    let Some(policy) = &schedule.spec.retention else {
        return Vec::new();
    };
    let name = schedule.name_any();

    let limits = match RetentionLimits::from_policy(&name, policy) {
        Ok(limits) => limits,
        Err(e) => {
            warn!(schedule = %name, error = %e, "invalid retention policy, skipping retention");
            return Vec::new();
        }
    };

    let mut deleted = Vec::new();
    for vm in vms {
        let subset: Vec<(String, DateTime<Utc>)> = owned
            .iter()
            .filter(|s| {
                s.labels().get(LABEL_SOURCE_NAME).map(String::as_str) == Some(vm.name.as_str())
            })
            .filter_map(|s| {
                s.meta()
                    .creation_timestamp
                    .as_ref()
                    .map(|t| (s.name_any(), t.0))
            })
            .collect();

        for snapshot_name in retention::select_for_deletion(&subset, &limits, now) {
            match ctx.api.delete_snapshot(namespace, &snapshot_name).await {
                Ok(()) => {
                    info!(schedule = %name, snapshot = %snapshot_name, "deleted snapshot due to retention policy");
                    ctx.events
                        .publish(
                            &schedule.object_ref(&()),
                            ControllerEvent::normal(
                                reasons::RETENTION_CLEANUP,
                                actions::CLEANUP,
                                format!(
                                    "Deleted snapshot {} due to retention policy",
                                    snapshot_name
                                ),
                            ),
                        )
                        .await;
                    deleted.push(snapshot_name);
                }
                Err(e) => {
                    warn!(schedule = %name, snapshot = %snapshot_name, error = %e, "failed to delete snapshot");
                }
            }
        }
    }

    if !deleted.is_empty() {
        metrics::record_snapshots_deleted(&name, deleted.len() as u64);
    }
    deleted
}

/// Transition to Active: clear the error, recompute the next run and the
/// snapshot bookkeeping, write status, and requeue just past the next tick.
#[allow(clippy::too_many_arguments)]
async fn finish_active(
    schedule: &VirtualMachineSnapshotSchedule,
    ctx: &Context,
    namespace: &str,
    mut status: SnapshotScheduleStatus,
    cron_schedule: &::cron::Schedule,
    vms: &[VmHandle],
    remaining: &[&VirtualMachineSnapshot],
    per_vm_errors: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let name = schedule.name_any();

    status.phase = SchedulePhase::Active;
    status.error = None;

    let from = status.last_snapshot_time.unwrap_or(now);
    status.next_snapshot_time = cron::next_after(cron_schedule, from);

    status.current_snapshot_count = remaining.len() as i32;
    if let Some(successful) = last_successful_name(remaining) {
        status.last_successful_snapshot_name = Some(successful);
    }
    status.vm_snapshot_statuses = build_vm_statuses(vms, remaining, per_vm_errors, now);

    write_status(ctx.api.as_ref(), namespace, &name, &status).await?;
    metrics::set_schedule_phase_count(SchedulePhaseLabel::Active, 1);

    let Some(next) = status.next_snapshot_time else {
        // The cron has no future activation; wait for a spec change.
        return Ok(Action::await_change());
    };
    let until = (next - now).to_std().unwrap_or_default();
    Ok(Action::requeue(std::cmp::max(until + MIN_REQUEUE, MIN_REQUEUE)))
}

/// Newest remaining snapshot that the engine reports as usable.
fn last_successful_name(remaining: &[&VirtualMachineSnapshot]) -> Option<String> {
    remaining
        .iter()
        .copied()
        .filter(|s| {
            s.status
                .as_ref()
                .and_then(|st| st.ready_to_use)
                .unwrap_or(false)
        })
        .max_by_key(|s| snapshot_sort_key(s))
        .map(|s| s.name_any())
}

/// Per-VM bookkeeping for the status, sorted by VM name.
fn build_vm_statuses(
    vms: &[VmHandle],
    remaining: &[&VirtualMachineSnapshot],
    per_vm_errors: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Vec<VmSnapshotStatus> {
    let mut statuses: Vec<VmSnapshotStatus> = vms
        .iter()
        .map(|vm| {
            let mut subset: Vec<&VirtualMachineSnapshot> = remaining
                .iter()
                .copied()
                .filter(|s| {
                    s.labels().get(LABEL_SOURCE_NAME).map(String::as_str)
                        == Some(vm.name.as_str())
                })
                .collect();
            subset.sort_by_key(|s| snapshot_sort_key(s));
            let newest = subset.last();

            VmSnapshotStatus {
                vm_name: vm.name.clone(),
                last_snapshot_name: newest.map(|s| s.name_any()),
                last_snapshot_time: newest
                    .and_then(|s| s.meta().creation_timestamp.as_ref().map(|t| t.0)),
                current_snapshot_count: subset.len() as i32,
                error: per_vm_errors
                    .get(&vm.name)
                    .map(|msg| StatusError::new(now, msg.clone())),
            }
        })
        .collect();
    statuses.sort_by(|a, b| a.vm_name.cmp(&b.vm_name));
    statuses
}

fn snapshot_sort_key(s: &VirtualMachineSnapshot) -> (DateTime<Utc>, String) {
    (
        s.meta()
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        s.name_any(),
    )
}
