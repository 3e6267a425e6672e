//! Metrics registry for virtsnap observability
//!
//! Provides OpenTelemetry metrics for:
//! - Schedule lifecycle (phase gauge, reconcile duration, reconcile errors)
//! - Snapshot churn (created / deleted by the schedule controller)

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};

/// Global meter for virtsnap metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("virtsnap"));

/// Gauge tracking total schedules by phase
///
/// Labels:
/// - `phase`: active, paused, failed
pub static SCHEDULES_TOTAL: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("virtsnap_schedules_total")
        .with_description("Total number of snapshot schedules by phase")
        .with_unit("{schedules}")
        .build()
});

/// Histogram of schedule reconciliation duration
///
/// Labels:
/// - `schedule`: schedule name
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("virtsnap_schedule_reconcile_duration_seconds")
        .with_description("Duration of schedule reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of schedule reconciliation errors
///
/// Labels:
/// - `schedule`: schedule name
/// - `error_type`: transient, permanent
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("virtsnap_schedule_reconcile_errors_total")
        .with_description("Total number of schedule reconciliation errors")
        .with_unit("{errors}")
        .build()
});

/// Counter of snapshots created by schedules
///
/// Labels:
/// - `schedule`: schedule name
pub static SNAPSHOTS_CREATED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("virtsnap_scheduled_snapshots_created_total")
        .with_description("Total number of snapshots created by schedules")
        .with_unit("{snapshots}")
        .build()
});

/// Counter of snapshots deleted by retention
///
/// Labels:
/// - `schedule`: schedule name
pub static SNAPSHOTS_DELETED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("virtsnap_scheduled_snapshots_deleted_total")
        .with_description("Total number of snapshots deleted by retention")
        .with_unit("{snapshots}")
        .build()
});

/// Labels for the schedule phase gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePhaseLabel {
    /// Schedule is active
    Active,
    /// Schedule is paused
    Paused,
    /// Schedule has failed
    Failed,
}

impl SchedulePhaseLabel {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Failed => "failed",
        }
    }
}

/// Record a schedule reconciliation with timing
pub struct ReconcileTimer {
    schedule: String,
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start(schedule: impl Into<String>) -> Self {
        Self {
            schedule: schedule.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        let duration = self.start.elapsed().as_secs_f64();
        RECONCILE_DURATION.record(
            duration,
            &[
                opentelemetry::KeyValue::new("schedule", self.schedule),
                opentelemetry::KeyValue::new("result", "success"),
            ],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: &str) {
        let duration = self.start.elapsed().as_secs_f64();
        RECONCILE_DURATION.record(
            duration,
            &[
                opentelemetry::KeyValue::new("schedule", self.schedule.clone()),
                opentelemetry::KeyValue::new("result", "error"),
            ],
        );
        RECONCILE_ERRORS.add(
            1,
            &[
                opentelemetry::KeyValue::new("schedule", self.schedule),
                opentelemetry::KeyValue::new("error_type", error_type.to_string()),
            ],
        );
    }
}

/// Update schedule phase gauge
pub fn set_schedule_phase_count(phase: SchedulePhaseLabel, count: i64) {
    SCHEDULES_TOTAL.record(
        count,
        &[opentelemetry::KeyValue::new(
            "phase",
            phase.as_str().to_string(),
        )],
    );
}

/// Record snapshots created by a schedule fire
pub fn record_snapshots_created(schedule: &str, count: u64) {
    SNAPSHOTS_CREATED.add(
        count,
        &[opentelemetry::KeyValue::new(
            "schedule",
            schedule.to_string(),
        )],
    );
}

/// Record snapshots deleted by retention
pub fn record_snapshots_deleted(schedule: &str, count: u64) {
    SNAPSHOTS_DELETED.add(
        count,
        &[opentelemetry::KeyValue::new(
            "schedule",
            schedule.to_string(),
        )],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_label_as_str() {
        assert_eq!(SchedulePhaseLabel::Active.as_str(), "active");
        assert_eq!(SchedulePhaseLabel::Paused.as_str(), "paused");
        assert_eq!(SchedulePhaseLabel::Failed.as_str(), "failed");
    }

    #[test]
    fn test_reconcile_timer() {
        let timer = ReconcileTimer::start("nightly");
        assert_eq!(timer.schedule, "nightly");
        timer.success();

        let timer = ReconcileTimer::start("nightly");
        timer.error("transient");
    }

    #[test]
    fn test_snapshot_counters_do_not_panic() {
        record_snapshots_created("nightly", 2);
        record_snapshots_deleted("nightly", 1);
        set_schedule_phase_count(SchedulePhaseLabel::Active, 1);
    }
}
