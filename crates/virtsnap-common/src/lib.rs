//! Common types for virtsnap: CRDs, errors, events, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod metrics;
pub mod telemetry;
pub mod yaml;

pub use error::Error;
pub use events::{ControllerEvent, EventPublisher, KubeEventPublisher, NullEventPublisher};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label carrying the name of the owning schedule on created snapshots
pub const LABEL_SCHEDULE_NAME: &str = "snapshot.virtsnap.io/schedule-name";

/// Label carrying the namespace of the owning schedule on created snapshots
pub const LABEL_SCHEDULE_NAMESPACE: &str = "snapshot.virtsnap.io/schedule-namespace";

/// Marker label identifying snapshots produced by a schedule
pub const LABEL_SCHEDULED: &str = "snapshot.virtsnap.io/scheduled";

/// Label carrying the source VirtualMachine name on created snapshots
pub const LABEL_SOURCE_NAME: &str = "snapshot.virtsnap.io/source-name";

/// Field manager used for all server-side writes
pub const FIELD_MANAGER: &str = "virtsnap-schedule-controller";

/// Kind accepted for schedule sources
pub const VIRTUAL_MACHINE_KIND: &str = "VirtualMachine";

/// API group of the external VirtualMachine resource
pub const VIRTUAL_MACHINE_GROUP: &str = "kubevirt.io";

/// Deadline stamped onto created snapshots when the template omits one
pub const DEFAULT_FAILURE_DEADLINE: &str = "5m";

/// Maximum length of a generated snapshot name (Kubernetes object name limit)
pub const MAX_NAME_LENGTH: usize = 253;

/// Install the crypto provider for rustls.
///
/// This must be called before creating any TLS connections (including kube
/// clients). Safe to call multiple times - subsequent calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
