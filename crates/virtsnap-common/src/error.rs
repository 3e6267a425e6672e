//! Error types for the virtsnap operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the schedule or object it relates to plus the
//! underlying cause where one exists.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for virtsnap operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for schedule specs
    #[error("validation error for {schedule}: {message}")]
    Validation {
        /// Name of the schedule with invalid configuration
        schedule: String,
        /// Description of what's invalid
        message: String,
    },

    /// A referenced VirtualMachine does not exist in the cache
    #[error("VirtualMachine {namespace}/{name} not found")]
    VmNotFound {
        /// Namespace of the missing VirtualMachine
        namespace: String,
        /// Name of the missing VirtualMachine
        name: String,
    },

    /// One or more snapshot creations failed during a fire
    #[error("failed to create snapshots for {schedule}: {message}")]
    SnapshotCreate {
        /// Name of the schedule that fired
        schedule: String,
        /// Joined per-VM failure messages
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "status")
        context: String,
    },
}

impl Error {
    /// Create a validation error without schedule context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            schedule: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error with schedule context
    pub fn validation_for(schedule: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            schedule: schedule.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for a VirtualMachine lookup
    pub fn vm_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::VmNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a snapshot-create error with the joined failure messages
    pub fn snapshot_create(schedule: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SnapshotCreate {
            schedule: schedule.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error without specific context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors are not retryable (require spec
    /// fix). A missing VirtualMachine recovers once the VM appears, so it is
    /// retryable. Kubernetes errors depend on the status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry on transient K8s errors (connection, timeout).
                // Don't retry on 4xx errors (validation, not found, etc.)
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Validation { .. } => false,
            Error::VmNotFound { .. } => true,
            Error::SnapshotCreate { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the schedule name if this error is associated with one
    pub fn schedule(&self) -> Option<&str> {
        match self {
            Error::Validation { schedule, .. } => Some(schedule),
            Error::SnapshotCreate { schedule, .. } => Some(schedule),
            _ => None,
        }
    }
}
