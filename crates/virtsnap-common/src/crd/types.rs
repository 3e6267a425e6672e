//! Supporting types shared by the virtsnap CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a condition (True, False, Unknown)
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
///
/// This type follows Kubernetes API conventions and is shared by the
/// schedule and snapshot statuses.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, Progressing, Failure)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Last error encountered by a controller, surfaced through status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusError {
    /// When the error was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Human-readable error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusError {
    /// Create a status error with the given observation time and message
    pub fn new(time: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            time: Some(time),
            message: Some(message.into()),
        }
    }
}

/// Reference to a local object by kind and name
///
/// Used for the schedule's `source` and the snapshot's `source`. The kind
/// must be `VirtualMachine` for schedules.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// API group of the referenced object (e.g. "kubevirt.io")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    /// Kind of the referenced object
    pub kind: String,

    /// Name of the referenced object, in the same namespace
    pub name: String,
}

impl SourceRef {
    /// Create a VirtualMachine reference
    pub fn virtual_machine(name: impl Into<String>) -> Self {
        Self {
            api_group: Some(crate::VIRTUAL_MACHINE_GROUP.to_string()),
            kind: crate::VIRTUAL_MACHINE_KIND.to_string(),
            name: name.into(),
        }
    }
}

/// Comparison operator in a selector expression
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LabelSelectorOperator {
    /// The label's value must appear in the expression's values
    In,
    /// The label is absent, or its value is outside the expression's values
    NotIn,
    /// The label key must be present, whatever its value
    Exists,
    /// The label key must be absent
    DoesNotExist,
}

/// One expression of a label selector, following the Kubernetes
/// `matchExpressions` convention
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key the expression tests
    pub key: String,

    /// How the key relates to `values`
    pub operator: LabelSelectorOperator,

    /// Candidate values for In/NotIn; left empty for Exists/DoesNotExist
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelSelectorRequirement {
    /// Evaluate this expression against a label set
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key);
        match self.operator {
            LabelSelectorOperator::In => actual.is_some_and(|v| self.values.contains(v)),
            LabelSelectorOperator::NotIn => actual.is_none_or(|v| !self.values.contains(v)),
            LabelSelectorOperator::Exists => actual.is_some(),
            LabelSelectorOperator::DoesNotExist => actual.is_none(),
        }
    }
}

/// Selects VirtualMachines in the schedule's namespace by labels.
///
/// Both halves must hold: every `matchLabels` pair must be present
/// verbatim, and every `matchExpressions` entry must evaluate true. The
/// empty selector `{}` selects every VM in the namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmSelector {
    /// Exact key-value pairs the VM's labels must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// Expressions the VM's labels must satisfy, all of them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl VmSelector {
    /// Decide whether a VM carrying the given labels is selected
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let pairs_hold = self
            .match_labels
            .iter()
            .flatten()
            .all(|(key, value)| labels.get(key) == Some(value));

        pairs_hold && self.match_expressions.iter().all(|expr| expr.matches(labels))
    }
}
