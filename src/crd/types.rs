//! Supporting types for the SidecarWorkload CRD

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Resource-level condition: all selected workloads are reconciled
pub const CONDITION_UP_TO_DATE: &str = "UpToDate";

/// Per-workload condition recorded in each [`WorkloadStatus`]
pub const CONDITION_WORKLOAD_UP_TO_DATE: &str = "WorkloadUpToDate";

/// Reason: the selector matched no workloads
pub const REASON_NO_WORKLOADS_FOUND: &str = "NoWorkloadsFound";

/// Reason: every matching workload has been recorded
pub const REASON_FINISHED_RECONCILE: &str = "FinishedReconcile";

/// Reason: a single workload needs no further update
pub const REASON_UP_TO_DATE: &str = "UpToDate";

/// Selects the workloads a SidecarWorkload applies to
///
/// A non-empty `name` selects exactly one workload and any `label_selector`
/// is ignored.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSelector {
    /// Workload kind (e.g. `Deployment`, `Deployment.apps`, `Job.v1.batch`)
    pub kind: String,

    /// Name of a single workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace to search, defaulting to the SidecarWorkload's own namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Label selector matching one or more workloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
}

impl WorkloadSelector {
    /// Select a single workload by kind and name
    pub fn by_name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Select workloads of a kind by label selector
    pub fn by_labels(kind: impl Into<String>, selector: LabelSelector) -> Self {
        Self {
            kind: kind.into(),
            label_selector: Some(selector),
            ..Default::default()
        }
    }

    /// Set the namespace override and return self for chaining
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The explicit workload name, if one is set and non-empty
    pub fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Namespace to resolve in: the override if set, else `default_namespace`
    pub fn resolve_namespace<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default_namespace)
    }

    /// Validate the selector
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.kind.trim().is_empty() {
            return Err(crate::Error::selector("selector kind must not be empty"));
        }
        Ok(())
    }
}

/// Sidecar the admission mutator injects into selected workloads
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidecarSpec {
    /// Container image for the sidecar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Annotations the mutator adds to the pod template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
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
/// `last_transition_time` is stamped by
/// [`upsert_condition`](crate::controller::upsert_condition) and only moves
/// when `status` changes.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, unique within a status
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Generation of the resource this condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition's status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a new, unstamped condition
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            observed_generation: None,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }

    /// Set the observed generation and return self for chaining
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Reconcile status of one selected workload
///
/// Unique per `(kind, version, namespace, name)` within a status.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    /// Workload kind (e.g. Deployment)
    pub kind: String,

    /// Group/version identifier (e.g. `apps/v1`)
    pub version: String,

    /// Workload namespace
    pub namespace: String,

    /// Workload name
    pub name: String,

    /// Conditions for this workload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl WorkloadStatus {
    /// True if both entries describe the same workload
    pub fn same_workload(&self, other: &WorkloadStatus) -> bool {
        self.kind == other.kind
            && self.version == other.version
            && self.namespace == other.namespace
            && self.name == other.name
    }
}
