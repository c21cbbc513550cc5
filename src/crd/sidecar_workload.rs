//! SidecarWorkload Custom Resource Definition
//!
//! A SidecarWorkload selects workloads by name or label selector and describes
//! the sidecar an admission-time mutator should inject into them. The
//! controller only records which workloads are selected; it never edits them.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, SidecarSpec, WorkloadSelector, WorkloadStatus};

/// Finalizer this controller holds on every SidecarWorkload it has seen
pub const SIDECAR_FINALIZER: &str = "sidecar.dev/SidecarWorkload-finalizer";

/// Specification for a SidecarWorkload
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "sidecar.dev",
    version = "v1alpha1",
    kind = "SidecarWorkload",
    plural = "sidecarworkloads",
    shortname = "sw",
    status = "SidecarWorkloadStatus",
    namespaced,
    printcolumn = r#"{"name":"Kind","type":"string","jsonPath":".spec.selector.kind"}"#,
    printcolumn = r#"{"name":"UpToDate","type":"string","jsonPath":".status.conditions[?(@.type==\"UpToDate\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SidecarWorkloadSpec {
    /// Workloads this resource applies to
    pub selector: WorkloadSelector,

    /// Sidecar to inject into the selected workloads
    #[serde(default)]
    pub sidecar: SidecarSpec,
}

/// Status for a SidecarWorkload
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidecarWorkloadStatus {
    /// Resource-level conditions, unique by type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// One entry per selected workload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workload_statuses: Vec<WorkloadStatus>,
}

impl SidecarWorkloadStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// `namespace/name` identity of a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key from a namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl SidecarWorkload {
    /// The object's `namespace/name` key
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    /// True once the API server has set a deletion timestamp
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// True if this controller's finalizer is present
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == SIDECAR_FINALIZER)
    }

    /// Add the finalizer if missing; returns true if it was added
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.finalizers_mut().push(SIDECAR_FINALIZER.to_string());
        true
    }

    /// Remove the finalizer if present; returns true if it was removed
    pub fn remove_finalizer(&mut self) -> bool {
        let before = self.finalizers().len();
        self.finalizers_mut().retain(|f| f != SIDECAR_FINALIZER);
        before != self.finalizers().len()
    }

    /// Mutable access to the status, creating an empty one if absent
    pub fn status_mut(&mut self) -> &mut SidecarWorkloadStatus {
        self.status.get_or_insert_with(Default::default)
    }
}
