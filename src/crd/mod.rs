//! Custom Resource Definitions for the sidecar operator

mod sidecar_workload;
mod types;

pub use sidecar_workload::{
    ObjectKey, SidecarWorkload, SidecarWorkloadSpec, SidecarWorkloadStatus, SIDECAR_FINALIZER,
};
pub use types::{
    Condition, ConditionStatus, SidecarSpec, WorkloadSelector, WorkloadStatus,
    CONDITION_UP_TO_DATE, CONDITION_WORKLOAD_UP_TO_DATE, REASON_FINISHED_RECONCILE,
    REASON_NO_WORKLOADS_FOUND, REASON_UP_TO_DATE,
};
