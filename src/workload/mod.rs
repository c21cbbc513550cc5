//! Workload kinds a SidecarWorkload can select
//!
//! Targets are heterogeneous (Deployments, Jobs, Pods, ...). The controller
//! only needs their identity, so every kind is handled through a
//! [`WorkloadKind`] that knows its [`ApiResource`]; objects are fetched as
//! [`DynamicObject`]s and reduced to a [`Workload`].
//!
//! [`WorkloadRegistry`] maps a kind name to a factory producing the
//! matching [`WorkloadKind`].

mod locator;

pub use locator::WorkloadLocator;

use std::collections::HashMap;
use std::marker::PhantomData;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;

use crate::crd::WorkloadStatus;
use crate::Error;

/// Identity of a selected workload
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Workload {
    /// Kind, e.g. `Deployment`
    pub kind: String,
    /// Group/version identifier, e.g. `apps/v1`
    pub api_version: String,
    /// Namespace the workload lives in
    pub namespace: String,
    /// Workload name
    pub name: String,
}

impl Workload {
    /// An empty status entry identifying this workload
    pub fn new_status(&self) -> WorkloadStatus {
        WorkloadStatus {
            kind: self.kind.clone(),
            version: self.api_version.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            conditions: Vec::new(),
        }
    }
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A workload kind the locator can fetch and list
pub trait WorkloadKind: Send + Sync {
    /// API resource used for typed-erased get/list calls
    fn api_resource(&self) -> ApiResource;

    /// Kind name, e.g. `StatefulSet`
    fn kind(&self) -> String {
        self.api_resource().kind
    }

    /// Reduce a fetched object of this kind to its identity
    ///
    /// List items often come back without `apiVersion`/`kind`, so the
    /// identity comes from the [`ApiResource`] rather than the object.
    fn workload(&self, obj: &DynamicObject, namespace: &str) -> Workload {
        let ar = self.api_resource();
        Workload {
            kind: ar.kind,
            api_version: ar.api_version,
            namespace: obj.namespace().unwrap_or_else(|| namespace.to_string()),
            name: obj.name_any(),
        }
    }
}

/// [`WorkloadKind`] backed by a k8s-openapi type
pub struct TypedKind<K>(PhantomData<fn() -> K>);

impl<K> Default for TypedKind<K> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K> WorkloadKind for TypedKind<K>
where
    K: kube::Resource<DynamicType = ()>,
{
    fn api_resource(&self) -> ApiResource {
        ApiResource::erase::<K>(&())
    }
}

/// Factory producing a fresh [`WorkloadKind`]
pub type WorkloadFactory = fn() -> Box<dyn WorkloadKind>;

fn typed<K>() -> Box<dyn WorkloadKind>
where
    K: kube::Resource<DynamicType = ()> + 'static,
{
    Box::new(TypedKind::<K>::default())
}

/// Registry of supported workload kinds, keyed by kind name
pub struct WorkloadRegistry {
    factories: HashMap<String, WorkloadFactory>,
}

impl WorkloadRegistry {
    /// A registry with no kinds registered
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The built-in kinds: apps/v1, batch/v1 and core/v1 Pods
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("Deployment", typed::<Deployment>);
        registry.register("StatefulSet", typed::<StatefulSet>);
        registry.register("DaemonSet", typed::<DaemonSet>);
        registry.register("ReplicaSet", typed::<ReplicaSet>);
        registry.register("Job", typed::<Job>);
        registry.register("CronJob", typed::<CronJob>);
        registry.register("Pod", typed::<Pod>);
        registry
    }

    /// Register (or replace) the factory for a kind
    pub fn register(&mut self, kind: impl Into<String>, factory: WorkloadFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Resolve a kind argument (`Kind`, `Kind.group` or `Kind.version.group`)
    pub fn for_kind(&self, kind_arg: &str) -> Result<Box<dyn WorkloadKind>, Error> {
        let kind = parse_kind_arg(kind_arg);
        self.factories
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownKind(kind_arg.to_string()))
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for WorkloadRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The kind segment of a `Kind[.version][.group]` argument
pub fn parse_kind_arg(arg: &str) -> &str {
    let arg = arg.trim();
    arg.split_once('.').map_or(arg, |(kind, _)| kind)
}
