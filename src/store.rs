//! Store access for the reconcile loop
//!
//! [`ResourceStore`] is the only way the controller touches the API server.
//! Production code uses [`KubeStore`]; unit tests use the generated
//! `MockResourceStore`.

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::core::Selector;
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ObjectKey, SidecarWorkload};
use crate::Error;

/// Trait abstracting Kubernetes reads and writes for the controller
///
/// Writes are conditional on the object's resourceVersion; a stale version
/// comes back as [`Error::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a SidecarWorkload, `None` if it does not exist
    async fn get_resource(&self, key: &ObjectKey) -> Result<Option<SidecarWorkload>, Error>;

    /// Replace a SidecarWorkload (metadata and spec), guarded by its resourceVersion
    async fn update_resource(&self, resource: &SidecarWorkload) -> Result<(), Error>;

    /// Merge-patch the status subresource of `resource`
    ///
    /// The patch pins `original`'s resourceVersion, so it fails cleanly if
    /// the object changed since it was read.
    async fn patch_status(
        &self,
        resource: &SidecarWorkload,
        original: &SidecarWorkload,
    ) -> Result<(), Error>;

    /// Fetch one workload by name, `None` if it does not exist
    async fn get_workload(
        &self,
        kind: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// List workloads of a kind in a namespace matching a label selector
    async fn list_workloads(
        &self,
        kind: &ApiResource,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, Error>;
}

/// Params for a JSON merge patch (not server-side apply)
fn merge_patch_params(field_manager: &str) -> PatchParams {
    PatchParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    }
}

/// Status merge patch pinned to `original`'s resourceVersion
fn status_patch(resource: &SidecarWorkload, original: &SidecarWorkload) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "resourceVersion": original.resource_version() },
        "status": resource.status,
    })
}

/// [`ResourceStore`] backed by a kube [`Client`]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    /// Create a new KubeStore wrapping the given kube Client
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn resources(&self, namespace: &str) -> Api<SidecarWorkload> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn workloads(&self, kind: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, kind)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_resource(&self, key: &ObjectKey) -> Result<Option<SidecarWorkload>, Error> {
        Ok(self.resources(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update_resource(&self, resource: &SidecarWorkload) -> Result<(), Error> {
        let key = resource.key();
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };

        self.resources(&key.namespace)
            .replace(&key.name, &params, resource)
            .await
            .map_err(|e| Error::from_write(key.to_string(), e))?;

        debug!(resource = %key, "updated SidecarWorkload");
        Ok(())
    }

    async fn patch_status(
        &self,
        resource: &SidecarWorkload,
        original: &SidecarWorkload,
    ) -> Result<(), Error> {
        let key = resource.key();
        let params = merge_patch_params(&self.field_manager);
        let patch = status_patch(resource, original);

        self.resources(&key.namespace)
            .patch_status(&key.name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_write(key.to_string(), e))?;

        debug!(resource = %key, "patched SidecarWorkload status");
        Ok(())
    }

    async fn get_workload(
        &self,
        kind: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        Ok(self.workloads(kind, namespace).get_opt(name).await?)
    }

    async fn list_workloads(
        &self,
        kind: &ApiResource,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, Error> {
        let params = ListParams::default().labels_from(selector);
        let list = self.workloads(kind, namespace).list(&params).await?;
        Ok(list.items)
    }
}
