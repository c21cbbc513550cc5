//! Resolve a [`WorkloadSelector`] into concrete workloads

use kube::core::Selector;
use tracing::{debug, error};

use super::{Workload, WorkloadRegistry};
use crate::crd::WorkloadSelector;
use crate::store::ResourceStore;
use crate::Error;

/// Finds the workloads a selector matches
pub struct WorkloadLocator<'a> {
    store: &'a dyn ResourceStore,
    registry: &'a WorkloadRegistry,
}

impl<'a> WorkloadLocator<'a> {
    /// Create a locator over a store and kind registry
    pub fn new(store: &'a dyn ResourceStore, registry: &'a WorkloadRegistry) -> Self {
        Self { store, registry }
    }

    /// Resolve `selector` in `default_namespace` (or the selector's own namespace)
    ///
    /// An explicit name takes precedence over any label selector. A named
    /// workload that does not exist yields an empty list, not an error.
    pub async fn resolve(
        &self,
        selector: &WorkloadSelector,
        default_namespace: &str,
    ) -> Result<Vec<Workload>, Error> {
        selector.validate()?;
        let namespace = selector.resolve_namespace(default_namespace);

        if let Some(name) = selector.explicit_name() {
            return self.load_by_name(&selector.kind, namespace, name).await;
        }

        match &selector.label_selector {
            Some(label_selector) => {
                let parsed = Selector::try_from(label_selector.clone())
                    .map_err(|e| Error::selector(e.to_string()))?;
                self.load_by_labels(&selector.kind, namespace, &parsed).await
            }
            None => {
                debug!(kind = %selector.kind, "selector has neither name nor labels");
                Ok(Vec::new())
            }
        }
    }

    async fn load_by_name(
        &self,
        kind_arg: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Workload>, Error> {
        let kind = self.registry.for_kind(kind_arg)?;
        let ar = kind.api_resource();

        match self.store.get_workload(&ar, namespace, name).await? {
            Some(obj) => Ok(vec![kind.workload(&obj, namespace)]),
            None => {
                debug!(kind = %ar.kind, namespace, name, "named workload not found");
                Ok(Vec::new())
            }
        }
    }

    async fn load_by_labels(
        &self,
        kind_arg: &str,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<Workload>, Error> {
        let kind = self.registry.for_kind(kind_arg)?;
        let ar = kind.api_resource();

        let objects = self
            .store
            .list_workloads(&ar, namespace, selector)
            .await
            .inspect_err(|e| {
                error!(error = %e, kind = %ar.kind, namespace, %selector, "unable to list workloads");
            })?;

        Ok(objects
            .iter()
            .map(|obj| kind.workload(obj, namespace))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
        LabelSelector, LabelSelectorRequirement,
    };
    use kube::api::{ApiResource, DynamicObject};

    use super::*;
    use crate::store::MockResourceStore;

    fn object(ar: &ApiResource, namespace: &str, name: &str) -> DynamicObject {
        DynamicObject::new(name, ar).within(namespace)
    }

    fn app_labels(app: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            ..Default::default()
        }
    }

    /// Story: a named Deployment is fetched with a single point lookup
    #[tokio::test]
    async fn story_name_lookup_returns_the_workload() {
        let mut store = MockResourceStore::new();
        store
            .expect_get_workload()
            .withf(|ar, ns, name| ar.kind == "Deployment" && ns == "team-a" && name == "web")
            .times(1)
            .returning(|ar, ns, name| Ok(Some(object(ar, ns, name))));

        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let found = locator
            .resolve(&WorkloadSelector::by_name("Deployment", "web"), "team-a")
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].api_version, "apps/v1");
        assert_eq!(found[0].namespace, "team-a");
        assert_eq!(found[0].name, "web");
    }

    /// Story: a named workload that does not exist is simply not selected
    #[tokio::test]
    async fn story_missing_named_workload_is_empty_not_error() {
        let mut store = MockResourceStore::new();
        store.expect_get_workload().returning(|_, _, _| Ok(None));

        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let found = locator
            .resolve(&WorkloadSelector::by_name("Job", "migrate"), "default")
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    /// Story: when both name and labels are set only the name is used
    #[tokio::test]
    async fn story_name_takes_precedence_over_labels() {
        let mut store = MockResourceStore::new();
        store
            .expect_get_workload()
            .times(1)
            .returning(|ar, ns, name| Ok(Some(object(ar, ns, name))));
        store.expect_list_workloads().never();

        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let mut selector = WorkloadSelector::by_labels("Deployment", app_labels("web"));
        selector.name = Some("api".to_string());

        let found = locator.resolve(&selector, "default").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "api");
    }

    /// Story: label selection lists in the overriding namespace
    #[tokio::test]
    async fn story_label_selector_lists_in_selector_namespace() {
        let mut store = MockResourceStore::new();
        store
            .expect_list_workloads()
            .withf(|ar, ns, sel| {
                ar.kind == "StatefulSet" && ns == "data" && sel.to_string() == "app=db"
            })
            .times(1)
            .returning(|ar, ns, _| Ok(vec![object(ar, ns, "db-0"), object(ar, ns, "db-1")]));

        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let selector =
            WorkloadSelector::by_labels("StatefulSet.apps", app_labels("db")).in_namespace("data");
        let found = locator.resolve(&selector, "default").await.unwrap();

        let names: Vec<_> = found.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["db-0", "db-1"]);
        assert!(found.iter().all(|w| w.namespace == "data"));
    }

    #[tokio::test]
    async fn unknown_kind_fails_without_store_calls() {
        let mut store = MockResourceStore::new();
        store.expect_get_workload().never();
        store.expect_list_workloads().never();

        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let err = locator
            .resolve(&WorkloadSelector::by_name("Frobnicator", "x"), "default")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKind(_)));

        let err = locator
            .resolve(
                &WorkloadSelector::by_labels("Frobnicator", app_labels("x")),
                "default",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKind(_)));
    }

    #[tokio::test]
    async fn malformed_label_selector_is_a_selector_error() {
        let mut store = MockResourceStore::new();
        store.expect_list_workloads().never();

        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let bad = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "Near".to_string(),
                values: Some(vec!["edge".to_string()]),
            }]),
            ..Default::default()
        };

        let err = locator
            .resolve(&WorkloadSelector::by_labels("Deployment", bad), "default")
            .await
            .unwrap_err();
        assert!(err.is_selector_error(), "got {err:?}");
    }

    #[tokio::test]
    async fn list_errors_propagate() {
        let mut store = MockResourceStore::new();
        store
            .expect_list_workloads()
            .withf(|_, ns, _| ns == "default")
            .returning(|_, _, _| Err(Error::validation("list refused")));

        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let result = locator
            .resolve(
                &WorkloadSelector::by_labels("Deployment", app_labels("web")),
                "default",
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn no_name_and_no_labels_selects_nothing() {
        let store = MockResourceStore::new();
        let registry = WorkloadRegistry::builtin();
        let locator = WorkloadLocator::new(&store, &registry);

        let selector = WorkloadSelector {
            kind: "Deployment".to_string(),
            ..Default::default()
        };
        assert!(locator.resolve(&selector, "default").await.unwrap().is_empty());
    }
}
