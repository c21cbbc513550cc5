//! SidecarWorkload reconciliation
//!
//! [`reconcile_key`] runs one step of the state machine in [`super::state`]
//! against the store: it reads the resource, decides a single transition,
//! performs at most one write and tells the dispatcher when to come back.
//! [`reconcile`] and [`error_policy`] adapt it to `kube::runtime::Controller`.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use super::backoff::{BackoffConfig, ErrorBackoff};
use super::conditions::{upsert_condition, upsert_workload_status};
use super::deletion::DeletionTracker;
use super::state::{next_transition, ReconcileState, Requeue, Transition};
use crate::crd::{
    Condition, ConditionStatus, ObjectKey, SidecarWorkload, CONDITION_UP_TO_DATE,
    CONDITION_WORKLOAD_UP_TO_DATE, REASON_UP_TO_DATE,
};
use crate::store::ResourceStore;
use crate::workload::{Workload, WorkloadLocator, WorkloadRegistry};
use crate::Error;

/// Default delay before retrying a failed step
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(30);

const WORKLOAD_UP_TO_DATE_MESSAGE: &str = "No update needed for this workload";

/// Controller context shared by every reconcile
pub struct Context {
    /// Store for SidecarWorkloads and workloads (trait object for testability)
    pub store: Arc<dyn ResourceStore>,
    /// Which keys were last observed deleted
    pub tracker: Arc<DeletionTracker>,
    /// Supported workload kinds
    pub registry: Arc<WorkloadRegistry>,
    /// Per-key failure streaks consulted by [`error_policy`]
    pub backoff: Arc<ErrorBackoff>,
    /// Delay used for retries that need outside change to succeed
    pub requeue_delay: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(store: Arc<dyn ResourceStore>) -> ContextBuilder {
        ContextBuilder::new(store)
    }

    /// Create a context for testing with the built-in kinds and defaults
    pub fn for_testing(store: Arc<dyn ResourceStore>) -> Self {
        Self::builder(store).build()
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    store: Arc<dyn ResourceStore>,
    tracker: Option<Arc<DeletionTracker>>,
    registry: Option<Arc<WorkloadRegistry>>,
    backoff: BackoffConfig,
    requeue_delay: Duration,
}

impl ContextBuilder {
    fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            tracker: None,
            registry: None,
            backoff: BackoffConfig::default(),
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }

    /// Share an existing deletion tracker
    pub fn tracker(mut self, tracker: Arc<DeletionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Override the workload kind registry
    pub fn registry(mut self, registry: WorkloadRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Override the error backoff tuning
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Override the retry delay
    pub fn requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            store: self.store,
            tracker: self.tracker.unwrap_or_default(),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(WorkloadRegistry::builtin())),
            backoff: Arc::new(ErrorBackoff::new(self.backoff)),
            requeue_delay: self.requeue_delay,
        }
    }
}

/// Reconcile a SidecarWorkload for the kube runtime
///
/// The object handed in by the watcher may be stale, so the loop re-reads
/// it by key.
pub async fn reconcile(resource: Arc<SidecarWorkload>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = resource.key();
    let requeue = reconcile_key(&key, &ctx).await?;
    ctx.backoff.reset(&key);
    Ok(requeue.into_action())
}

/// Retry policy for failed reconciles
///
/// Transient failures back off exponentially from the configured initial
/// delay. Errors that need a spec edit to clear wait at least the requeue
/// delay.
pub fn error_policy(resource: Arc<SidecarWorkload>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = resource.key();
    let mut delay = ctx.backoff.next_delay(&key);
    if error.is_selector_error() || !error.is_retryable() {
        delay = delay.max(ctx.requeue_delay);
    }

    warn!(
        %error,
        resource = %key,
        failures = ctx.backoff.failures(&key),
        delay_ms = delay.as_millis() as u64,
        "reconciliation failed"
    );
    Action::requeue(delay)
}

/// Run one reconcile step for `key`
///
/// `Ok` carries the requeue directive; `Err` surfaces a failure for the
/// dispatcher to retry.
#[instrument(skip(key, ctx), fields(resource = %key))]
pub async fn reconcile_key(key: &ObjectKey, ctx: &Context) -> Result<Requeue, Error> {
    let original = match ctx.store.get_resource(key).await {
        Ok(Some(resource)) => resource,
        fetched => {
            let state = ReconcileState::Missing {
                recently_deleted: ctx.tracker.get(key),
            };
            return match next_transition(&state) {
                Transition::Quiet => {
                    debug!("resource already deleted");
                    Ok(Requeue::None)
                }
                _ => Err(match fetched {
                    Err(e) => e,
                    Ok(_) => Error::NotFound {
                        key: key.to_string(),
                    },
                }),
            };
        }
    };

    ctx.tracker.set(key, original.is_deleting());

    let mut working = original.clone();
    let state = match ReconcileState::before_lookup(&original) {
        Some(state) => state,
        None => {
            let lookup = locate(&original, ctx).await;
            let state = ReconcileState::after_lookup(&lookup);
            match lookup {
                Ok(targets) => update_workload_statuses(&mut working, &targets),
                Err(e) => {
                    warn!(error = %e, "unable to resolve selected workloads");
                    return Err(e);
                }
            }
            state
        }
    };

    let transition = next_transition(&state);
    debug!(?state, ?transition, "reconcile step");

    match &transition {
        Transition::Quiet | Transition::Retry => {}
        Transition::AddFinalizer => {
            working.add_finalizer();
            ctx.store.update_resource(&working).await?;
            info!("added finalizer");
        }
        Transition::RemoveFinalizer => {
            match locate(&original, ctx).await {
                Ok(targets) => update_workload_statuses(&mut working, &targets),
                Err(e) => warn!(error = %e, "unable to refresh workload statuses during delete"),
            }
            working.remove_finalizer();
            ctx.store.update_resource(&working).await?;
            info!("removed finalizer");
        }
        Transition::MarkUpToDate { reason, message } => {
            let condition = Condition::new(
                CONDITION_UP_TO_DATE,
                ConditionStatus::True,
                *reason,
                message.as_str(),
            )
            .observed_generation(original.metadata.generation);
            upsert_condition(&mut working.status_mut().conditions, condition);

            if working.status == original.status {
                debug!("status unchanged, skipping patch");
            } else {
                ctx.store.patch_status(&working, &original).await?;
                info!(%reason, "status updated");
            }
        }
    }

    Ok(transition.requeue(ctx.requeue_delay))
}

async fn locate(resource: &SidecarWorkload, ctx: &Context) -> Result<Vec<Workload>, Error> {
    let namespace = resource.key().namespace;
    WorkloadLocator::new(ctx.store.as_ref(), &ctx.registry)
        .resolve(&resource.spec.selector, &namespace)
        .await
}

/// Mark every target `WorkloadUpToDate=True` in the working copy
///
/// Entries for workloads that are no longer selected are left in place.
fn update_workload_statuses(resource: &mut SidecarWorkload, targets: &[Workload]) {
    let generation = resource.metadata.generation;
    let status = resource.status_mut();

    for target in targets {
        let mut entry = target.new_status();
        if let Some(existing) = status
            .workload_statuses
            .iter()
            .find(|s| s.same_workload(&entry))
        {
            entry.conditions = existing.conditions.clone();
        }

        upsert_condition(
            &mut entry.conditions,
            Condition::new(
                CONDITION_WORKLOAD_UP_TO_DATE,
                ConditionStatus::True,
                REASON_UP_TO_DATE,
                WORKLOAD_UP_TO_DATE_MESSAGE,
            )
            .observed_generation(generation),
        );
        upsert_workload_status(&mut status.workload_statuses, entry);
    }
}
