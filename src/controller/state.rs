//! The SidecarWorkload state machine, free of I/O
//!
//! Each reconcile observes one [`ReconcileState`] and performs the single
//! [`Transition`] that [`next_transition`] picks for it. Progress across
//! several steps comes from the returned [`Requeue`], never from looping
//! inside one invocation.
//!
//! ```text
//!  start ─┬─ Missing ───────────── Quiet (recently deleted) | Retry
//!         ├─ Deleting ──────────── RemoveFinalizer (held) | Quiet
//!         ├─ NeedsFinalizer ────── AddFinalizer ──> requeue now
//!         ├─ ListFailed ────────── Retry
//!         ├─ NoTargets ─────────── MarkUpToDate(NoWorkloadsFound)
//!         └─ Reconciled{n} ─────── MarkUpToDate(FinishedReconcile)
//! ```

use std::time::Duration;

use kube::runtime::controller::Action;

use crate::crd::{SidecarWorkload, REASON_FINISHED_RECONCILE, REASON_NO_WORKLOADS_FOUND};

/// When the dispatcher should invoke the loop again for the same key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for the next change event
    None,
    /// Re-run right away
    Immediate,
    /// Re-run after a delay
    After(Duration),
}

impl Requeue {
    /// The kube runtime action for this directive
    pub fn into_action(self) -> Action {
        match self {
            Requeue::None => Action::await_change(),
            Requeue::Immediate => Action::requeue(Duration::ZERO),
            Requeue::After(delay) => Action::requeue(delay),
        }
    }
}

/// What a reconcile observed about one SidecarWorkload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileState {
    /// The resource could not be fetched
    Missing {
        /// The key was last observed deleted
        recently_deleted: bool,
    },
    /// The deletion timestamp is set
    Deleting {
        /// This controller's finalizer is still present
        has_finalizer: bool,
    },
    /// Live, but not yet claimed by the finalizer
    NeedsFinalizer,
    /// Claimed, but the selected workloads could not be listed
    ListFailed,
    /// Claimed, and the selector matched nothing
    NoTargets,
    /// Claimed, and the selector matched `count` workloads
    Reconciled {
        /// Number of matching workloads
        count: usize,
    },
}

impl ReconcileState {
    /// State decided by metadata alone, before any workload lookup
    ///
    /// Returns `None` when the resource is live and claimed, meaning the
    /// outcome depends on the workload lookup (see [`Self::after_lookup`]).
    pub fn before_lookup(resource: &SidecarWorkload) -> Option<Self> {
        if resource.is_deleting() {
            return Some(Self::Deleting {
                has_finalizer: resource.has_finalizer(),
            });
        }
        if !resource.has_finalizer() {
            return Some(Self::NeedsFinalizer);
        }
        None
    }

    /// State once the workload lookup has finished
    pub fn after_lookup<T, E>(lookup: &Result<Vec<T>, E>) -> Self {
        match lookup {
            Err(_) => Self::ListFailed,
            Ok(found) if found.is_empty() => Self::NoTargets,
            Ok(found) => Self::Reconciled { count: found.len() },
        }
    }
}

/// The single action a reconcile takes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do, no error
    Quiet,
    /// Surface the error and retry after a delay
    Retry,
    /// Add the finalizer and update the resource
    AddFinalizer,
    /// Remove the finalizer and update the resource
    RemoveFinalizer,
    /// Set `UpToDate=True` and patch the status
    MarkUpToDate {
        /// Condition reason
        reason: &'static str,
        /// Condition message
        message: String,
    },
}

impl Transition {
    /// Requeue directive for this transition, given the retry delay
    ///
    /// `Retry` is reported to the dispatcher as an error, so the delay it
    /// actually waits comes from `error_policy` and its per-key backoff
    /// (500ms at first by default), not from `retry_delay`.
    pub fn requeue(&self, retry_delay: Duration) -> Requeue {
        match self {
            Transition::AddFinalizer => Requeue::Immediate,
            Transition::Retry => Requeue::After(retry_delay),
            Transition::Quiet | Transition::RemoveFinalizer | Transition::MarkUpToDate { .. } => {
                Requeue::None
            }
        }
    }

    /// True if the transition writes to the store
    pub fn writes(&self) -> bool {
        matches!(
            self,
            Transition::AddFinalizer
                | Transition::RemoveFinalizer
                | Transition::MarkUpToDate { .. }
        )
    }

    /// True if the transition reports an error to the dispatcher
    pub fn surfaces_error(&self) -> bool {
        matches!(self, Transition::Retry)
    }
}

/// Pick the transition for an observed state
pub fn next_transition(state: &ReconcileState) -> Transition {
    match state {
        ReconcileState::Missing {
            recently_deleted: true,
        } => Transition::Quiet,
        ReconcileState::Missing {
            recently_deleted: false,
        } => Transition::Retry,
        ReconcileState::Deleting {
            has_finalizer: true,
        } => Transition::RemoveFinalizer,
        ReconcileState::Deleting {
            has_finalizer: false,
        } => Transition::Quiet,
        ReconcileState::NeedsFinalizer => Transition::AddFinalizer,
        ReconcileState::ListFailed => Transition::Retry,
        ReconcileState::NoTargets => Transition::MarkUpToDate {
            reason: REASON_NO_WORKLOADS_FOUND,
            message: "No workload updates needed".to_string(),
        },
        ReconcileState::Reconciled { count } => Transition::MarkUpToDate {
            reason: REASON_FINISHED_RECONCILE,
            message: format!("Reconciled {count} matching workloads complete"),
        },
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    use super::*;
    use crate::crd::{SidecarSpec, SidecarWorkloadSpec, WorkloadSelector, SIDECAR_FINALIZER};

    const DELAY: Duration = Duration::from_secs(30);

    fn resource(finalizer: bool, deleting: bool) -> SidecarWorkload {
        SidecarWorkload {
            metadata: ObjectMeta {
                name: Some("proxy".to_string()),
                namespace: Some("default".to_string()),
                finalizers: finalizer.then(|| vec![SIDECAR_FINALIZER.to_string()]),
                deletion_timestamp: deleting.then(|| Time(chrono::Utc::now())),
                ..Default::default()
            },
            spec: SidecarWorkloadSpec {
                selector: WorkloadSelector::by_name("Deployment", "web"),
                sidecar: SidecarSpec::default(),
            },
            status: None,
        }
    }

    fn all_states() -> Vec<ReconcileState> {
        vec![
            ReconcileState::Missing {
                recently_deleted: true,
            },
            ReconcileState::Missing {
                recently_deleted: false,
            },
            ReconcileState::Deleting {
                has_finalizer: true,
            },
            ReconcileState::Deleting {
                has_finalizer: false,
            },
            ReconcileState::NeedsFinalizer,
            ReconcileState::ListFailed,
            ReconcileState::NoTargets,
            ReconcileState::Reconciled { count: 2 },
        ]
    }

    #[test]
    fn transition_table() {
        let expected = [
            (Transition::Quiet, Requeue::None, false),
            (Transition::Retry, Requeue::After(DELAY), true),
            (Transition::RemoveFinalizer, Requeue::None, false),
            (Transition::Quiet, Requeue::None, false),
            (Transition::AddFinalizer, Requeue::Immediate, false),
            (Transition::Retry, Requeue::After(DELAY), true),
            (
                Transition::MarkUpToDate {
                    reason: REASON_NO_WORKLOADS_FOUND,
                    message: "No workload updates needed".to_string(),
                },
                Requeue::None,
                false,
            ),
            (
                Transition::MarkUpToDate {
                    reason: REASON_FINISHED_RECONCILE,
                    message: "Reconciled 2 matching workloads complete".to_string(),
                },
                Requeue::None,
                false,
            ),
        ];

        let states = all_states();
        assert_eq!(states.len(), expected.len(), "every state needs a row");
        for (state, (transition, requeue, error)) in states.iter().zip(expected) {
            let got = next_transition(state);
            assert_eq!(got, transition, "state {state:?}");
            assert_eq!(got.requeue(DELAY), requeue, "state {state:?}");
            assert_eq!(got.surfaces_error(), error, "state {state:?}");
        }
    }

    #[test]
    fn marking_up_to_date_carries_reason_and_count() {
        match next_transition(&ReconcileState::NoTargets) {
            Transition::MarkUpToDate { reason, message } => {
                assert_eq!(reason, "NoWorkloadsFound");
                assert_eq!(message, "No workload updates needed");
            }
            other => panic!("unexpected {other:?}"),
        }

        match next_transition(&ReconcileState::Reconciled { count: 2 }) {
            Transition::MarkUpToDate { reason, message } => {
                assert_eq!(reason, "FinishedReconcile");
                assert!(message.contains('2'));
            }
            other => panic!("unexpected {other:?}"),
        }

        let t = next_transition(&ReconcileState::Reconciled { count: 7 });
        assert_eq!(t.requeue(DELAY), Requeue::None);
        assert!(t.writes());
    }

    /// Story: a deleted resource never goes back through create/update
    ///
    /// Whatever else is true of it, a resource with a deletion timestamp
    /// maps to the delete path: no finalizer is added and UpToDate is not
    /// set.
    #[test]
    fn story_deletion_takes_precedence() {
        for finalizer in [true, false] {
            let state = ReconcileState::before_lookup(&resource(finalizer, true)).unwrap();
            assert_eq!(
                state,
                ReconcileState::Deleting {
                    has_finalizer: finalizer
                }
            );
            let t = next_transition(&state);
            assert_ne!(t, Transition::AddFinalizer);
            assert!(!matches!(t, Transition::MarkUpToDate { .. }));
        }
    }

    #[test]
    fn unclaimed_resource_needs_finalizer() {
        assert_eq!(
            ReconcileState::before_lookup(&resource(false, false)),
            Some(ReconcileState::NeedsFinalizer)
        );
        assert_eq!(ReconcileState::before_lookup(&resource(true, false)), None);
    }

    #[test]
    fn lookup_results_map_to_states() {
        let failed: Result<Vec<u8>, &str> = Err("boom");
        let empty: Result<Vec<u8>, &str> = Ok(vec![]);
        let two: Result<Vec<u8>, &str> = Ok(vec![1, 2]);

        assert_eq!(ReconcileState::after_lookup(&failed), ReconcileState::ListFailed);
        assert_eq!(ReconcileState::after_lookup(&empty), ReconcileState::NoTargets);
        assert_eq!(
            ReconcileState::after_lookup(&two),
            ReconcileState::Reconciled { count: 2 }
        );
    }

    /// Story: every step is at most one write
    ///
    /// Writing and surfacing an error are mutually exclusive, and only the
    /// finalizer claim asks for an immediate re-run.
    #[test]
    fn story_each_transition_writes_at_most_once() {
        for state in all_states() {
            let t = next_transition(&state);
            assert!(!(t.writes() && t.surfaces_error()), "state {state:?}");
            if t.requeue(DELAY) == Requeue::Immediate {
                assert_eq!(t, Transition::AddFinalizer);
            }
        }
    }

    #[test]
    fn requeue_maps_to_actions() {
        assert_eq!(Requeue::None.into_action(), Action::await_change());
        assert_eq!(
            Requeue::Immediate.into_action(),
            Action::requeue(Duration::ZERO)
        );
        assert_eq!(
            Requeue::After(DELAY).into_action(),
            Action::requeue(DELAY)
        );
    }
}
