//! SidecarWorkload controller
//!
//! The reconcile loop is split into a pure state machine ([`next_transition`])
//! and the I/O that carries out each transition ([`reconcile_key`]). Shared
//! per-key state lives in the [`DeletionTracker`] and [`ErrorBackoff`].

mod backoff;
mod conditions;
mod deletion;
mod reconciler;
mod state;

pub use backoff::{BackoffConfig, ErrorBackoff};
pub use conditions::{upsert_condition, upsert_condition_at, upsert_workload_status};
pub use deletion::DeletionTracker;
pub use reconciler::{
    error_policy, reconcile, reconcile_key, Context, ContextBuilder, DEFAULT_REQUEUE_DELAY,
};
pub use state::{next_transition, ReconcileState, Requeue, Transition};
