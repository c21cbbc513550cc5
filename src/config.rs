//! Controller configuration from flags and environment

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::controller::{BackoffConfig, Context};
use crate::store::ResourceStore;
use crate::Error;

/// Settings for the `controller` subcommand
///
/// Every flag falls back to an environment variable so the operator can be
/// configured from a Deployment manifest without changing its args.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Seconds to wait before retrying a step that needs outside change
    #[arg(long, env = "SIDECAR_REQUEUE_DELAY_SECS", default_value_t = 30)]
    pub requeue_delay_secs: u64,

    /// Field manager recorded on every write
    #[arg(long, env = "SIDECAR_FIELD_MANAGER", default_value = "sidecar-operator")]
    pub field_manager: String,

    /// Only watch SidecarWorkloads in this namespace (all namespaces if unset)
    #[arg(long, env = "SIDECAR_WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// First backoff delay after a failed reconcile, in milliseconds
    #[arg(long, env = "SIDECAR_BACKOFF_INITIAL_MS", default_value_t = 500)]
    pub backoff_initial_ms: u64,

    /// Upper bound for the failure backoff, in seconds
    #[arg(long, env = "SIDECAR_BACKOFF_MAX_SECS", default_value_t = 300)]
    pub backoff_max_secs: u64,

    /// Do not install or update the CRD on startup
    #[arg(long, env = "SIDECAR_SKIP_CRD_INSTALL")]
    pub skip_crd_install: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_delay_secs: 30,
            field_manager: "sidecar-operator".to_string(),
            namespace: None,
            backoff_initial_ms: 500,
            backoff_max_secs: 300,
            skip_crd_install: false,
        }
    }
}

impl ControllerConfig {
    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.requeue_delay_secs == 0 {
            return Err(Error::validation("requeue delay must be at least one second"));
        }
        if self.field_manager.trim().is_empty() {
            return Err(Error::validation("field manager cannot be empty"));
        }
        if self.backoff_initial_ms == 0 {
            return Err(Error::validation("initial backoff must be positive"));
        }
        if self.backoff().initial_delay > self.backoff().max_delay {
            return Err(Error::validation(
                "initial backoff cannot exceed the maximum backoff",
            ));
        }
        Ok(())
    }

    /// Retry delay as a Duration
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs)
    }

    /// Backoff tuning derived from the flags
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.backoff_initial_ms),
            max_delay: Duration::from_secs(self.backoff_max_secs),
            ..Default::default()
        }
    }

    /// Build a controller context over `store`
    pub fn context(&self, store: Arc<dyn ResourceStore>) -> Context {
        Context::builder(store)
            .requeue_delay(self.requeue_delay())
            .backoff(self.backoff())
            .build()
    }
}
