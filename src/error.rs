//! Error types for the sidecar operator

use thiserror::Error;

/// Main error type for sidecar operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (network, timeouts, eventual-consistency lag)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A write was rejected because the resourceVersion was stale
    #[error("conflict writing {key}: {message}")]
    Conflict {
        /// `namespace/name` of the object being written
        key: String,
        /// Message returned by the API server
        message: String,
    },

    /// The SidecarWorkload could not be found and was not recently deleted
    #[error("SidecarWorkload {key} not found")]
    NotFound {
        /// `namespace/name` of the missing resource
        key: String,
    },

    /// The selector names a workload kind with no registered factory
    #[error("unknown workload kind: {0}")]
    UnknownKind(String),

    /// The workload selector is malformed
    #[error("invalid workload selector: {message}")]
    Selector {
        /// Description of what is wrong with the selector
        message: String,
    },

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

}

impl Error {
    /// Create a selector error with the given message
    pub fn selector(msg: impl Into<String>) -> Self {
        Self::Selector {
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify a kube error from a write against `key`
    ///
    /// HTTP 409 becomes [`Error::Conflict`]; everything else stays a
    /// [`Error::Kube`].
    pub fn from_write(key: impl Into<String>, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict {
                key: key.into(),
                message: ae.message,
            },
            other => Self::Kube(other),
        }
    }

    /// Selector and kind errors need a spec change, so the controller
    /// waits the full requeue delay instead of backing off from zero.
    pub fn is_selector_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownKind(_) | Error::Selector { .. } | Error::Validation(_)
        )
    }

    /// Check if retrying without any spec change could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(_) => true,
            Error::Conflict { .. } => true,
            Error::NotFound { .. } => true,
            Error::UnknownKind(_) => false,
            Error::Selector { .. } => false,
            Error::Validation(_) => false,
        }
    }
}
