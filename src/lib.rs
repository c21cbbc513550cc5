//! sidecar-operator - Kubernetes controller for SidecarWorkload resources
//!
//! A SidecarWorkload selects workloads (Deployments, StatefulSets, Jobs and
//! the like) by name or label selector. The controller claims each resource
//! with a finalizer, records which workloads it currently selects, and
//! reports an `UpToDate` condition. Injecting the sidecar itself is left to
//! an admission-time mutator.
//!
//! # Modules
//!
//! - [`crd`] - The SidecarWorkload CRD and its status types
//! - [`controller`] - Reconcile loop, state machine and status merging
//! - [`workload`] - Workload kinds and selector resolution
//! - [`store`] - Kubernetes reads and writes behind a mockable trait
//! - [`config`] - Controller flags and environment
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod store;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
