//! zeroscale-autoscale — idle-timeout scale-to-zero for single-replica
//! workloads.
//!
//! A registered workload is held at one replica while resources of its
//! watched kinds keep changing, and scaled to zero once none have changed
//! for a full idle timeout.
//!
//! # Architecture
//!
//! ```text
//! Reconciler ──(annotations + fingerprint)──▶ RegistrationStore
//!                                                 │ one per workload
//!                                                 ▼
//!   ActivitySource ──▶ delivery task per kind ──▶ AutoScaler loop
//!     (watch streams)   (LiveView → WatchEvent)     │ activity → 1
//!                       coalescing signal, cap 1    │ idle     → 0
//!                                                   ▼
//!                                              ScaleExecutor ──▶ WorkloadClient
//!                                         (re-read, write only if different)
//! ```
//!
//! The cluster is reached only through the [`WorkloadClient`] and
//! [`ActivitySource`] traits; [`memory::InMemoryCluster`] implements both
//! for tests.

pub mod activity;
pub mod client;
pub mod error;
pub mod executor;
pub mod memory;
pub mod reconcile;
pub mod registry;
pub mod scaler;
mod shutdown;

pub use activity::{LiveView, WatchEvent};
pub use client::{
    ActivitySource, BoxFuture, ChangeStream, ObservedChange, ResourceSnapshot, WorkloadClient,
    WorkloadScale,
};
pub use error::{AutoscaleError, AutoscaleResult, ScaleError, WatchError};
pub use executor::{ScaleExecutor, ScaleOutcome};
pub use reconcile::{ReconcileAction, Reconciler};
pub use registry::RegistrationStore;
pub use scaler::{AutoScaler, EngineState};
