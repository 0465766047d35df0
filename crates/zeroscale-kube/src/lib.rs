//! zeroscale-kube — Kubernetes bindings for the zeroscale autoscaler.
//!
//! - [`KubeWorkloadClient`] reads and writes StatefulSet replicas through
//!   the `scale` subresource.
//! - [`KubeActivitySource`] watches any discoverable kind cluster-wide.
//! - [`WorkloadController`] watches StatefulSets and reconciles their
//!   idle-scaling annotations into registrations.

pub mod client;
pub mod controller;
pub mod source;

pub use client::KubeWorkloadClient;
pub use controller::{StatefulSetEvents, WorkloadController};
pub use source::KubeActivitySource;
