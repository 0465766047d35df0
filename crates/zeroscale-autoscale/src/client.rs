//! Cluster seams — injected for testability.
//!
//! The engine never talks to an API server directly. It reads and writes
//! replica counts through a [`WorkloadClient`] and opens per-kind change
//! streams through an [`ActivitySource`]. The Kubernetes adapter and the
//! in-memory cluster both implement these traits.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use futures::Stream;

use zeroscale_core::{ResourceKind, WorkloadIdentity};

use crate::error::{ScaleError, WatchError};

/// Boxed future alias for the seam traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stream of raw changes for one watched kind.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ObservedChange, WatchError>> + Send>>;

/// Current replica count of a workload plus the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadScale {
    pub replicas: i32,
    /// Opaque version used for optimistic concurrency on write.
    pub resource_version: Option<String>,
}

/// Reads and conditionally writes a workload's replica count.
pub trait WorkloadClient: Send + Sync {
    /// Fetch the workload's current replica count.
    fn get_scale<'a>(
        &'a self,
        workload: &'a WorkloadIdentity,
    ) -> BoxFuture<'a, Result<WorkloadScale, ScaleError>>;

    /// Write `replicas`, conditional on the workload still being at
    /// `current.resource_version`. A stale version yields
    /// [`ScaleError::Conflict`].
    fn replace_scale<'a>(
        &'a self,
        workload: &'a WorkloadIdentity,
        current: &'a WorkloadScale,
        replicas: i32,
    ) -> BoxFuture<'a, Result<(), ScaleError>>;
}

/// Opens change streams over all resources of a kind.
pub trait ActivitySource: Send + Sync {
    /// Establish a watch. The returned stream starts with a resync of the
    /// existing objects.
    fn watch<'a>(
        &'a self,
        kind: &'a ResourceKind,
    ) -> BoxFuture<'a, Result<ChangeStream, WatchError>>;
}

/// A raw change as reported by a watch.
///
/// Watches report the new state of an object but not the old one; the
/// activity monitor's live view supplies the old snapshot. A resync
/// (initial list, or relist after a dropped watch) is bracketed by
/// `ResyncStarted` and `ResyncDone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedChange {
    Applied(ResourceSnapshot),
    Deleted(ResourceSnapshot),
    ResyncStarted,
    ResyncApplied(ResourceSnapshot),
    ResyncDone,
}

/// The metadata of a watched object that the activity filter looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceSnapshot {
    pub namespace: Option<String>,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub generation: Option<i64>,
    pub resource_version: Option<String>,
}

/// Identity of an object within one kind.
pub type ObjectKey = (Option<String>, String);

impl ResourceSnapshot {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        (self.namespace.clone(), self.name.clone())
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_resource_version(mut self, version: &str) -> Self {
        self.resource_version = Some(version.to_string());
        self
    }
}
