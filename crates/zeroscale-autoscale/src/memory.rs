//! In-memory cluster backend (for testing).
//!
//! Implements both [`WorkloadClient`] and [`ActivitySource`] over plain
//! maps, with resource versions bumped on every write so optimistic
//! concurrency behaves like an API server. Tests drive activity with
//! [`InMemoryCluster::emit`] and inject failures with
//! [`InMemoryCluster::fail_next_update`] and
//! [`InMemoryCluster::make_unavailable`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::mpsc;

use zeroscale_core::{ResourceKind, WorkloadIdentity};

use crate::client::{
    ActivitySource, BoxFuture, ChangeStream, ObservedChange, WorkloadClient, WorkloadScale,
};
use crate::error::{ScaleError, WatchError};

type ChangeSender = mpsc::UnboundedSender<Result<ObservedChange, WatchError>>;

#[derive(Default)]
struct Inner {
    workloads: HashMap<WorkloadIdentity, WorkloadScale>,
    next_version: u64,
    reads: u64,
    writes: u64,
    failing_updates: VecDeque<ScaleError>,
    watchers: HashMap<ResourceKind, Vec<ChangeSender>>,
    unavailable: HashSet<ResourceKind>,
}

impl Inner {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// Shared, cloneable in-memory cluster.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a workload with the given replica count.
    pub fn insert_workload(&self, workload: &WorkloadIdentity, replicas: i32) {
        let mut inner = self.inner.lock().expect("cluster lock");
        let version = inner.bump_version();
        inner.workloads.insert(
            workload.clone(),
            WorkloadScale {
                replicas,
                resource_version: Some(version),
            },
        );
    }

    /// Simulate another writer changing the replica count.
    pub fn set_replicas(&self, workload: &WorkloadIdentity, replicas: i32) {
        self.insert_workload(workload, replicas);
    }

    pub fn remove_workload(&self, workload: &WorkloadIdentity) {
        self.inner
            .lock()
            .expect("cluster lock")
            .workloads
            .remove(workload);
    }

    pub fn replicas(&self, workload: &WorkloadIdentity) -> Option<i32> {
        self.inner
            .lock()
            .expect("cluster lock")
            .workloads
            .get(workload)
            .map(|w| w.replicas)
    }

    /// Number of successful replica writes.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().expect("cluster lock").writes
    }

    /// Number of replica reads.
    pub fn read_count(&self) -> u64 {
        self.inner.lock().expect("cluster lock").reads
    }

    /// Make the next update fail with `err`. Calls queue up.
    pub fn fail_next_update(&self, err: ScaleError) {
        self.inner
            .lock()
            .expect("cluster lock")
            .failing_updates
            .push_back(err);
    }

    /// Make watches on `kind` fail to establish.
    pub fn make_unavailable(&self, kind: &ResourceKind) {
        self.inner
            .lock()
            .expect("cluster lock")
            .unavailable
            .insert(kind.clone());
    }

    /// Deliver a change to every open watch on `kind`. Returns the number
    /// of watches reached.
    pub fn emit(&self, kind: &ResourceKind, change: ObservedChange) -> usize {
        let mut inner = self.inner.lock().expect("cluster lock");
        let Some(senders) = inner.watchers.get_mut(kind) else {
            return 0;
        };
        senders.retain(|tx| tx.send(Ok(change.clone())).is_ok());
        senders.len()
    }

    /// Deliver a stream error to every open watch on `kind`.
    pub fn emit_error(&self, kind: &ResourceKind, reason: &str) {
        let mut inner = self.inner.lock().expect("cluster lock");
        if let Some(senders) = inner.watchers.get_mut(kind) {
            senders.retain(|tx| tx.send(Err(WatchError::Stream(reason.to_string()))).is_ok());
        }
    }

    /// Number of open watches on `kind`.
    pub fn watch_count(&self, kind: &ResourceKind) -> usize {
        let mut inner = self.inner.lock().expect("cluster lock");
        match inner.watchers.get_mut(kind) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

impl WorkloadClient for InMemoryCluster {
    fn get_scale<'a>(
        &'a self,
        workload: &'a WorkloadIdentity,
    ) -> BoxFuture<'a, Result<WorkloadScale, ScaleError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("cluster lock");
            inner.reads += 1;
            inner
                .workloads
                .get(workload)
                .cloned()
                .ok_or_else(|| ScaleError::NotFound(workload.to_string()))
        })
    }

    fn replace_scale<'a>(
        &'a self,
        workload: &'a WorkloadIdentity,
        current: &'a WorkloadScale,
        replicas: i32,
    ) -> BoxFuture<'a, Result<(), ScaleError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("cluster lock");
            if let Some(err) = inner.failing_updates.pop_front() {
                return Err(err);
            }

            let stored_version = inner
                .workloads
                .get(workload)
                .ok_or_else(|| ScaleError::NotFound(workload.to_string()))?
                .resource_version
                .clone();
            if stored_version != current.resource_version {
                return Err(ScaleError::Conflict(workload.to_string()));
            }

            let version = inner.bump_version();
            inner.writes += 1;
            if let Some(stored) = inner.workloads.get_mut(workload) {
                stored.replicas = replicas;
                stored.resource_version = Some(version);
            }
            Ok(())
        })
    }
}

impl ActivitySource for InMemoryCluster {
    fn watch<'a>(
        &'a self,
        kind: &'a ResourceKind,
    ) -> BoxFuture<'a, Result<ChangeStream, WatchError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("cluster lock");
            if inner.unavailable.contains(kind) {
                return Err(WatchError::Establish {
                    kind: kind.to_string(),
                    reason: "the server could not find the requested resource".to_string(),
                });
            }

            let (tx, rx) = mpsc::unbounded_channel();
            inner.watchers.entry(kind.clone()).or_default().push(tx);

            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            Ok(stream.boxed())
        })
    }
}
