//! Activity monitor — turns watch notifications into activity signals.
//!
//! One delivery task runs per watched kind. Each task keeps a live view of
//! the kind's objects, derives add/update/delete events from the raw
//! changes, filters out updates that carry no meaningful change, and pokes
//! the engine through a capacity-one channel. All kinds share the same
//! channel, so the engine never learns which kind was active.
//!
//! ```text
//! ActivitySource::watch(kind) ─► LiveView::apply ─► WatchEvent::is_activity
//!                                                          │
//!              (one task per kind)                         ▼
//!                                              ActivitySignal::notify
//!                                               (try_send, cap = 1)
//!                                                          │
//!                                                          ▼
//!                                                  engine control loop
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use zeroscale_core::{ResourceKind, WorkloadIdentity};

use crate::client::{ActivitySource, ObjectKey, ObservedChange, ResourceSnapshot};
use crate::shutdown;

/// A normalized notification for one object of a watched kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(ResourceSnapshot),
    Updated {
        old: ResourceSnapshot,
        new: ResourceSnapshot,
    },
    Deleted(ResourceSnapshot),
}

impl WatchEvent {
    /// Whether this event counts as activity.
    ///
    /// Adds and deletes always do. An update does only when labels,
    /// annotations, or generation changed; status and resource-version
    /// churn is ignored.
    pub fn is_activity(&self) -> bool {
        match self {
            WatchEvent::Added(_) | WatchEvent::Deleted(_) => true,
            WatchEvent::Updated { old, new } => {
                old.labels != new.labels
                    || old.annotations != new.annotations
                    || old.generation != new.generation
            }
        }
    }
}

/// Cached view of the objects of one watched kind.
#[derive(Debug, Default)]
pub struct LiveView {
    objects: BTreeMap<ObjectKey, ResourceSnapshot>,
    /// Keys seen since the current resync started.
    resync: Option<BTreeSet<ObjectKey>>,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a raw change into the view and return the derived events.
    pub fn apply(&mut self, change: ObservedChange) -> Vec<WatchEvent> {
        match change {
            ObservedChange::Applied(snapshot) => vec![self.upsert(snapshot)],
            ObservedChange::Deleted(snapshot) => {
                self.objects.remove(&snapshot.key());
                vec![WatchEvent::Deleted(snapshot)]
            }
            ObservedChange::ResyncStarted => {
                self.resync = Some(BTreeSet::new());
                Vec::new()
            }
            ObservedChange::ResyncApplied(snapshot) => {
                if let Some(seen) = self.resync.as_mut() {
                    seen.insert(snapshot.key());
                }
                vec![self.upsert(snapshot)]
            }
            ObservedChange::ResyncDone => {
                let Some(seen) = self.resync.take() else {
                    return Vec::new();
                };
                let stale: Vec<ObjectKey> = self
                    .objects
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                stale
                    .into_iter()
                    .filter_map(|key| self.objects.remove(&key))
                    .map(WatchEvent::Deleted)
                    .collect()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&ResourceSnapshot> {
        self.objects.get(key)
    }

    fn upsert(&mut self, snapshot: ResourceSnapshot) -> WatchEvent {
        match self.objects.insert(snapshot.key(), snapshot.clone()) {
            Some(old) => WatchEvent::Updated { old, new: snapshot },
            None => WatchEvent::Added(snapshot),
        }
    }
}

/// Create an engine's activity channel.
pub fn activity_channel() -> (ActivitySignal, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (ActivitySignal { tx }, rx)
}

/// Sending half of an engine's activity channel.
///
/// The channel holds at most one pending signal; signals sent while one is
/// pending are dropped, which is harmless because the engine only needs to
/// know that something happened since its last wakeup.
#[derive(Debug, Clone)]
pub struct ActivitySignal {
    tx: mpsc::Sender<()>,
}

impl ActivitySignal {
    /// Signal activity without blocking. Returns `false` once the engine
    /// has gone away.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                trace!("activity signal already pending, coalesced");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Spawns and owns the per-kind delivery tasks of one engine.
pub struct ActivityMonitor {
    workload: WorkloadIdentity,
    source: Arc<dyn ActivitySource>,
    signal: ActivitySignal,
}

impl ActivityMonitor {
    pub fn new(
        workload: WorkloadIdentity,
        source: Arc<dyn ActivitySource>,
        signal: ActivitySignal,
    ) -> Self {
        Self {
            workload,
            source,
            signal,
        }
    }

    /// Spawn one delivery task per kind. Tasks stop when `shutdown` fires,
    /// when the engine drops its receiver, or when their stream ends.
    pub fn spawn(
        self,
        kinds: &[ResourceKind],
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        kinds
            .iter()
            .cloned()
            .map(|kind| {
                let task = DeliveryTask {
                    workload: self.workload.clone(),
                    source: self.source.clone(),
                    signal: self.signal.clone(),
                    kind,
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(task.run())
            })
            .collect()
    }
}

struct DeliveryTask {
    workload: WorkloadIdentity,
    source: Arc<dyn ActivitySource>,
    signal: ActivitySignal,
    kind: ResourceKind,
    shutdown: watch::Receiver<bool>,
}

impl DeliveryTask {
    async fn run(mut self) {
        let established = tokio::select! {
            biased;
            _ = shutdown::requested(&mut self.shutdown) => return,
            result = self.source.watch(&self.kind) => result,
        };

        let mut stream = match established {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    workload = %self.workload,
                    kind = %self.kind,
                    error = %e,
                    "failed to establish watch, continuing without this kind"
                );
                return;
            }
        };
        debug!(workload = %self.workload, kind = %self.kind, "watch established");

        let mut view = LiveView::new();
        loop {
            tokio::select! {
                biased;
                _ = shutdown::requested(&mut self.shutdown) => break,
                next = stream.next() => match next {
                    Some(Ok(change)) => {
                        let events = view.apply(change);
                        if events.iter().any(WatchEvent::is_activity) {
                            debug!(
                                workload = %self.workload,
                                kind = %self.kind,
                                events = events.len(),
                                "activity observed"
                            );
                            if !self.signal.notify() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(
                            workload = %self.workload,
                            kind = %self.kind,
                            error = %e,
                            "watch stream error"
                        );
                    }
                    None => {
                        info!(workload = %self.workload, kind = %self.kind, "watch stream ended");
                        break;
                    }
                }
            }
        }

        debug!(workload = %self.workload, kind = %self.kind, "watch stopped");
    }
}
