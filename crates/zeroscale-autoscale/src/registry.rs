//! Registration store — at most one live engine per workload.
//!
//! The store maps each `WorkloadIdentity` to its running registration and
//! mediates create, cancel, and replace. The map lock is held only while
//! the map itself is mutated; engines run on their own tasks and never
//! touch the store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::info;

use zeroscale_core::{ConfigFingerprint, RegistrationConfig, WorkloadIdentity};

use crate::client::{ActivitySource, WorkloadClient};
use crate::error::{AutoscaleError, AutoscaleResult};
use crate::scaler::{AutoScaler, EngineState};

/// A running engine as seen by the store.
struct Registration {
    config: RegistrationConfig,
    fingerprint: ConfigFingerprint,
    /// Publishing `true` (or dropping this sender) stops the engine.
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<EngineState>,
}

impl Registration {
    fn cancel(&self) {
        // Err only means the engine already exited.
        let _ = self.shutdown.send(true);
    }
}

/// Authoritative map from workload to its running autoscaler.
#[derive(Clone)]
pub struct RegistrationStore {
    client: Arc<dyn WorkloadClient>,
    source: Arc<dyn ActivitySource>,
    registrations: Arc<RwLock<HashMap<WorkloadIdentity, Registration>>>,
}

impl RegistrationStore {
    pub fn new(client: Arc<dyn WorkloadClient>, source: Arc<dyn ActivitySource>) -> Self {
        Self {
            client,
            source,
            registrations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a workload and start its engine.
    ///
    /// Returns before the engine makes its first decision. Registering an
    /// identity that is already live is a caller error; nothing is started.
    pub async fn create(
        &self,
        workload: WorkloadIdentity,
        config: RegistrationConfig,
        fingerprint: ConfigFingerprint,
    ) -> AutoscaleResult<()> {
        let scaler = {
            let mut registrations = self.registrations.write().await;
            if registrations.contains_key(&workload) {
                return Err(AutoscaleError::AlreadyRegistered(workload));
            }
            let (scaler, registration) = self.prepare(&workload, config, fingerprint.clone());
            registrations.insert(workload.clone(), registration);
            scaler
        };

        scaler.start();
        info!(%workload, %fingerprint, "registration created");
        Ok(())
    }

    /// Stop and remove a workload's engine. Returns whether one existed.
    pub async fn cancel(&self, workload: &WorkloadIdentity) -> bool {
        let removed = self.registrations.write().await.remove(workload);
        match removed {
            Some(registration) => {
                registration.cancel();
                info!(%workload, "registration cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel any live engine for the workload and start a new one, within
    /// a single acquisition of the map lock.
    ///
    /// The old engine is signalled before the new one is spawned. Teardown
    /// is not awaited, so one scale call already in flight in the old
    /// engine may still complete; both engines re-read before writing.
    pub async fn replace(
        &self,
        workload: WorkloadIdentity,
        config: RegistrationConfig,
        fingerprint: ConfigFingerprint,
    ) {
        let (scaler, previous) = {
            let mut registrations = self.registrations.write().await;
            let previous = registrations.remove(&workload).map(|old| {
                old.cancel();
                old.fingerprint
            });
            let (scaler, registration) = self.prepare(&workload, config, fingerprint.clone());
            registrations.insert(workload.clone(), registration);
            (scaler, previous)
        };

        scaler.start();
        match previous {
            Some(previous) => info!(%workload, %previous, %fingerprint, "registration replaced"),
            None => info!(%workload, %fingerprint, "registration created"),
        }
    }

    /// Cancel every registration.
    pub async fn cancel_all(&self) -> usize {
        let drained: Vec<(WorkloadIdentity, Registration)> =
            self.registrations.write().await.drain().collect();
        for (_, registration) in &drained {
            registration.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "all registrations cancelled");
        }
        drained.len()
    }

    pub async fn fingerprint(&self, workload: &WorkloadIdentity) -> Option<ConfigFingerprint> {
        let registrations = self.registrations.read().await;
        registrations.get(workload).map(|r| r.fingerprint.clone())
    }

    pub async fn config(&self, workload: &WorkloadIdentity) -> Option<RegistrationConfig> {
        let registrations = self.registrations.read().await;
        registrations.get(workload).map(|r| r.config.clone())
    }

    /// Current engine state of a live registration.
    pub async fn state(&self, workload: &WorkloadIdentity) -> Option<EngineState> {
        let registrations = self.registrations.read().await;
        registrations.get(workload).map(|r| *r.state.borrow())
    }

    /// Subscribe to a live registration's engine state. The receiver keeps
    /// observing the engine after it is cancelled.
    pub async fn subscribe_state(
        &self,
        workload: &WorkloadIdentity,
    ) -> Option<watch::Receiver<EngineState>> {
        let registrations = self.registrations.read().await;
        registrations.get(workload).map(|r| r.state.clone())
    }

    pub async fn contains(&self, workload: &WorkloadIdentity) -> bool {
        self.registrations.read().await.contains_key(workload)
    }

    /// Registered workloads, sorted.
    pub async fn identities(&self) -> Vec<WorkloadIdentity> {
        let registrations = self.registrations.read().await;
        let mut ids: Vec<WorkloadIdentity> = registrations.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.registrations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registrations.read().await.is_empty()
    }

    fn prepare(
        &self,
        workload: &WorkloadIdentity,
        config: RegistrationConfig,
        fingerprint: ConfigFingerprint,
    ) -> (AutoScaler, Registration) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let scaler = AutoScaler::new(
            workload.clone(),
            config.clone(),
            self.client.clone(),
            self.source.clone(),
            shutdown_rx,
        );
        let registration = Registration {
            config,
            fingerprint,
            shutdown,
            state: scaler.state(),
        };
        (scaler, registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use zeroscale_core::ResourceKind;

    use crate::client::{ObservedChange, ResourceSnapshot};
    use crate::memory::InMemoryCluster;

    fn deployments() -> ResourceKind {
        ResourceKind::new("apps", "v1", "Deployment")
    }

    fn config(secs: u64) -> RegistrationConfig {
        RegistrationConfig::new(Duration::from_secs(secs), vec![deployments()], Vec::new())
            .unwrap()
    }

    fn fingerprint(tag: &str) -> ConfigFingerprint {
        ConfigFingerprint::of_parts([tag])
    }

    fn setup() -> (InMemoryCluster, RegistrationStore) {
        let cluster = InMemoryCluster::new();
        let store = RegistrationStore::new(Arc::new(cluster.clone()), Arc::new(cluster.clone()));
        (cluster, store)
    }

    #[tokio::test(start_paused = true)]
    async fn create_registers_and_starts_engine() {
        let (cluster, store) = setup();
        let id = WorkloadIdentity::new("default", "db");
        cluster.insert_workload(&id, 1);

        store.create(id.clone(), config(1), fingerprint("a")).await.unwrap();
        assert!(store.contains(&id).await);
        assert_eq!(store.fingerprint(&id).await, Some(fingerprint("a")));
        assert_eq!(store.state(&id).await, Some(EngineState::Starting));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(cluster.replicas(&id), Some(0));
        assert_eq!(store.state(&id).await, Some(EngineState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_create_is_rejected() {
        let (cluster, store) = setup();
        let id = WorkloadIdentity::new("default", "db");
        cluster.insert_workload(&id, 1);

        store.create(id.clone(), config(1), fingerprint("a")).await.unwrap();
        let err = store
            .create(id.clone(), config(5), fingerprint("b"))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoscaleError::AlreadyRegistered(_)));
        assert_eq!(store.len().await, 1);
        assert_eq!(store.fingerprint(&id).await, Some(fingerprint("a")));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cluster.watch_count(&deployments()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_engine_and_removes_entry() {
        let (cluster, store) = setup();
        let id = WorkloadIdentity::new("default", "db");
        cluster.insert_workload(&id, 0);

        store.create(id.clone(), config(1), fingerprint("a")).await.unwrap();
        let state = store.subscribe_state(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(store.cancel(&id).await);
        assert!(!store.contains(&id).await);

        cluster.emit(
            &deployments(),
            ObservedChange::Applied(ResourceSnapshot::namespaced("default", "web")),
        );
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(*state.borrow(), EngineState::Cancelled);
        assert_eq!(cluster.write_count(), 0);
        assert_eq!(cluster.watch_count(&deployments()), 0);
    }

    #[tokio::test]
    async fn cancel_unknown_is_noop() {
        let (_, store) = setup();
        assert!(!store.cancel(&WorkloadIdentity::new("default", "ghost")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_swaps_engine_and_fingerprint() {
        let (cluster, store) = setup();
        let id = WorkloadIdentity::new("default", "db");
        cluster.insert_workload(&id, 1);

        store.create(id.clone(), config(1), fingerprint("a")).await.unwrap();
        let old_state = store.subscribe_state(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        store.replace(id.clone(), config(10), fingerprint("b")).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.fingerprint(&id).await, Some(fingerprint("b")));
        assert_eq!(
            store.config(&id).await.map(|c| c.idle_timeout),
            Some(Duration::from_secs(10))
        );

        // The old 1s engine is gone; the new one waits 10s.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*old_state.borrow(), EngineState::Cancelled);
        assert_eq!(cluster.replicas(&id), Some(1));
        assert_eq!(cluster.watch_count(&deployments()), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cluster.replicas(&id), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn replace_without_existing_creates() {
        let (cluster, store) = setup();
        let id = WorkloadIdentity::new("default", "db");
        cluster.insert_workload(&id, 1);

        store.replace(id.clone(), config(1), fingerprint("a")).await;
        assert!(store.contains(&id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn registrations_are_independent() {
        let (cluster, store) = setup();
        let a = WorkloadIdentity::new("team-a", "db");
        let b = WorkloadIdentity::new("team-b", "db");
        cluster.insert_workload(&a, 1);
        cluster.insert_workload(&b, 1);

        store.create(a.clone(), config(1), fingerprint("a")).await.unwrap();
        store.create(b.clone(), config(3), fingerprint("b")).await.unwrap();
        assert_eq!(store.identities().await, vec![a.clone(), b.clone()]);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(cluster.replicas(&a), Some(0));
        assert_eq!(cluster.replicas(&b), Some(1));

        store.cancel(&a).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cluster.replicas(&b), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_empties_store() {
        let (cluster, store) = setup();
        for name in ["a", "b", "c"] {
            let id = WorkloadIdentity::new("default", name);
            cluster.insert_workload(&id, 1);
            store.create(id, config(1), fingerprint(name)).await.unwrap();
        }

        assert_eq!(store.cancel_all().await, 3);
        assert!(store.is_empty().await);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cluster.write_count(), 0);
    }
}
