//! Reconciler — turns a workload's observed annotations into registry
//! operations.
//!
//! The fingerprint of the raw annotation text decides whether anything
//! needs to happen: an unchanged fingerprint leaves the running engine
//! alone, so frequent re-observation of the same workload is cheap.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use zeroscale_core::{RawRegistrationConfig, WorkloadIdentity};

use crate::error::AutoscaleResult;
use crate::registry::RegistrationStore;

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Replaced,
    Unchanged,
    Removed,
    /// Idle scaling is not enabled and nothing was registered.
    Ignored,
}

#[derive(Clone)]
pub struct Reconciler {
    store: RegistrationStore,
}

impl Reconciler {
    pub fn new(store: RegistrationStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RegistrationStore {
        &self.store
    }

    /// Reconcile one workload. `None` means the workload no longer exists.
    ///
    /// A config that fails to parse is returned as an error and any
    /// existing registration keeps running with its previous config.
    pub async fn reconcile(
        &self,
        workload: &WorkloadIdentity,
        annotations: Option<&BTreeMap<String, String>>,
    ) -> AutoscaleResult<ReconcileAction> {
        let Some(raw) = annotations.and_then(RawRegistrationConfig::from_annotations) else {
            return Ok(if self.store.cancel(workload).await {
                ReconcileAction::Removed
            } else {
                ReconcileAction::Ignored
            });
        };

        let fingerprint = raw.fingerprint();
        let existing = self.store.fingerprint(workload).await;
        if existing.as_ref() == Some(&fingerprint) {
            debug!(%workload, %fingerprint, "config unchanged");
            return Ok(ReconcileAction::Unchanged);
        }

        let config = raw.parse().inspect_err(|e| {
            warn!(
                %workload,
                error = %e,
                "invalid idle-scaling config, keeping current registration"
            );
        })?;

        self.store.replace(workload.clone(), config, fingerprint).await;
        Ok(match existing {
            Some(_) => ReconcileAction::Replaced,
            None => ReconcileAction::Created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use zeroscale_core::config::{ANNOTATION_IDLE_TIMEOUT, ANNOTATION_WATCHED_KINDS};

    use crate::error::AutoscaleError;
    use crate::memory::InMemoryCluster;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn setup() -> (InMemoryCluster, Reconciler, WorkloadIdentity) {
        let cluster = InMemoryCluster::new();
        let store = RegistrationStore::new(Arc::new(cluster.clone()), Arc::new(cluster.clone()));
        let id = WorkloadIdentity::new("default", "db");
        cluster.insert_workload(&id, 1);
        (cluster, Reconciler::new(store), id)
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_workload_is_created_then_unchanged() {
        let (_, reconciler, id) = setup();
        let ann = annotations(&[(ANNOTATION_IDLE_TIMEOUT, "30s")]);

        let first = reconciler.reconcile(&id, Some(&ann)).await.unwrap();
        let second = reconciler.reconcile(&id, Some(&ann)).await.unwrap();

        assert_eq!(first, ReconcileAction::Created);
        assert_eq!(second, ReconcileAction::Unchanged);
        assert_eq!(reconciler.store().len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_annotation_replaces() {
        let (_, reconciler, id) = setup();
        reconciler
            .reconcile(&id, Some(&annotations(&[(ANNOTATION_IDLE_TIMEOUT, "30s")])))
            .await
            .unwrap();

        let action = reconciler
            .reconcile(&id, Some(&annotations(&[(ANNOTATION_IDLE_TIMEOUT, "1m")])))
            .await
            .unwrap();

        assert_eq!(action, ReconcileAction::Replaced);
        let config = reconciler.store().config(&id).await.unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_update_keeps_existing_registration() {
        let (_, reconciler, id) = setup();
        let good = annotations(&[(ANNOTATION_IDLE_TIMEOUT, "30s")]);
        reconciler.reconcile(&id, Some(&good)).await.unwrap();
        let before = reconciler.store().fingerprint(&id).await;

        let bad = annotations(&[
            (ANNOTATION_IDLE_TIMEOUT, "30s"),
            (ANNOTATION_WATCHED_KINDS, "not json"),
        ]);
        let err = reconciler.reconcile(&id, Some(&bad)).await.unwrap_err();

        assert!(matches!(err, AutoscaleError::Config(_)));
        assert_eq!(reconciler.store().fingerprint(&id).await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_registers_nothing() {
        let (_, reconciler, id) = setup();
        let bad = annotations(&[(ANNOTATION_IDLE_TIMEOUT, "soon")]);

        assert!(reconciler.reconcile(&id, Some(&bad)).await.is_err());
        assert!(!reconciler.store().contains(&id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_annotation_or_workload_cancels() {
        let (_, reconciler, id) = setup();
        let ann = annotations(&[(ANNOTATION_IDLE_TIMEOUT, "30s")]);
        reconciler.reconcile(&id, Some(&ann)).await.unwrap();

        let action = reconciler
            .reconcile(&id, Some(&BTreeMap::new()))
            .await
            .unwrap();
        assert_eq!(action, ReconcileAction::Removed);

        reconciler.reconcile(&id, Some(&ann)).await.unwrap();
        let action = reconciler.reconcile(&id, None).await.unwrap();
        assert_eq!(action, ReconcileAction::Removed);
        assert!(reconciler.store().is_empty().await);
    }

    #[tokio::test]
    async fn unannotated_workload_is_ignored() {
        let (_, reconciler, id) = setup();
        let action = reconciler
            .reconcile(&id, Some(&annotations(&[("team", "data")])))
            .await
            .unwrap();
        assert_eq!(action, ReconcileAction::Ignored);
    }
}
