//! Workload controller — feeds StatefulSet annotations to the reconciler.
//!
//! Every applied StatefulSet is reconciled; unchanged annotations are cut
//! short by the config fingerprint, so status churn costs one lookup. A
//! relist drops registrations whose StatefulSet did not reappear.

use std::collections::{BTreeMap, HashSet};

use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::watcher::Event;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use zeroscale_autoscale::{ReconcileAction, Reconciler};
use zeroscale_core::WorkloadIdentity;

/// Watches StatefulSets and keeps the registration store in step with
/// their idle-scaling annotations.
pub struct WorkloadController {
    client: Client,
    namespace: Option<String>,
    reconciler: Reconciler,
}

impl WorkloadController {
    /// Watch one namespace, or all when `namespace` is `None`.
    pub fn new(client: Client, namespace: Option<String>, reconciler: Reconciler) -> Self {
        Self {
            client,
            namespace,
            reconciler,
        }
    }

    /// Run until `shutdown` publishes `true` (or its sender is dropped),
    /// then cancel every registration.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let api: Api<StatefulSet> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut events = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut handler = StatefulSetEvents::new(self.reconciler.clone());

        info!(
            namespace = self.namespace.as_deref().unwrap_or("*"),
            "workload controller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop).map(|_| ()) => break,
                event = events.next() => match event {
                    Some(Ok(event)) => handler.handle(event).await,
                    Some(Err(e)) => warn!(error = %e, "statefulset watch error"),
                    None => {
                        warn!("statefulset watch ended");
                        break;
                    }
                },
            }
        }

        let cancelled = self.reconciler.store().cancel_all().await;
        info!(cancelled, "workload controller stopped");
    }
}

/// Applies StatefulSet watch events to the reconciler.
///
/// Tracks the identities seen during a relist so that registrations whose
/// StatefulSet disappeared while the watch was down are dropped.
pub struct StatefulSetEvents {
    reconciler: Reconciler,
    relisted: Option<HashSet<WorkloadIdentity>>,
}

impl StatefulSetEvents {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            relisted: None,
        }
    }

    pub async fn handle(&mut self, event: Event<StatefulSet>) {
        match event {
            Event::Apply(sts) => {
                self.observe(&sts.metadata).await;
            }
            Event::Delete(sts) => {
                if let Some(workload) = workload_identity(&sts.metadata) {
                    self.reconcile(&workload, None).await;
                }
            }
            Event::Init => self.relisted = Some(HashSet::new()),
            Event::InitApply(sts) => {
                if let Some(workload) = self.observe(&sts.metadata).await {
                    self.relisted
                        .get_or_insert_with(HashSet::new)
                        .insert(workload);
                }
            }
            Event::InitDone => {
                let listed = self.relisted.take().unwrap_or_default();
                for workload in self.reconciler.store().identities().await {
                    if !listed.contains(&workload) {
                        self.reconcile(&workload, None).await;
                    }
                }
            }
        }
    }

    async fn observe(&self, meta: &ObjectMeta) -> Option<WorkloadIdentity> {
        let workload = workload_identity(meta)?;
        let annotations = meta.annotations.clone().unwrap_or_default();
        self.reconcile(&workload, Some(&annotations)).await;
        Some(workload)
    }

    async fn reconcile(
        &self,
        workload: &WorkloadIdentity,
        annotations: Option<&BTreeMap<String, String>>,
    ) {
        match self.reconciler.reconcile(workload, annotations).await {
            Ok(ReconcileAction::Unchanged | ReconcileAction::Ignored) => {}
            Ok(action) => debug!(%workload, ?action, "workload reconciled"),
            Err(e) => warn!(%workload, error = %e, "workload reconcile failed"),
        }
    }
}

fn workload_identity(meta: &ObjectMeta) -> Option<WorkloadIdentity> {
    Some(WorkloadIdentity::new(
        meta.namespace.as_deref()?,
        meta.name.as_deref()?,
    ))
}
