//! Cluster-wide watches over arbitrary kinds.
//!
//! Each kind is resolved through API discovery and watched as
//! `DynamicObject`s with the runtime watcher. The watcher relists on its
//! own after a dropped connection; the relist arrives as a resync.

use futures::StreamExt;
use kube::api::{Api, DynamicObject, GroupVersionKind};
use kube::runtime::watcher::Event;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, discovery};

use zeroscale_autoscale::{
    ActivitySource, BoxFuture, ChangeStream, ObservedChange, ResourceSnapshot, WatchError,
};
use zeroscale_core::ResourceKind;

/// [`ActivitySource`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeActivitySource {
    client: Client,
}

impl KubeActivitySource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ActivitySource for KubeActivitySource {
    fn watch<'a>(
        &'a self,
        kind: &'a ResourceKind,
    ) -> BoxFuture<'a, Result<ChangeStream, WatchError>> {
        Box::pin(async move {
            let gvk = GroupVersionKind::gvk(&kind.group, &kind.version, &kind.kind);
            let (resource, _) = discovery::pinned_kind(&self.client, &gvk)
                .await
                .map_err(|e| WatchError::Establish {
                    kind: kind.to_string(),
                    reason: e.to_string(),
                })?;

            let api = Api::<DynamicObject>::all_with(self.client.clone(), &resource);
            let stream = watcher(api, watcher::Config::default())
                .default_backoff()
                .map(|event| {
                    event
                        .map(observed_change)
                        .map_err(|e| WatchError::Stream(e.to_string()))
                });
            Ok(stream.boxed())
        })
    }
}

fn observed_change(event: Event<DynamicObject>) -> ObservedChange {
    match event {
        Event::Apply(obj) => ObservedChange::Applied(snapshot(obj)),
        Event::Delete(obj) => ObservedChange::Deleted(snapshot(obj)),
        Event::Init => ObservedChange::ResyncStarted,
        Event::InitApply(obj) => ObservedChange::ResyncApplied(snapshot(obj)),
        Event::InitDone => ObservedChange::ResyncDone,
    }
}

fn snapshot(obj: DynamicObject) -> ResourceSnapshot {
    let meta = obj.metadata;
    ResourceSnapshot {
        namespace: meta.namespace,
        name: meta.name.unwrap_or_default(),
        labels: meta.labels.unwrap_or_default(),
        annotations: meta.annotations.unwrap_or_default(),
        generation: meta.generation,
        resource_version: meta.resource_version,
    }
}
