//! End-to-end idle cycle tests.
//!
//! Drives annotated workloads through the reconciler against the
//! in-memory cluster: scale down after the idle timeout, scale back up on
//! activity, and start a fresh idle window after each signal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use zeroscale_autoscale::memory::InMemoryCluster;
use zeroscale_autoscale::*;
use zeroscale_core::config::{ANNOTATION_IDLE_TIMEOUT, ANNOTATION_WATCHED_KINDS};
use zeroscale_core::{ResourceKind, WorkloadIdentity};

fn deployments() -> ResourceKind {
    ResourceKind::new("apps", "v1", "Deployment")
}

fn annotations(timeout: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ANNOTATION_IDLE_TIMEOUT.to_string(), timeout.to_string()),
        (
            ANNOTATION_WATCHED_KINDS.to_string(),
            r#"[{"apiVersion":"apps/v1","kind":"Deployment"}]"#.to_string(),
        ),
    ])
}

fn setup() -> (InMemoryCluster, Reconciler) {
    let cluster = InMemoryCluster::new();
    let store = RegistrationStore::new(Arc::new(cluster.clone()), Arc::new(cluster.clone()));
    (cluster, Reconciler::new(store))
}

fn touch(cluster: &InMemoryCluster, name: &str, generation: i64) {
    cluster.emit(
        &deployments(),
        ObservedChange::Applied(
            ResourceSnapshot::namespaced("default", name).with_generation(generation),
        ),
    );
}

#[tokio::test(start_paused = true)]
async fn idle_workload_scales_down_and_wakes_on_activity() {
    let (cluster, reconciler) = setup();
    let db = WorkloadIdentity::new("default", "db");
    cluster.insert_workload(&db, 1);

    let action = reconciler.reconcile(&db, Some(&annotations("1s"))).await.unwrap();
    assert_eq!(action, ReconcileAction::Created);

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(cluster.replicas(&db), Some(0));

    // First sighting of an object is activity.
    touch(&cluster, "web", 1);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(cluster.replicas(&db), Some(1));

    // A fresh idle window starts at the signal, not at the last tick.
    sleep(Duration::from_millis(800)).await;
    assert_eq!(cluster.replicas(&db), Some(1));
    sleep(Duration::from_millis(300)).await;
    assert_eq!(cluster.replicas(&db), Some(0));
}

#[tokio::test(start_paused = true)]
async fn generation_bumps_keep_workload_awake() {
    let (cluster, reconciler) = setup();
    let db = WorkloadIdentity::new("default", "db");
    cluster.insert_workload(&db, 1);
    reconciler.reconcile(&db, Some(&annotations("1s"))).await.unwrap();

    sleep(Duration::from_millis(10)).await;
    touch(&cluster, "web", 1);
    for generation in 2..6 {
        sleep(Duration::from_millis(600)).await;
        touch(&cluster, "web", generation);
    }
    sleep(Duration::from_millis(10)).await;

    assert_eq!(cluster.replicas(&db), Some(1));
    assert_eq!(cluster.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn removing_annotation_stops_scaling() {
    let (cluster, reconciler) = setup();
    let db = WorkloadIdentity::new("default", "db");
    cluster.insert_workload(&db, 1);
    reconciler.reconcile(&db, Some(&annotations("1s"))).await.unwrap();

    let action = reconciler.reconcile(&db, Some(&BTreeMap::new())).await.unwrap();
    assert_eq!(action, ReconcileAction::Removed);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(cluster.replicas(&db), Some(1));
    assert_eq!(cluster.watch_count(&deployments()), 0);
}

#[tokio::test(start_paused = true)]
async fn shortened_timeout_takes_effect_on_replace() {
    let (cluster, reconciler) = setup();
    let db = WorkloadIdentity::new("default", "db");
    cluster.insert_workload(&db, 1);
    reconciler.reconcile(&db, Some(&annotations("1h"))).await.unwrap();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(cluster.replicas(&db), Some(1));

    let action = reconciler.reconcile(&db, Some(&annotations("2s"))).await.unwrap();
    assert_eq!(action, ReconcileAction::Replaced);

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(cluster.replicas(&db), Some(0));
    assert_eq!(cluster.watch_count(&deployments()), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_every_registration() {
    let (cluster, reconciler) = setup();
    let ids: Vec<WorkloadIdentity> = ["a", "b"]
        .iter()
        .map(|name| WorkloadIdentity::new("default", *name))
        .collect();
    for id in &ids {
        cluster.insert_workload(id, 1);
        reconciler.reconcile(id, Some(&annotations("1s"))).await.unwrap();
    }

    let mut states = Vec::new();
    for id in &ids {
        states.push(reconciler.store().subscribe_state(id).await.unwrap());
    }

    assert_eq!(reconciler.store().cancel_all().await, 2);
    sleep(Duration::from_secs(3)).await;

    for state in &states {
        assert_eq!(*state.borrow(), EngineState::Cancelled);
    }
    assert_eq!(cluster.write_count(), 0);
}
