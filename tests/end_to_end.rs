//! End-to-end scenarios driving the dispatcher, worker pool, filesystem
//! store, and garbage collector together, the way a real cluster
//! collaborator would.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use kube_archivist::dispatcher::Dispatcher;
use kube_archivist::external::{ClusterProbe, ProbeOutcome, WatchEvent};
use kube_archivist::gc::GarbageCollector;
use kube_archivist::mock::{MockClusterProbe, MockResourceWatcher};
use kube_archivist::store::{FilesystemStore, Store};
use kube_archivist::types::{Gvk, Gvr, ResourceKey};
use kube_archivist::worker::WorkerPool;

const ANNOTATED: &str = "backup.bastion.io/enabled";

fn task_gvk() -> Gvk {
    Gvk::new("demo.bastion.io", "v1", "Task")
}

fn task_gvr() -> Gvr {
    Gvr::new("demo.bastion.io", "v1", "tasks")
}

fn task_key(name: &str) -> ResourceKey {
    ResourceKey::new(task_gvk(), "default", name)
}

fn annotated_manifest(name: &str, description: &str) -> serde_json::Value {
    json!({
        "metadata": {
            "name": name,
            "namespace": "default",
            "annotations": { ANNOTATED: "true" }
        },
        "spec": { "description": description }
    })
}

fn settle() {
    std::thread::sleep(Duration::from_millis(150));
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    events: std::sync::mpsc::Sender<WatchEvent>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FilesystemStore::new(dir.path()));
    let pool = Arc::new(WorkerPool::start(Arc::clone(&store), 2, 16, 3));
    let dispatcher = Dispatcher::new(pool);

    let (watcher, events) = MockResourceWatcher::new();
    dispatcher
        .register(task_gvr(), task_gvk(), Arc::new(watcher))
        .unwrap();

    Harness {
        _dir: dir,
        store,
        dispatcher,
        events,
    }
}

#[test]
fn create_makes_a_file_appear() {
    let h = harness();
    h.events
        .send(WatchEvent::Added(annotated_manifest("widget-a", "first")))
        .unwrap();
    settle();

    let (manifest, hash) = h.store.read(&task_key("widget-a")).unwrap();
    assert!(manifest.is_some());
    assert_eq!(hash.len(), 64);
    h.dispatcher.stop(&task_gvk()).unwrap();
}

#[test]
fn update_with_new_content_changes_the_hash() {
    let h = harness();
    h.events
        .send(WatchEvent::Added(annotated_manifest("widget-b", "v1")))
        .unwrap();
    settle();
    let (_, hash_before) = h.store.read(&task_key("widget-b")).unwrap();

    h.events
        .send(WatchEvent::Updated(annotated_manifest("widget-b", "v2")))
        .unwrap();
    settle();
    let (manifest_after, hash_after) = h.store.read(&task_key("widget-b")).unwrap();

    assert_ne!(hash_before, hash_after);
    assert_eq!(
        manifest_after.unwrap()["spec"]["description"],
        json!("v2")
    );
    h.dispatcher.stop(&task_gvk()).unwrap();
}

#[test]
fn update_with_identical_content_performs_no_write() {
    let h = harness();
    let manifest = annotated_manifest("widget-c", "unchanged");
    h.events.send(WatchEvent::Added(manifest.clone())).unwrap();
    settle();

    let (_, hash_before) = h.store.read(&task_key("widget-c")).unwrap();
    h.events.send(WatchEvent::Updated(manifest)).unwrap();
    settle();
    let (_, hash_after) = h.store.read(&task_key("widget-c")).unwrap();

    assert_eq!(hash_before, hash_after);
    h.dispatcher.stop(&task_gvk()).unwrap();
}

#[test]
fn delete_tombstones_rather_than_removes() {
    let h = harness();
    h.events
        .send(WatchEvent::Added(annotated_manifest("widget-d", "v1")))
        .unwrap();
    settle();

    h.events
        .send(WatchEvent::Deleted(Some(annotated_manifest("widget-d", "v1"))))
        .unwrap();
    settle();

    let (manifest, _) = h.store.read(&task_key("widget-d")).unwrap();
    assert!(manifest.is_some(), "tombstoning must not delete the record");
    let tombstones = h.store.list_tombstones().unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].key, task_key("widget-d"));

    h.dispatcher.stop(&task_gvk()).unwrap();
}

#[test]
fn gc_reclaims_old_tombstones_confirmed_absent_in_cluster() {
    let h = harness();
    h.events
        .send(WatchEvent::Added(annotated_manifest("widget-e", "v1")))
        .unwrap();
    settle();
    h.events
        .send(WatchEvent::Deleted(Some(annotated_manifest("widget-e", "v1"))))
        .unwrap();
    settle();

    let probe = Arc::new(MockClusterProbe::new());
    probe.set(&task_gvr(), "default", "widget-e", ProbeOutcome::NotFound);

    let gc = GarbageCollector::new(Arc::clone(&h.store), probe, Duration::from_millis(0));
    std::thread::sleep(Duration::from_millis(5));
    let stats = gc.sweep();

    assert_eq!(stats.reclaimed, 1);
    let (manifest, _) = h.store.read(&task_key("widget-e")).unwrap();
    assert!(manifest.is_none());

    h.dispatcher.stop(&task_gvk()).unwrap();
}

#[test]
fn gc_retracts_tombstone_for_a_resurrected_object() {
    let h = harness();
    h.events
        .send(WatchEvent::Added(annotated_manifest("widget-f", "v1")))
        .unwrap();
    settle();
    h.events
        .send(WatchEvent::Deleted(Some(annotated_manifest("widget-f", "v1"))))
        .unwrap();
    settle();

    let probe = Arc::new(MockClusterProbe::new());
    probe.set(&task_gvr(), "default", "widget-f", ProbeOutcome::Found);

    let gc = GarbageCollector::new(Arc::clone(&h.store), probe, Duration::from_millis(0));
    std::thread::sleep(Duration::from_millis(5));
    let stats = gc.sweep();

    assert_eq!(stats.retracted, 1);
    assert!(h.store.list_tombstones().unwrap().is_empty());
    let (manifest, _) = h.store.read(&task_key("widget-f")).unwrap();
    assert!(manifest.is_some());

    h.dispatcher.stop(&task_gvk()).unwrap();
}

#[test]
fn unannotated_objects_never_reach_the_store() {
    let h = harness();
    h.events
        .send(WatchEvent::Added(json!({
            "metadata": { "name": "widget-g", "namespace": "default" }
        })))
        .unwrap();
    settle();

    let (manifest, _) = h.store.read(&task_key("widget-g")).unwrap();
    assert!(manifest.is_none());
    h.dispatcher.stop(&task_gvk()).unwrap();
}
