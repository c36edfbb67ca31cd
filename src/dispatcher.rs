//! Registers/unregisters per-kind watches, filters by annotation, and
//! translates cluster events into backup work items (C4).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::info;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::external::{ResourceWatcher, WatchEvent};
use crate::types::{is_backup_enabled, BackupEvent, EventKind, Gvk, Gvr, Manifest, ResourceKey};
use crate::worker::WorkerPool;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("watcher already registered for {0}")]
    AlreadyRegistered(Gvk),
    #[error("no watcher registered for {0}")]
    NotFound(Gvk),
}

struct RegisteredWatch {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// Owns the `Gvk -> cancel-handle` registry. Mutated only by
/// `register`/`stop`, guarded by a single mutex.
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    registry: Mutex<HashMap<Gvk, RegisteredWatch>>,
}

impl Dispatcher {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Constructs a watcher over `gvr`, attaches Add/Update/Delete
    /// handlers, and starts it on its own thread.
    pub fn register(
        &self,
        gvr: Gvr,
        gvk: Gvk,
        watcher: Arc<dyn ResourceWatcher>,
    ) -> Result<(), DispatchError> {
        let mut registry = self.registry.lock().unwrap();
        if registry.contains_key(&gvk) {
            return Err(DispatchError::AlreadyRegistered(gvk));
        }

        let cancel = CancelToken::new();
        let pool = Arc::clone(&self.pool);
        let gvk_for_events = gvk.clone();
        let stop_flag = cancel.clone();

        let handle = std::thread::Builder::new()
            .name(format!("watch-{gvk}"))
            .spawn(move || {
                let pool = Arc::clone(&pool);
                let gvk_for_events = gvk_for_events.clone();
                watcher.watch(
                    &gvr,
                    Box::new(move |event| handle_watch_event(&pool, &gvk_for_events, event)),
                    Box::new(move || stop_flag.is_cancelled()),
                );
            })
            .expect("failed to spawn watcher thread");

        registry.insert(gvk, RegisteredWatch { cancel, handle });
        Ok(())
    }

    /// Cancels the child scope and removes the registry entry.
    pub fn stop(&self, gvk: &Gvk) -> Result<(), DispatchError> {
        let registered = {
            let mut registry = self.registry.lock().unwrap();
            registry.remove(gvk)
        };
        match registered {
            Some(registered) => {
                registered.cancel.cancel();
                let _ = registered.handle.join();
                info!("stopped dispatcher for {gvk}");
                Ok(())
            }
            None => Err(DispatchError::NotFound(gvk.clone())),
        }
    }

    pub fn is_registered(&self, gvk: &Gvk) -> bool {
        self.registry.lock().unwrap().contains_key(gvk)
    }
}

fn handle_watch_event(pool: &WorkerPool, gvk: &Gvk, event: WatchEvent) {
    match event {
        WatchEvent::Added(manifest) => enqueue_if_annotated(pool, gvk, manifest, EventKind::Create),
        WatchEvent::Updated(manifest) => {
            if is_soft_deleted(&manifest) {
                enqueue_if_annotated(pool, gvk, manifest, EventKind::Delete);
            } else {
                enqueue_if_annotated(pool, gvk, manifest, EventKind::Update);
            }
        }
        // "Deleted final state unknown": unwrap failure is a silent drop.
        WatchEvent::Deleted(Some(manifest)) => {
            enqueue_if_annotated(pool, gvk, manifest, EventKind::Delete)
        }
        WatchEvent::Deleted(None) => {}
    }
}

fn enqueue_if_annotated(pool: &WorkerPool, gvk: &Gvk, manifest: Manifest, event_kind: EventKind) {
    let Some(annotations) = extract_annotations(&manifest) else {
        return;
    };
    if !is_backup_enabled(annotations) {
        return;
    }
    let Some((namespace, name)) = extract_namespace_and_name(&manifest) else {
        return;
    };
    let key = ResourceKey::new(gvk.clone(), namespace, name);
    // `manifest` is already an owned value, not a reference into a shared
    // cache, so handing it to the pool already satisfies the "deep copy"
    // requirement the original watcher-cache semantics call for.
    pool.enqueue(BackupEvent {
        key,
        manifest,
        event_kind,
    });
}

fn extract_annotations(manifest: &Manifest) -> Option<&serde_json::Map<String, Manifest>> {
    manifest.get("metadata")?.get("annotations")?.as_object()
}

fn extract_namespace_and_name(manifest: &Manifest) -> Option<(String, String)> {
    let metadata = manifest.get("metadata")?;
    let name = metadata.get("name")?.as_str()?.to_string();
    let namespace = metadata
        .get("namespace")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    Some((namespace, name))
}

/// An object with a deletion timestamp and no remaining finalizers is
/// effectively deleted; enqueueing it as `Delete` from the update handler
/// is an optional convergence aid.
fn is_soft_deleted(manifest: &Manifest) -> bool {
    let Some(metadata) = manifest.get("metadata") else {
        return false;
    };
    let has_deletion_timestamp = metadata
        .get("deletionTimestamp")
        .map(|v| !v.is_null())
        .unwrap_or(false);
    let finalizers_empty = metadata
        .get("finalizers")
        .and_then(|v| v.as_array())
        .map(|a| a.is_empty())
        .unwrap_or(true);
    has_deletion_timestamp && finalizers_empty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilesystemStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWatcher {
        events: Vec<WatchEvent>,
        calls: Arc<AtomicUsize>,
    }

    impl ResourceWatcher for CountingWatcher {
        fn watch(
            &self,
            _gvr: &Gvr,
            on_event: Box<dyn Fn(WatchEvent) + Send + Sync>,
            _stop_requested: Box<dyn Fn() -> bool + Send + Sync>,
        ) {
            for event in self.events.clone() {
                on_event(event);
                self.calls.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn gvk() -> Gvk {
        Gvk::new("demo.bastion.io", "v1", "Task")
    }

    #[test]
    fn unannotated_objects_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn crate::store::Store> = Arc::new(FilesystemStore::new(dir.path()));
        let pool = Arc::new(WorkerPool::start(store, 1, 8, 3));
        let dispatcher = Dispatcher::new(Arc::clone(&pool));

        let calls = Arc::new(AtomicUsize::new(0));
        let watcher = Arc::new(CountingWatcher {
            events: vec![WatchEvent::Added(json!({
                "metadata": {"name": "unannotated", "namespace": "default"}
            }))],
            calls: Arc::clone(&calls),
        });

        dispatcher
            .register(Gvr::new("demo.bastion.io", "v1", "tasks"), gvk(), watcher)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        dispatcher.stop(&gvk()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let (processed, _) = pool.stats();
        assert_eq!(processed, 0);
    }

    #[test]
    fn register_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn crate::store::Store> = Arc::new(FilesystemStore::new(dir.path()));
        let pool = Arc::new(WorkerPool::start(store, 1, 8, 3));
        let dispatcher = Dispatcher::new(pool);

        let watcher = Arc::new(CountingWatcher {
            events: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        });
        dispatcher
            .register(Gvr::new("g", "v1", "tasks"), gvk(), watcher.clone())
            .unwrap();
        let err = dispatcher
            .register(Gvr::new("g", "v1", "tasks"), gvk(), watcher)
            .unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyRegistered(_)));
        dispatcher.stop(&gvk()).unwrap();
    }

    #[test]
    fn stop_unknown_gvk_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn crate::store::Store> = Arc::new(FilesystemStore::new(dir.path()));
        let pool = Arc::new(WorkerPool::start(store, 1, 8, 3));
        let dispatcher = Dispatcher::new(pool);
        assert!(matches!(dispatcher.stop(&gvk()), Err(DispatchError::NotFound(_))));
    }
}
