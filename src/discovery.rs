//! Learns of new resource kinds at runtime and drives dispatcher
//! registrations (C5).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::external::{DefinitionEvent, ResourceDefinition, ResourceDefinitionRegistry, ResourceWatcher};
use crate::types::{Gvk, Gvr};

/// Purely observational count of currently registered kinds.
pub struct DiscoveryLoop {
    dispatcher: Arc<Dispatcher>,
    watcher: Arc<dyn ResourceWatcher>,
    registered_count: Arc<AtomicI64>,
}

impl DiscoveryLoop {
    pub fn new(dispatcher: Arc<Dispatcher>, watcher: Arc<dyn ResourceWatcher>) -> Self {
        Self {
            dispatcher,
            watcher,
            registered_count: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn registered_count(&self) -> i64 {
        self.registered_count.load(Ordering::SeqCst)
    }

    /// Watches the resource-definition registry on the calling thread
    /// until `stop_requested` returns true.
    pub fn run(&self, registry: Arc<dyn ResourceDefinitionRegistry>, stop_requested: Box<dyn Fn() -> bool + Send + Sync>) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let watcher = Arc::clone(&self.watcher);
        let count = Arc::clone(&self.registered_count);

        registry.watch(
            Box::new(move |event, definition| match event {
                DefinitionEvent::Added => on_definition_added(&dispatcher, &watcher, &count, definition),
                DefinitionEvent::Removed => on_definition_removed(&dispatcher, &count, definition),
            }),
            stop_requested,
        );
    }
}

/// Uses only the first declared version in the definition's version list.
fn first_version(definition: &ResourceDefinition) -> Option<&str> {
    definition.versions.first().map(String::as_str)
}

fn on_definition_added(
    dispatcher: &Dispatcher,
    watcher: &Arc<dyn ResourceWatcher>,
    count: &AtomicI64,
    definition: ResourceDefinition,
) {
    let Some(version) = first_version(&definition) else {
        warn!("resource definition {} has no declared versions, ignoring", definition.kind);
        return;
    };
    let gvk = Gvk::new(definition.group.clone(), version, definition.kind.clone());
    let gvr = Gvr::new(definition.group, version, definition.plural);

    match dispatcher.register(gvr, gvk.clone(), Arc::clone(watcher)) {
        Ok(()) => {
            count.fetch_add(1, Ordering::SeqCst);
            info!("discovered new resource kind {gvk}");
        }
        Err(err) => warn!("could not register watcher for {gvk}: {err}"),
    }
}

fn on_definition_removed(dispatcher: &Dispatcher, count: &AtomicI64, definition: ResourceDefinition) {
    let Some(version) = first_version(&definition) else {
        return;
    };
    let gvk = Gvk::new(definition.group, version, definition.kind);
    match dispatcher.stop(&gvk) {
        Ok(()) => {
            count.fetch_sub(1, Ordering::SeqCst);
            info!("stopped watching removed resource kind {gvk}");
        }
        Err(err) => warn!("could not stop watcher for {gvk}: {err}"),
    }
}
