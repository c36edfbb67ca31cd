//! In-memory fakes of the external capabilities, for component and
//! end-to-end tests. Not behind `#[cfg(test)]` so integration tests under
//! `tests/` can use them too.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

use crate::external::{
    ClusterProbe, DefinitionEvent, ProbeOutcome, ResourceDefinition, ResourceDefinitionRegistry,
    ResourceWatcher, WatchEvent,
};
use crate::types::Gvr;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A `ResourceWatcher` whose events are pushed on demand through the
/// returned `Sender`, simulating a cluster informer under test control.
pub struct MockResourceWatcher {
    receiver: Mutex<Receiver<WatchEvent>>,
}

impl MockResourceWatcher {
    pub fn new() -> (Self, Sender<WatchEvent>) {
        let (tx, rx) = channel();
        (
            Self {
                receiver: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl ResourceWatcher for MockResourceWatcher {
    fn watch(
        &self,
        _gvr: &Gvr,
        on_event: Box<dyn Fn(WatchEvent) + Send + Sync>,
        stop_requested: Box<dyn Fn() -> bool + Send + Sync>,
    ) {
        let receiver = self.receiver.lock().unwrap();
        loop {
            if stop_requested() {
                return;
            }
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(event) => on_event(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

/// A `ResourceDefinitionRegistry` whose add/remove events are pushed
/// through the returned `Sender`.
pub struct MockDefinitionRegistry {
    receiver: Mutex<Receiver<(DefinitionEvent, ResourceDefinition)>>,
}

impl MockDefinitionRegistry {
    pub fn new() -> (Self, Sender<(DefinitionEvent, ResourceDefinition)>) {
        let (tx, rx) = channel();
        (
            Self {
                receiver: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl ResourceDefinitionRegistry for MockDefinitionRegistry {
    fn watch(
        &self,
        on_event: Box<dyn Fn(DefinitionEvent, ResourceDefinition) + Send + Sync>,
        stop_requested: Box<dyn Fn() -> bool + Send + Sync>,
    ) {
        let receiver = self.receiver.lock().unwrap();
        loop {
            if stop_requested() {
                return;
            }
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok((event, definition)) => on_event(event, definition),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

/// A `ClusterProbe` whose answers are set by the test ahead of time,
/// keyed by `(group/version/resource, namespace, name)`.
#[derive(Default)]
pub struct MockClusterProbe {
    answers: Mutex<HashMap<(String, String, String), ProbeOutcome>>,
}

impl MockClusterProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, gvr: &Gvr, namespace: &str, name: &str, outcome: ProbeOutcome) {
        self.answers.lock().unwrap().insert(
            (format!("{}/{}/{}", gvr.group, gvr.version, gvr.resource), namespace.into(), name.into()),
            outcome,
        );
    }
}

impl ClusterProbe for MockClusterProbe {
    fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> ProbeOutcome {
        let key = (format!("{}/{}/{}", gvr.group, gvr.version, gvr.resource), namespace.to_string(), name.to_string());
        self.answers
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(ProbeOutcome::NotFound)
    }
}
