//! Contracts for the cluster-facing capabilities this crate consumes but
//! does not implement — the Kubernetes-style watch/list/informer transport
//! is an external collaborator, treated as a black box.

use crate::types::{Gvr, Manifest};

/// A single Add/Update/Delete callback from a `ResourceWatcher`.
///
/// `DeletedFinalStateUnknown` models the informer case where the
/// underlying watcher hands back a stale sentinel instead of a live
/// object on delete; `None` means unwrapping it failed, which the
/// dispatcher must treat as a silent drop.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(Manifest),
    Updated(Manifest),
    Deleted(Option<Manifest>),
}

/// List+watch of a `Gvr` across all namespaces. Implementations deliver
/// events via `on_event` until `stop_requested` returns true; the crate's
/// own watcher tasks poll this from a loop, per the cooperative
/// cancellation model in §5.
pub trait ResourceWatcher: Send + Sync {
    fn watch(
        &self,
        gvr: &Gvr,
        on_event: Box<dyn Fn(WatchEvent) + Send + Sync>,
        stop_requested: Box<dyn Fn() -> bool + Send + Sync>,
    );
}

/// A cluster-level declaration that a new kind of resource exists — the
/// thing `discovery::DiscoveryLoop` watches.
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    pub group: String,
    /// All declared versions, in cluster-declared order. Only the first
    /// is used.
    pub versions: Vec<String>,
    pub kind: String,
    pub plural: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionEvent {
    Added,
    Removed,
}

/// List+watch of resource definitions.
pub trait ResourceDefinitionRegistry: Send + Sync {
    fn watch(
        &self,
        on_event: Box<dyn Fn(DefinitionEvent, ResourceDefinition) + Send + Sync>,
        stop_requested: Box<dyn Fn() -> bool + Send + Sync>,
    );
}

/// Outcome of a single cluster probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found,
    NotFound,
    /// Transient failure — the GC logs and retries next sweep.
    Error(String),
}

/// `Get(GVR, namespace, name) -> Ok | NotFound | OtherError`.
pub trait ClusterProbe: Send + Sync {
    fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> ProbeOutcome;
}
