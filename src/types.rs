//! Core value types shared by every component of the backup pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, nested key/value document — the serialized form of a cluster
/// object instance. Never a statically typed struct: the set of kinds is
/// learned at runtime (see `discovery`), so the manifest shape is unknown
/// at build time.
pub type Manifest = serde_json::Value;

/// Group/Version/Kind — the identity of a resource *type*.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

/// Group/Version/Resource — the pluralized URL-path form of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Gvr {
    pub fn new(group: impl Into<String>, version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

/// Lowercase-kind-plus-"s" pluralization, used only when the cluster's
/// discovery interface does not supply a real plural. A known
/// approximation, kept swappable.
pub trait PluralizeKind {
    fn pluralize(&self, kind: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixPluralizer;

impl PluralizeKind for SuffixPluralizer {
    fn pluralize(&self, kind: &str) -> String {
        format!("{}s", kind.to_lowercase())
    }
}

/// `(GVK, Namespace, Name)` triple uniquely identifying an object instance.
/// `namespace` may be empty for cluster-scoped kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub gvk: Gvk,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(gvk: Gvk, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.gvk, self.namespace, self.name)
    }
}

/// The kind of cluster event a `BackupEvent` represents. Create and Update
/// are handled identically today (both reduce to hash-compare-write); the
/// distinction is retained for observability and future divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Create => write!(f, "Create"),
            EventKind::Update => write!(f, "Update"),
            EventKind::Delete => write!(f, "Delete"),
        }
    }
}

/// Unit of work on the worker queue.
#[derive(Debug, Clone)]
pub struct BackupEvent {
    pub key: ResourceKey,
    pub manifest: Manifest,
    pub event_kind: EventKind,
}

/// The opt-in annotation that gates whether an object is backed up at all.
pub const BACKUP_ANNOTATION: &str = "backup.bastion.io/enabled";

/// Returns true only for the exact string `"true"` — absent, empty, or any
/// other casing (e.g. `"True"`) is opt-out.
pub fn is_backup_enabled(annotations: &serde_json::Map<String, serde_json::Value>) -> bool {
    matches!(
        annotations.get(BACKUP_ANNOTATION).and_then(|v| v.as_str()),
        Some("true")
    )
}
