//! Persistence contract for backup records (C2).
//!
//! `Store` abstracts the durable side of the pipeline so alternate
//! backends are pluggable — only a local POSIX filesystem backend ships in
//! this crate, but the trait boundary stays.

mod filesystem;

pub use filesystem::FilesystemStore;

use thiserror::Error;

use crate::types::{Gvk, Manifest, ResourceKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error for {key}: {source}")]
    Io {
        key: ResourceKey,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot mark tombstone: no record exists for {0}")]
    NoSuchRecord(ResourceKey),
    #[error("failed to (de)serialize manifest for {key}: {source}")]
    Serde {
        key: ResourceKey,
        #[source]
        source: serde_json::Error,
    },
}

/// A tombstone entry as discovered by `ListTombstones`, carrying enough of
/// the path to resolve back to a `ResourceKey` plus the sentinel's mtime.
#[derive(Debug, Clone)]
pub struct TombstoneEntry {
    pub key: ResourceKey,
    pub mod_time: std::time::SystemTime,
}

/// Persistence contract; doc comments here state the guarantees each
/// implementation must hold.
pub trait Store: Send + Sync {
    /// Writes `manifest`/`hash` for `key`. Returns `Ok(false)` (no write
    /// performed) if the persisted hash already equals `hash` — this is
    /// the idempotence guarantee (I5) the worker pool relies on.
    fn write(&self, key: &ResourceKey, manifest: &Manifest, hash: &str) -> Result<bool, StoreError>;

    /// Returns `(None, "")` when the key is absent — absence is not an
    /// error. Any other I/O failure is returned as `Err`.
    fn read(&self, key: &ResourceKey) -> Result<(Option<Manifest>, String), StoreError>;

    /// Unconditionally removes the record (hard delete). Used only by GC.
    fn delete(&self, key: &ResourceKey) -> Result<(), StoreError>;

    /// Adds a tombstone marker to an existing record. Fails if the record
    /// does not exist.
    fn mark_tombstone(&self, key: &ResourceKey) -> Result<(), StoreError>;

    /// Lock-free snapshot of every tombstoned record. May race with
    /// concurrent writes — callers (the GC) tolerate stale entries.
    fn list_tombstones(&self) -> Result<Vec<TombstoneEntry>, StoreError>;

    /// Removes only the tombstone marker, retaining manifest+hash. Used by
    /// GC when the live object turns out to still exist.
    fn delete_tombstone(&self, key: &ResourceKey) -> Result<(), StoreError>;

    /// Returns every persisted `(namespace, name) -> hash` pair for a GVK.
    /// Reconstructable from `read`, but cheap to offer directly and useful
    /// to the read-back façade's listing needs.
    fn list_hashes(&self, gvk: &Gvk) -> Result<std::collections::BTreeMap<(String, String), String>, StoreError>;
}
