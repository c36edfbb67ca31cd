//! Filesystem-backed `Store` — the reference implementation.
//!
//! Layout:
//!
//! ```text
//! <BaseDir>/<Group>/<Version>/<Kind>/<Namespace>/<Name>/
//!     manifest.yaml   — canonical manifest serialization (indented JSON,
//!                        despite the extension — kept for on-disk
//!                        compatibility with the reference layout)
//!     hash.txt        — hex content hash, single line
//!     tombstone       — presence sentinel; mtime is the tombstone time
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::types::{Gvk, Manifest, ResourceKey};

use super::{Store, StoreError, TombstoneEntry};

const MANIFEST_FILE: &str = "manifest.yaml";
const HASH_FILE: &str = "hash.txt";
const TOMBSTONE_FILE: &str = "tombstone";

/// File-system based backup store.
pub struct FilesystemStore {
    base_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn record_dir(&self, key: &ResourceKey) -> PathBuf {
        self.base_dir
            .join(&key.gvk.group)
            .join(&key.gvk.version)
            .join(&key.gvk.kind)
            .join(&key.namespace)
            .join(&key.name)
    }

    fn io_err(key: &ResourceKey, source: std::io::Error) -> StoreError {
        StoreError::Io {
            key: key.clone(),
            source,
        }
    }

    /// Parses `(Gvk, Namespace, Name)` out of a record directory's path
    /// relative to `base_dir`. Shallower/deeper matches than exactly 5
    /// segments are not errors — they are skipped by the caller.
    fn parse_record_dir(&self, dir: &Path) -> Option<ResourceKey> {
        let rel = dir.strip_prefix(&self.base_dir).ok()?;
        let parts: Vec<&str> = rel.components().map(|c| c.as_os_str().to_str()).collect::<Option<_>>()?;
        if parts.len() != 5 {
            return None;
        }
        Some(ResourceKey::new(
            Gvk::new(parts[0], parts[1], parts[2]),
            parts[3],
            parts[4],
        ))
    }
}

impl Store for FilesystemStore {
    fn write(&self, key: &ResourceKey, manifest: &Manifest, hash: &str) -> Result<bool, StoreError> {
        let dir = self.record_dir(key);
        fs::create_dir_all(&dir).map_err(|e| Self::io_err(key, e))?;

        let hash_path = dir.join(HASH_FILE);
        let existing_hash = fs::read_to_string(&hash_path).unwrap_or_default();
        if existing_hash == hash {
            return Ok(false);
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let serialized = serde_json::to_vec_pretty(manifest).map_err(|e| StoreError::Serde {
            key: key.clone(),
            source: e,
        })?;
        fs::write(&manifest_path, serialized).map_err(|e| Self::io_err(key, e))?;
        fs::write(&hash_path, hash).map_err(|e| Self::io_err(key, e))?;

        Ok(true)
    }

    fn read(&self, key: &ResourceKey) -> Result<(Option<Manifest>, String), StoreError> {
        let dir = self.record_dir(key);
        let manifest_path = dir.join(MANIFEST_FILE);
        let hash_path = dir.join(HASH_FILE);

        let manifest_bytes = match fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((None, String::new())),
            Err(e) => return Err(Self::io_err(key, e)),
        };
        let hash = match fs::read_to_string(&hash_path) {
            Ok(h) => h,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((None, String::new())),
            Err(e) => return Err(Self::io_err(key, e)),
        };
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes).map_err(|e| StoreError::Serde {
            key: key.clone(),
            source: e,
        })?;
        Ok((Some(manifest), hash))
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        let dir = self.record_dir(key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(key, e)),
        }
    }

    fn mark_tombstone(&self, key: &ResourceKey) -> Result<(), StoreError> {
        let dir = self.record_dir(key);
        if !dir.is_dir() {
            return Err(StoreError::NoSuchRecord(key.clone()));
        }
        fs::File::create(dir.join(TOMBSTONE_FILE)).map_err(|e| Self::io_err(key, e))?;
        Ok(())
    }

    fn list_tombstones(&self) -> Result<Vec<TombstoneEntry>, StoreError> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.base_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name() != TOMBSTONE_FILE {
                continue;
            }
            let Some(record_dir) = entry.path().parent() else {
                continue;
            };
            let Some(key) = self.parse_record_dir(record_dir) else {
                continue;
            };
            let mod_time = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            entries.push(TombstoneEntry { key, mod_time });
        }
        Ok(entries)
    }

    fn delete_tombstone(&self, key: &ResourceKey) -> Result<(), StoreError> {
        let path = self.record_dir(key).join(TOMBSTONE_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(key, e)),
        }
    }

    fn list_hashes(&self, gvk: &Gvk) -> Result<BTreeMap<(String, String), String>, StoreError> {
        let kind_dir = self.base_dir.join(&gvk.group).join(&gvk.version).join(&gvk.kind);
        let mut hashes = BTreeMap::new();

        let namespaces = match fs::read_dir(&kind_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(hashes),
            Err(e) => {
                return Err(StoreError::Io {
                    key: ResourceKey::new(gvk.clone(), "", ""),
                    source: e,
                })
            }
        };

        for ns_entry in namespaces.filter_map(|e| e.ok()) {
            if !ns_entry.path().is_dir() {
                continue;
            }
            let namespace = ns_entry.file_name().to_string_lossy().into_owned();
            let Ok(names) = fs::read_dir(ns_entry.path()) else {
                continue;
            };
            for name_entry in names.filter_map(|e| e.ok()) {
                if !name_entry.path().is_dir() {
                    continue;
                }
                let name = name_entry.file_name().to_string_lossy().into_owned();
                if let Ok(hash) = fs::read_to_string(name_entry.path().join(HASH_FILE)) {
                    hashes.insert((namespace.clone(), name), hash);
                }
            }
        }

        Ok(hashes)
    }
}
