//! Deterministic content fingerprint of a manifest (C1).
//!
//! Mirrors the hashing idiom used throughout `pbs-datastore` (SHA-256 via
//! `openssl::sha`, hex via the `hex` crate), applied to a sanitized,
//! canonically-ordered JSON manifest instead of a raw chunk of bytes.

use thiserror::Error;

use crate::types::Manifest;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to canonicalize manifest: {0}")]
    Marshal(#[from] serde_json::Error),
}

/// Fields stripped before hashing: the cluster mutates these on every
/// reconciliation, and without stripping them every heartbeat would look
/// like a content change and trigger a spurious backup write.
const VOLATILE_FIELDS: &[&[&str]] = &[
    &["metadata", "resourceVersion"],
    &["metadata", "generation"],
    &["metadata", "creationTimestamp"],
    &["status"],
];

/// Deep-clones `manifest`, strips the volatile fields, serializes the
/// result with `serde_json` (whose default `Map` is a `BTreeMap`, so keys
/// come out sorted at every nesting level with no extra work), and returns
/// the lowercase hex SHA-256 digest of that canonical form.
pub fn hash(manifest: &Manifest) -> Result<String, HashError> {
    let mut sanitized = manifest.clone();
    for path in VOLATILE_FIELDS {
        remove_nested_field(&mut sanitized, path);
    }
    let canonical = serde_json::to_vec(&sanitized)?;
    let digest = openssl::sha::sha256(&canonical);
    Ok(hex::encode(digest))
}

fn remove_nested_field(value: &mut Manifest, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = value;
    for segment in parents {
        match cursor.get_mut(*segment) {
            Some(next) => cursor = next,
            None => return,
        }
    }
    if let Some(obj) = cursor.as_object_mut() {
        obj.remove(*last);
    }
}
