// src/hash.rs

//! Deterministic identifiers and content digests
//!
//! Unity tracks every asset by the 128-bit guid in its `.meta` file. The
//! guid of a mirrored file must survive a re-publish of the same package
//! version, so it is derived from (package name, package version, output
//! path) rather than generated randomly.
//!
//! The three fields are encoded with explicit length prefixes before being
//! hashed, so two different triples can never produce the same hash input
//! (`("a/b", "c")` and `("a", "b/c")` stay apart).

use crate::upstream::PackageIdentity;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for name-based package file guids
const PACKAGE_FILE_NAMESPACE: Uuid = Uuid::from_u128(0x5d3c_9a1e_4b7f_4e2a_9c61_0f8e_2d4b_7a13);

fn push_field(buffer: &mut Vec<u8>, field: &[u8]) {
    buffer.extend_from_slice(&(field.len() as u64).to_le_bytes());
    buffer.extend_from_slice(field);
}

/// Stable guid for one file of one package version
///
/// The package name is case-folded (upstream names are case-insensitive) and
/// the version is normalized, so `Foo 1.0` and `foo 1.0.0` agree.
pub fn stable_guid(identity: &PackageIdentity, path: &str) -> Uuid {
    let mut input = Vec::with_capacity(identity.id.len() + path.len() + 48);
    push_field(&mut input, identity.id.to_lowercase().as_bytes());
    push_field(&mut input, identity.version.to_string().as_bytes());
    push_field(&mut input, path.as_bytes());
    Uuid::new_v5(&PACKAGE_FILE_NAMESPACE, &input)
}

/// [`stable_guid`] in Unity's textual form: 32 lowercase hex digits
pub fn unity_guid(identity: &PackageIdentity, path: &str) -> String {
    stable_guid(identity, path).simple().to_string()
}

/// SHA-256 of a byte slice as lowercase hex
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Digest over a set of (path, content) pairs
///
/// Callers pass entries in a fixed order; the digest changes when any path,
/// any content or the order changes.
pub fn content_digest<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in entries {
        hasher.update((path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(content);
    }
    hex::encode(hasher.finalize())
}
