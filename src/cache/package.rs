// src/cache/package.rs
//! Target package descriptors
//!
//! A [`TargetPackage`] is everything the registry serves for one mirrored
//! package: the UPM manifest (`package.json`), every output file with its
//! `.meta` sidecar, and the sidecars of the folders those files live in.
//! Descriptors are immutable once built; a rebuild produces a new one.

use crate::hash::{content_digest, sha256};
use crate::upstream::PackageIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path of the package manifest inside the package
pub const MANIFEST_PATH: &str = "package.json";

/// UPM `package.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub unity: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl PackageManifest {
    /// Pretty JSON with a trailing newline
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}

/// One file of a target package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub content: Vec<u8>,
    /// `.meta` sidecar text
    pub meta: String,
}

/// A built package, ready to serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPackage {
    pub manifest: PackageManifest,
    /// Upstream version the package was built from
    pub source: PackageIdentity,
    /// Output path to file, `package.json` included
    pub files: BTreeMap<String, PackageFile>,
    /// Folder path to its `.meta` sidecar
    pub folders: BTreeMap<String, String>,
}

impl TargetPackage {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    /// Digest over every file and sidecar; equal digests mean equal packages
    pub fn digest(&self) -> String {
        let metas: Vec<(String, &[u8])> = self
            .files
            .iter()
            .map(|(path, file)| (format!("{}.meta", path), file.meta.as_bytes()))
            .chain(
                self.folders
                    .iter()
                    .map(|(path, meta)| (format!("{}.meta", path), meta.as_bytes())),
            )
            .collect();

        content_digest(
            self.files
                .iter()
                .map(|(path, file)| (path.as_str(), file.content.as_slice()))
                .chain(metas.iter().map(|(path, meta)| (path.as_str(), *meta))),
        )
    }

    /// Entry for the registry listing
    pub fn summary(&self) -> PackageSummary {
        PackageSummary {
            name: self.manifest.name.clone(),
            display_name: self.manifest.display_name.clone(),
            version: self.manifest.version.clone(),
            description: self.manifest.description.clone(),
            source: self.source.to_string(),
        }
    }

    /// Full registry document
    pub fn document(&self) -> PackageDocument {
        PackageDocument {
            manifest: self.manifest.clone(),
            source: self.source.to_string(),
            digest: self.digest(),
            files: self
                .files
                .iter()
                .map(|(path, file)| FileEntry {
                    path: path.clone(),
                    size: file.content.len() as u64,
                    sha256: sha256(&file.content),
                    meta: file.meta.clone(),
                })
                .collect(),
            folders: self
                .folders
                .iter()
                .map(|(path, meta)| FolderEntry {
                    path: path.clone(),
                    meta: meta.clone(),
                })
                .collect(),
        }
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub description: String,
    /// Upstream `id version`
    pub source: String,
}

/// Full package document served by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDocument {
    pub manifest: PackageManifest,
    pub source: String,
    pub digest: String,
    pub files: Vec<FileEntry>,
    pub folders: Vec<FolderEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
    pub meta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub path: String,
    pub meta: String,
}
