// src/upstream/local.rs
//! Directory-backed upstream feed
//!
//! Layout:
//! ```text
//! <root>/<id lowercase>/index.json        versions and dependency groups
//! <root>/<id lowercase>/<version>/...     extracted package content
//! ```
//!
//! `index.json`:
//! ```json
//! { "id": "Scriban",
//!   "versions": [ { "version": "5.0.0", "listed": true,
//!                   "dependencyGroups": [ { "targetFramework": ".NETStandard2.0",
//!                                           "dependencies": [] } ] } ] }
//! ```

use super::{
    under_prefix, DependencyGroup, PackageContent, PackageIdentity, PackageMetadata,
    UpstreamSource,
};
use crate::error::{Error, Result};
use crate::version::NuGetVersion;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct FeedIndex {
    id: String,
    #[serde(default)]
    versions: Vec<FeedVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedVersion {
    version: NuGetVersion,
    #[serde(default = "default_listed")]
    listed: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dependency_groups: Vec<DependencyGroup>,
}

fn default_listed() -> bool {
    true
}

/// Upstream source reading a local directory feed
pub struct LocalFeed {
    root: PathBuf,
}

impl LocalFeed {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn package_dir(&self, id: &str) -> PathBuf {
        self.root.join(id.to_lowercase())
    }
}

#[async_trait]
impl UpstreamSource for LocalFeed {
    async fn fetch_metadata(&self, id: &str) -> Result<Vec<PackageMetadata>> {
        let index_path = self.package_dir(id).join("index.json");
        let text = tokio::fs::read_to_string(&index_path)
            .await
            .map_err(|e| Error::fetch(id, format!("{}: {}", index_path.display(), e)))?;
        let index: FeedIndex = serde_json::from_str(&text)
            .map_err(|e| Error::fetch(id, format!("invalid {}: {}", index_path.display(), e)))?;

        debug!("Feed index for {} lists {} versions", index.id, index.versions.len());

        Ok(index
            .versions
            .into_iter()
            .map(|v| PackageMetadata {
                identity: PackageIdentity::new(index.id.clone(), v.version),
                listed: v.listed,
                description: v.description,
                dependency_groups: v.dependency_groups,
            })
            .collect())
    }

    async fn download(&self, identity: &PackageIdentity) -> Result<Arc<dyn PackageContent>> {
        let dir = self.package_dir(&identity.id).join(identity.version.to_string());
        if !dir.is_dir() {
            return Err(Error::fetch(
                &identity.id,
                format!("no content directory {}", dir.display()),
            ));
        }

        let walk_root = dir.clone();
        let items = tokio::task::spawn_blocking(move || list_files(&walk_root))
            .await
            .map_err(|e| Error::fetch(&identity.id, format!("listing task failed: {}", e)))?
            .map_err(|e| Error::fetch(&identity.id, e))?;

        debug!("Opened {} from {} ({} items)", identity, dir.display(), items.len());

        Ok(Arc::new(LocalPackage {
            identity: identity.clone(),
            dir,
            items,
        }))
    }

    fn name(&self) -> &str {
        "local-feed"
    }
}

fn list_files(dir: &Path) -> std::result::Result<Vec<String>, walkdir::Error> {
    let mut items = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(dir) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            items.push(parts.join("/"));
        }
    }
    Ok(items)
}

/// Extracted package content on disk
struct LocalPackage {
    identity: PackageIdentity,
    dir: PathBuf,
    items: Vec<String>,
}

#[async_trait]
impl PackageContent for LocalPackage {
    fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    async fn items(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .items
            .iter()
            .filter(|path| under_prefix(path, prefix))
            .cloned()
            .collect())
    }

    async fn open(&self, path: &str) -> Result<Vec<u8>> {
        let relative = Path::new(path);
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(Error::NotFound(format!("{} has no item {}", self.identity, path)));
        }
        Ok(tokio::fs::read(self.dir.join(relative)).await?)
    }
}
