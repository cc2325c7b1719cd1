// src/upstream/memory.rs
//! In-memory upstream source

use super::{under_prefix, PackageContent, PackageIdentity, PackageMetadata, UpstreamSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Package content held in memory
#[derive(Debug, Clone)]
pub struct MemoryPackage {
    identity: PackageIdentity,
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryPackage {
    pub fn new(identity: PackageIdentity) -> Self {
        Self {
            identity,
            files: BTreeMap::new(),
        }
    }

    /// Add a file; backslashes are normalized to forward slashes
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.replace('\\', "/"), content.into());
        self
    }
}

#[async_trait]
impl PackageContent for MemoryPackage {
    fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    async fn items(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .keys()
            .filter(|path| under_prefix(path, prefix))
            .cloned()
            .collect())
    }

    async fn open(&self, path: &str) -> Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            Error::NotFound(format!("{} has no item {}", self.identity, path))
        })
    }
}

/// Upstream source backed by packages registered up front
#[derive(Default)]
pub struct MemorySource {
    metadata: HashMap<String, Vec<PackageMetadata>>,
    content: HashMap<(String, String), Arc<MemoryPackage>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a version's metadata together with its content
    pub fn add(&mut self, metadata: PackageMetadata, package: MemoryPackage) {
        let key = metadata.identity.id.to_lowercase();
        self.content.insert(
            (key.clone(), metadata.identity.version.to_string()),
            Arc::new(package),
        );
        self.metadata.entry(key).or_default().push(metadata);
    }

    /// Register metadata only; downloading that version fails
    pub fn add_metadata(&mut self, metadata: PackageMetadata) {
        let key = metadata.identity.id.to_lowercase();
        self.metadata.entry(key).or_default().push(metadata);
    }
}

#[async_trait]
impl UpstreamSource for MemorySource {
    async fn fetch_metadata(&self, id: &str) -> Result<Vec<PackageMetadata>> {
        self.metadata
            .get(&id.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::fetch(id, "package not found upstream"))
    }

    async fn download(&self, identity: &PackageIdentity) -> Result<Arc<dyn PackageContent>> {
        let key = (identity.id.to_lowercase(), identity.version.to_string());
        match self.content.get(&key) {
            Some(package) => Ok(package.clone() as Arc<dyn PackageContent>),
            None => Err(Error::fetch(&identity.id, format!("no content for {}", identity.version))),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::NuGetVersion;

    fn identity(version: &str) -> PackageIdentity {
        PackageIdentity::new("Scriban", NuGetVersion::parse(version).unwrap())
    }

    fn metadata(version: &str) -> PackageMetadata {
        PackageMetadata {
            identity: identity(version),
            listed: true,
            description: None,
            dependency_groups: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_memory_source_lookup_is_case_insensitive() {
        let mut source = MemorySource::new();
        source.add(metadata("5.0.0"), MemoryPackage::new(identity("5.0.0")));
        source.add(metadata("5.4.0"), MemoryPackage::new(identity("5.4.0")));

        let versions = source.fetch_metadata("scriban").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(source.fetch_metadata("unknown").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_package_items_and_open() {
        let mut source = MemorySource::new();
        let package = MemoryPackage::new(identity("5.0.0"))
            .with_file("lib\\netstandard2.0\\Scriban.dll", b"dll".to_vec())
            .with_file("lib/netstandard2.0/Scriban.xml", b"xml".to_vec())
            .with_file("README.md", b"readme".to_vec());
        source.add(metadata("5.0.0"), package);

        let content = source.download(&identity("5.0.0")).await.unwrap();
        assert_eq!(content.identity().id, "Scriban");
        let items = content.items("lib").await.unwrap();
        assert_eq!(items, vec!["lib/netstandard2.0/Scriban.dll", "lib/netstandard2.0/Scriban.xml"]);
        assert_eq!(content.items("").await.unwrap().len(), 3);
        assert_eq!(content.open("README.md").await.unwrap(), b"readme");
        assert!(content.open("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_source_download_without_content() {
        let mut source = MemorySource::new();
        source.add_metadata(metadata("1.0.0"));
        let err = source.download(&identity("1.0.0")).await.err().unwrap();
        assert_eq!(err.kind(), "fetch");
    }
}
