// src/upstream/mod.rs
//! Upstream package source abstraction
//!
//! The build pipeline never talks to a transport directly. It asks an
//! [`UpstreamSource`] for the versions of a package and for the content of
//! one version, then reads items out of the returned [`PackageContent`].
//! Timeouts and retries are the source's business; any error it returns
//! fails the one manifest entry being built.
//!
//! Implementations:
//! - [`MemorySource`]: packages registered in memory (tests, embedding)
//! - [`LocalFeed`]: a directory of extracted packages with JSON indexes

mod local;
mod memory;

pub use local::LocalFeed;
pub use memory::{MemoryPackage, MemorySource};

use crate::error::Result;
use crate::framework::Framework;
use crate::version::{NuGetVersion, VersionRange};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Upstream (name, version) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: String,
    pub version: NuGetVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: NuGetVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// One dependency declared by an upstream package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub id: String,
    #[serde(default)]
    pub range: VersionRange,
}

impl PackageDependency {
    pub fn new(id: impl Into<String>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }
}

/// Dependencies declared for one target framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGroup {
    #[serde(default = "any_framework")]
    pub target_framework: Framework,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

fn any_framework() -> Framework {
    Framework::Any
}

/// Metadata of one upstream version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub identity: PackageIdentity,
    pub listed: bool,
    pub description: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
}

/// Source of upstream metadata and package content
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// All known versions of a package, listed or not, in any order
    async fn fetch_metadata(&self, id: &str) -> Result<Vec<PackageMetadata>>;

    /// Content of one specific version
    async fn download(&self, identity: &PackageIdentity) -> Result<Arc<dyn PackageContent>>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// Opened content of one package version
#[async_trait]
pub trait PackageContent: Send + Sync {
    /// Identity recorded in the content itself
    fn identity(&self) -> &PackageIdentity;

    /// Item paths (forward slashes, relative to the package root) under `prefix`
    ///
    /// An empty prefix lists everything.
    async fn items(&self, prefix: &str) -> Result<Vec<String>>;

    /// Full contents of one item
    async fn open(&self, path: &str) -> Result<Vec<u8>>;
}

/// Does `path` lie under `prefix`, treating the prefix as a folder?
pub(crate) fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        && path.as_bytes().get(prefix.len()) == Some(&b'/')
}
