// src/lib.rs

//! NuGet to Unity package mirror
//!
//! Republishes packages from a NuGet feed as Unity Package Manager packages,
//! served from an in-memory catalog.
//!
//! # Architecture
//!
//! - Registry: an ordered manifest of upstream packages to mirror
//! - Framework resolution: picks the version and `lib/<tfm>` folders that
//!   serve the Unity target frameworks
//! - Platform model: places runtime-specific and native binaries per OS/CPU
//! - Analyzer selection: fences Roslyn analyzers to the Unity versions whose
//!   compiler can load them
//! - Stable guids: every output file gets a deterministic Unity guid
//! - Registry cache: builds entries concurrently into the catalog

pub mod analyzer;
pub mod cache;
pub mod config;
mod error;
pub mod framework;
pub mod hash;
pub mod meta;
pub mod platform;
pub mod registry;
pub mod upstream;
pub mod version;

pub use analyzer::{AnalyzerVersion, CompilerVersion};
pub use cache::{
    BuildFailure, BuildReport, CacheOptions, Catalog, EntryState, PackageDocument, PackageSummary,
    RegistryCache, TargetPackage, VersionSelection,
};
pub use config::MirrorConfig;
pub use error::{Error, Result};
pub use framework::{Framework, TargetFramework};
pub use hash::{stable_guid, unity_guid};
pub use platform::{Cpu, NodeId, Os, PlatformFile, PlatformTree};
pub use registry::{Registry, RegistryEntry};
pub use upstream::{LocalFeed, MemoryPackage, MemorySource, PackageContent, PackageIdentity, UpstreamSource};
pub use version::{NuGetVersion, VersionRange};
