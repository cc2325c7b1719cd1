// src/cache/mod.rs
//! Registry cache: builds target packages and serves them from a catalog
//!
//! One build pass walks the manifest in order. Each entry is resolved
//! against upstream metadata, downloaded, laid out and installed in the
//! [`Catalog`]. Entries build concurrently up to `max_concurrent`; a failing
//! entry is recorded and reported through the error callback while the rest
//! of the pass continues. Builds are deterministic: rebuilding unchanged
//! inputs yields identical descriptors.

mod assemble;
mod catalog;
mod package;
mod state;

pub use assemble::{folder_metas, plan_analyzers, plan_managed, plan_native, PlannedFile};
pub use catalog::Catalog;
pub use package::{
    FileEntry, FolderEntry, PackageDocument, PackageFile, PackageManifest, PackageSummary,
    TargetPackage, MANIFEST_PATH,
};
pub use state::{EntryState, StateBoard, StateStats};

use crate::analyzer::{fallback_candidates, unity_supported_files, AnalyzerVersion, SelectionContext};
use crate::error::{Error, Result};
use crate::framework::{
    compatible_dependency_groups, is_compatible_version, is_net_standard_assembly,
    minimum_compatible_package_identity, TargetFramework,
};
use crate::hash::unity_guid;
use crate::meta::{extension_of, package_manifest_meta};
use crate::platform::PlatformTree;
use crate::registry::{Registry, RegistryEntry};
use crate::upstream::{PackageContent, PackageIdentity, PackageMetadata, UpstreamSource};
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which of the acceptable upstream versions to publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionSelection {
    /// Lowest version usable by every target framework
    #[default]
    Minimum,
    /// Highest version usable by every target framework
    Latest,
}

/// Options a registry cache runs with
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Target package name prefix
    pub scope: String,
    pub unity_version: String,
    pub name_suffix: String,
    pub version_selection: VersionSelection,
    pub target_frameworks: Vec<TargetFramework>,
    pub analyzer_versions: Vec<AnalyzerVersion>,
    pub max_concurrent: usize,
    /// Only entries whose name matches are built
    pub filter: Option<Regex>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        let config = crate::config::MirrorConfig::default();
        Self {
            scope: config.registry.scope,
            unity_version: config.registry.unity_version,
            name_suffix: config.registry.name_suffix,
            version_selection: config.registry.version_selection,
            target_frameworks: config.target_frameworks,
            analyzer_versions: config.analyzer_versions,
            max_concurrent: config.build.max_concurrent,
            filter: None,
        }
    }
}

/// A manifest entry that failed to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    pub entry: String,
    /// Error classification (`fetch`, `resolution`, ...)
    pub kind: String,
    pub reason: String,
}

/// Outcome of one build pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Target package names, manifest order
    pub published: Vec<String>,
    /// Entry names not built this pass
    pub skipped: Vec<String>,
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

type ErrorCallback = Box<dyn Fn(&BuildFailure) + Send + Sync>;

enum Outcome {
    Published(String),
    Skipped(String),
    Failed(BuildFailure),
}

/// Resolved version of an entry, before download
struct Resolution {
    metadata: PackageMetadata,
    targets: Vec<TargetFramework>,
    /// No version serves the targets; only native plugins can be published
    native_only: bool,
}

/// Builds manifest entries into the catalog
pub struct RegistryCache {
    registry: Arc<Registry>,
    source: Arc<dyn UpstreamSource>,
    options: CacheOptions,
    catalog: Arc<Catalog>,
    states: StateBoard,
    tree: PlatformTree,
    on_error: Option<ErrorCallback>,
}

impl RegistryCache {
    pub fn new(registry: Arc<Registry>, source: Arc<dyn UpstreamSource>, options: CacheOptions) -> Self {
        let order = registry
            .entries()
            .iter()
            .filter(|entry| !entry.ignored)
            .map(|entry| target_name(&options.scope, &entry.name))
            .collect();

        Self {
            registry,
            source,
            options,
            catalog: Arc::new(Catalog::new(order)),
            states: StateBoard::new(),
            tree: PlatformTree::create_all(),
            on_error: None,
        }
    }

    /// Called once per failed entry, as soon as it fails
    pub fn with_error_callback(mut self, callback: impl Fn(&BuildFailure) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Shared handle to the catalog for readers
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    /// Build state of a manifest entry
    pub fn state(&self, name: &str) -> Option<EntryState> {
        self.states.get(name)
    }

    pub fn stats(&self) -> StateStats {
        self.states.stats()
    }

    /// Target package name of an upstream id
    pub fn target_name(&self, id: &str) -> String {
        target_name(&self.options.scope, id)
    }

    /// Run one build pass over the whole manifest
    pub async fn build(&self) -> BuildReport {
        let mut report = BuildReport::default();
        let mut queued: Vec<&RegistryEntry> = Vec::new();

        for entry in self.registry.entries() {
            let skip = if entry.ignored {
                Some("ignored")
            } else if self
                .options
                .filter
                .as_ref()
                .is_some_and(|filter| !filter.is_match(&entry.name))
            {
                Some("filtered")
            } else {
                None
            };

            match skip {
                Some(reason) => {
                    debug!("Skipping {} ({})", entry.name, reason);
                    self.states.set(&entry.name, EntryState::Skipped(reason.to_string()));
                    report.skipped.push(entry.name.clone());
                }
                None => {
                    self.states.set(&entry.name, EntryState::Pending);
                    queued.push(entry);
                }
            }
        }

        info!(
            "Building {} entries from {} ({} at a time)",
            queued.len(),
            self.source.name(),
            self.options.max_concurrent
        );

        let outcomes: Vec<Outcome> = futures::stream::iter(queued)
            .map(|entry| self.run_entry(entry))
            .buffered(self.options.max_concurrent.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Published(name) => report.published.push(name),
                Outcome::Skipped(name) => report.skipped.push(name),
                Outcome::Failed(failure) => report.failures.push(failure),
            }
        }

        for entry in self.registry.entries() {
            if let Some(state) = self.states.get(&entry.name).filter(|state| !state.is_terminal()) {
                warn!("{} left the pass unfinished ({})", entry.name, state);
            }
        }

        info!(
            "Build finished: {} published, {} skipped, {} failed",
            report.published.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    async fn run_entry(&self, entry: &RegistryEntry) -> Outcome {
        match self.build_entry(entry).await {
            Ok(package) => {
                let name = package.name().to_string();
                info!("Published {} {} from {}", name, package.version(), package.source);
                self.catalog.publish(package);
                self.states.set(&entry.name, EntryState::Published);
                Outcome::Published(name)
            }
            Err(e) => {
                let failure = BuildFailure {
                    entry: entry.name.clone(),
                    kind: e.kind().to_string(),
                    reason: e.to_string(),
                };
                warn!("Failed to build {}: {}", entry.name, e);
                self.states.set(&entry.name, EntryState::Failed(failure.reason.clone()));
                if let Some(callback) = &self.on_error {
                    callback(&failure);
                }
                Outcome::Failed(failure)
            }
        }
    }

    /// Build one entry without touching the catalog
    pub async fn build_entry(&self, entry: &RegistryEntry) -> Result<Arc<TargetPackage>> {
        self.states.set(&entry.name, EntryState::Resolving);
        let resolution = self.resolve(entry).await?;
        let identity = resolution.metadata.identity.clone();
        debug!("{} resolved to {}", entry.name, identity);

        self.states.set(&entry.name, EntryState::Assembling);
        let content = self.source.download(&identity).await?;
        let recorded = content.identity();
        if !recorded.id.eq_ignore_ascii_case(&identity.id) || recorded.version != identity.version {
            return Err(Error::DecodeFailure {
                path: identity.to_string(),
                reason: format!("content identifies itself as {}", recorded),
            });
        }
        let items = content.items("").await?;

        // Any package may carry analyzers next to lib and native content
        let mut planned = self.plan_analyzer_files(&identity, content.as_ref(), &items).await?;
        if !resolution.native_only {
            planned.extend(plan_managed(&self.tree, &identity, &items, &resolution.targets));
        }
        let natives = plan_native(&self.tree, &identity, &items);
        if resolution.native_only && natives.is_empty() {
            return Err(Error::resolution(
                &entry.name,
                format!(
                    "no version in {} supports {}",
                    entry.version,
                    describe_targets(&resolution.targets)
                ),
            ));
        }
        planned.extend(natives);

        let dependencies = self.dependencies(entry, &resolution)?;
        let manifest = PackageManifest {
            name: self.target_name(&identity.id),
            display_name: format!("{}{}", identity.id, self.options.name_suffix),
            version: identity.version.to_npm(),
            unity: self.options.unity_version.clone(),
            description: resolution.metadata.description.clone().unwrap_or_default(),
            dependencies,
            keywords: Vec::new(),
        };

        let mut files: BTreeMap<String, PackageFile> = BTreeMap::new();
        let mut sources: HashMap<String, String> = HashMap::new();
        for file in planned {
            if let Some(previous) = sources.insert(file.destination.clone(), file.source.clone()) {
                return Err(Error::resolution(
                    &entry.name,
                    format!(
                        "{} and {} both map to {}",
                        previous, file.source, file.destination
                    ),
                ));
            }
            let bytes = content.open(&file.source).await?;
            files.insert(
                file.destination,
                PackageFile {
                    content: bytes,
                    meta: file.meta,
                },
            );
        }
        files.insert(
            MANIFEST_PATH.to_string(),
            PackageFile {
                content: manifest.to_json()?.into_bytes(),
                meta: package_manifest_meta(&unity_guid(&identity, MANIFEST_PATH)),
            },
        );

        let folders = folder_metas(&identity, files.keys().map(String::as_str));
        Ok(Arc::new(TargetPackage {
            manifest,
            source: identity,
            files,
            folders,
        }))
    }

    /// Pick the upstream version to publish
    async fn resolve(&self, entry: &RegistryEntry) -> Result<Resolution> {
        let versions = self.source.fetch_metadata(&entry.name).await?;
        let candidates: Vec<PackageMetadata> = versions
            .into_iter()
            .filter(|m| entry.version.satisfies(&m.identity.version))
            .filter(|m| entry.include_prerelease || !m.identity.version.is_prerelease())
            .filter(|m| entry.include_unlisted || m.listed)
            .collect();

        if candidates.is_empty() {
            return Err(Error::resolution(
                &entry.name,
                format!("no upstream version matches {}", entry.version),
            ));
        }

        let targets = entry
            .target_frameworks
            .clone()
            .unwrap_or_else(|| self.options.target_frameworks.clone());

        // Analyzers are compiler plugins; framework groups do not apply
        if entry.analyzer {
            let metadata = self.select_by_policy(candidates.iter())?;
            return Ok(Resolution {
                metadata,
                targets,
                native_only: false,
            });
        }

        let compatible = match self.options.version_selection {
            VersionSelection::Minimum => minimum_compatible_package_identity(&candidates, &targets, true)
                .and_then(|identity| candidates.iter().find(|m| &m.identity == identity)),
            VersionSelection::Latest => candidates
                .iter()
                .filter(|m| is_compatible_version(m, &targets, true))
                .max_by(|a, b| a.identity.version.cmp(&b.identity.version)),
        };

        match compatible {
            Some(metadata) => Ok(Resolution {
                metadata: metadata.clone(),
                targets,
                native_only: false,
            }),
            None => {
                debug!(
                    "{}: no version supports {}, trying native-only",
                    entry.name,
                    describe_targets(&targets)
                );
                Ok(Resolution {
                    metadata: self.select_by_policy(candidates.iter())?,
                    targets,
                    native_only: true,
                })
            }
        }
    }

    fn select_by_policy<'a>(&self, candidates: impl Iterator<Item = &'a PackageMetadata>) -> Result<PackageMetadata> {
        let chosen = match self.options.version_selection {
            VersionSelection::Minimum => candidates.min_by(|a, b| a.identity.version.cmp(&b.identity.version)),
            VersionSelection::Latest => candidates.max_by(|a, b| a.identity.version.cmp(&b.identity.version)),
        };
        chosen
            .cloned()
            .ok_or_else(|| Error::NotFound("no candidate versions".to_string()))
    }

    async fn plan_analyzer_files(
        &self,
        identity: &PackageIdentity,
        content: &dyn PackageContent,
        items: &[String],
    ) -> Result<Vec<PlannedFile>> {
        let mut assemblies = HashMap::new();
        for path in fallback_candidates(items) {
            if extension_of(&path).eq_ignore_ascii_case(".dll") {
                let bytes = content.open(&path).await?;
                assemblies.insert(path, bytes);
            }
        }

        let ctx = SelectionContext {
            identity,
            versions: &self.options.analyzer_versions,
            assemblies: &assemblies,
        };
        Ok(plan_analyzers(unity_supported_files(&ctx, items)))
    }

    /// npm dependencies of the resolved version
    ///
    /// Framework-provided and ignored packages are dropped; anything else
    /// must be part of the manifest.
    fn dependencies(&self, entry: &RegistryEntry, resolution: &Resolution) -> Result<BTreeMap<String, String>> {
        let mut dependencies = BTreeMap::<String, String>::new();
        let groups = compatible_dependency_groups(&resolution.metadata.dependency_groups, &resolution.targets);

        for dependency in groups.iter().flat_map(|group| &group.dependencies) {
            if is_net_standard_assembly(&dependency.id) {
                continue;
            }
            let Some(registered) = self.registry.get(&dependency.id) else {
                return Err(Error::resolution(
                    &entry.name,
                    format!("dependency {} is not in the registry", dependency.id),
                ));
            };
            if registered.ignored {
                debug!("{}: dropping ignored dependency {}", entry.name, dependency.id);
                continue;
            }

            let version = dependency
                .range
                .min_version()
                .map(|v| v.to_npm())
                .unwrap_or_else(|| "0.0.0".to_string());
            if let Some(min) = dependency.range.min_version() {
                if !registered.version.satisfies(min) {
                    warn!(
                        "{} needs {} {} but the registry allows {}",
                        entry.name, dependency.id, min, registered.version
                    );
                }
            }

            let name = self.target_name(&dependency.id);
            match dependencies.get(&name) {
                // Several groups may name the same dependency; keep the highest floor
                Some(existing) if version_key(existing) >= version_key(&version) => {}
                _ => {
                    dependencies.insert(name, version);
                }
            }
        }

        Ok(dependencies)
    }
}

fn target_name(scope: &str, id: &str) -> String {
    format!("{}.{}", scope, id).to_lowercase()
}

fn describe_targets(targets: &[TargetFramework]) -> String {
    targets
        .iter()
        .map(|t| t.framework.short_name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn version_key(version: &str) -> Option<crate::version::NuGetVersion> {
    crate::version::NuGetVersion::parse(version).ok()
}
