// src/config.rs
//! Configuration file parsing for the mirror
//!
//! Supports TOML configuration files with the following sections:
//! - [registry] - Package scope, Unity version, display name suffix
//! - [[target_frameworks]] - Frameworks Unity compiles against
//! - [[analyzer_versions]] - Roslyn versions shipped by Unity releases
//! - [build] - Concurrency and entry filter
//! - [upstream] - Local feed location

use crate::analyzer::{AnalyzerVersion, CompilerVersion};
use crate::cache::{CacheOptions, VersionSelection};
use crate::framework::TargetFramework;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML configuration file structure
#[derive(Debug, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub registry: RegistrySection,

    #[serde(default = "default_target_frameworks")]
    pub target_frameworks: Vec<TargetFramework>,

    #[serde(default = "default_analyzer_versions")]
    pub analyzer_versions: Vec<AnalyzerVersion>,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub upstream: UpstreamSection,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            registry: RegistrySection::default(),
            target_frameworks: default_target_frameworks(),
            analyzer_versions: default_analyzer_versions(),
            build: BuildSection::default(),
            upstream: UpstreamSection::default(),
        }
    }
}

/// Naming of published packages
#[derive(Debug, Deserialize)]
pub struct RegistrySection {
    /// Prefix of every package name (`org.nuget.scriban`)
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Minimum Unity version written into package manifests
    #[serde(default = "default_unity_version")]
    pub unity_version: String,

    /// Appended to the upstream id in display names
    #[serde(default = "default_name_suffix")]
    pub name_suffix: String,

    #[serde(default)]
    pub version_selection: VersionSelection,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            unity_version: default_unity_version(),
            name_suffix: default_name_suffix(),
            version_selection: VersionSelection::default(),
        }
    }
}

fn default_scope() -> String {
    "org.nuget".to_string()
}

fn default_unity_version() -> String {
    "2019.1".to_string()
}

fn default_name_suffix() -> String {
    " (NuGet)".to_string()
}

fn default_target_frameworks() -> Vec<TargetFramework> {
    vec![
        TargetFramework::new("netstandard2.0", &["!UNITY_2021_2_OR_NEWER"]),
        TargetFramework::new("netstandard2.1", &["UNITY_2021_2_OR_NEWER"]),
    ]
}

fn default_analyzer_versions() -> Vec<AnalyzerVersion> {
    vec![
        AnalyzerVersion::new(CompilerVersion::new(3, 8, 0, 0), &[], &["!UNITY_6000_0_OR_NEWER"]),
        AnalyzerVersion::new(
            CompilerVersion::new(4, 3, 0, 0),
            &["UNITY_6000_0_OR_NEWER"],
            &["UNITY_6000_0_OR_NEWER"],
        ),
    ]
}

/// Build pass settings
#[derive(Debug, Deserialize)]
pub struct BuildSection {
    /// Entries built at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Only build entries whose name matches this regex
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            filter: None,
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

/// Where upstream packages come from
#[derive(Debug, Default, Deserialize)]
pub struct UpstreamSection {
    /// Local feed directory
    #[serde(default)]
    pub feed: Option<PathBuf>,
}

static UNITY_VERSION: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"^\d{4}\.\d+$").unwrap());

impl MirrorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: MirrorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let scope = &self.registry.scope;
        if scope.is_empty()
            || !scope
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            anyhow::bail!("registry.scope must be a lowercase dotted name, got '{}'", scope);
        }

        if !UNITY_VERSION.is_match(&self.registry.unity_version) {
            anyhow::bail!(
                "registry.unity_version must look like 2019.1, got '{}'",
                self.registry.unity_version
            );
        }

        if self.target_frameworks.is_empty() {
            anyhow::bail!("at least one target framework is required");
        }
        for target in &self.target_frameworks {
            if target.framework.is_any() || target.framework.is_unsupported() {
                anyhow::bail!("target framework '{}' is not a .NET framework", target.framework);
            }
        }

        // Unversioned analyzers take the first version that satisfies them
        if self
            .analyzer_versions
            .windows(2)
            .any(|pair| pair[0].version >= pair[1].version)
        {
            anyhow::bail!("analyzer_versions must be listed in ascending version order");
        }

        if self.build.max_concurrent == 0 {
            anyhow::bail!("build.max_concurrent must be at least 1");
        }

        if let Some(filter) = &self.build.filter {
            Regex::new(filter).with_context(|| format!("Invalid build.filter regex: {}", filter))?;
        }

        Ok(())
    }

    /// Convert to the options the registry cache runs with
    pub fn to_cache_options(&self) -> Result<CacheOptions> {
        let filter = self
            .build
            .filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid build.filter regex")?;

        Ok(CacheOptions {
            scope: self.registry.scope.clone(),
            unity_version: self.registry.unity_version.clone(),
            name_suffix: self.registry.name_suffix.clone(),
            version_selection: self.registry.version_selection,
            target_frameworks: self.target_frameworks.clone(),
            analyzer_versions: self.analyzer_versions.clone(),
            max_concurrent: self.build.max_concurrent,
            filter,
        })
    }
}
