// src/registry/mod.rs
//! Mirror manifest
//!
//! The manifest is a JSON object keyed by upstream package id:
//!
//! ```json
//! {
//!   "Scriban": { "listed": true, "version": "2.1.0" },
//!   "Meziantou.Analyzer": { "analyzer": true, "version": "2.0.0" },
//!   "System.Memory": { "ignore": true }
//! }
//! ```
//!
//! Declaration order is kept: it is the order entries are built and listed
//! in. Names are case-insensitive, so `Scriban` and `scriban` in the same
//! file make the manifest invalid. The registry is built once and never
//! mutated; a new manifest means a new [`Registry`].

use crate::error::{Error, Result};
use crate::framework::{is_net_standard_assembly, TargetFramework};
use crate::version::VersionRange;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One upstream package the mirror should publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    /// Acceptable upstream versions
    pub version: VersionRange,
    /// Compiler-plugin package: resolved by policy without the framework check
    pub analyzer: bool,
    /// Known to the registry but never built; dependencies on it are dropped
    pub ignored: bool,
    pub include_prerelease: bool,
    pub include_unlisted: bool,
    /// Replaces the configured target frameworks for this entry
    pub target_frameworks: Option<Vec<TargetFramework>>,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>, version: VersionRange) -> Self {
        Self {
            name: name.into(),
            version,
            analyzer: false,
            ignored: false,
            include_prerelease: false,
            include_unlisted: false,
            target_frameworks: None,
        }
    }

    pub fn analyzer(mut self) -> Self {
        self.analyzer = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Fields of one manifest value
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EntryFields {
    #[serde(default)]
    version: VersionRange,
    #[serde(default)]
    analyzer: bool,
    #[serde(default)]
    ignore: bool,
    #[serde(default)]
    include_prerelease: bool,
    #[serde(default)]
    include_unlisted: bool,
    /// Informational, kept for manifests copied from upstream tooling
    #[serde(default)]
    #[allow(dead_code)]
    listed: bool,
    #[serde(default)]
    target_frameworks: Option<Vec<TargetFramework>>,
}

/// Manifest object read key by key, duplicates included
struct ManifestEntries(Vec<(String, EntryFields)>);

impl<'de> Deserialize<'de> for ManifestEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ManifestEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping package ids to entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, fields)) = map.next_entry::<String, EntryFields>()? {
                    entries.push((name, fields));
                }
                Ok(ManifestEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Ordered, case-insensitive set of manifest entries
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build from entries in manifest order
    ///
    /// Fails on duplicate names and on entries for assemblies netstandard
    /// already provides.
    pub fn from_entries(entries: Vec<RegistryEntry>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(Error::InvalidManifest("empty package name".to_string()));
            }
            if is_net_standard_assembly(&entry.name) {
                return Err(Error::InvalidManifest(format!(
                    "{} is part of netstandard2.0 and cannot be mirrored",
                    entry.name
                )));
            }
            if index.insert(entry.name.to_lowercase(), position).is_some() {
                return Err(Error::InvalidManifest(format!(
                    "duplicate entry {}",
                    entry.name
                )));
            }
        }
        Ok(Self { entries, index })
    }

    /// Parse the JSON manifest format
    pub fn from_json(text: &str) -> Result<Self> {
        let ManifestEntries(raw) = serde_json::from_str(text)
            .map_err(|e| Error::InvalidManifest(e.to_string()))?;

        let entries = raw
            .into_iter()
            .map(|(name, fields)| RegistryEntry {
                name,
                version: fields.version,
                analyzer: fields.analyzer,
                ignored: fields.ignore,
                include_prerelease: fields.include_prerelease,
                include_unlisted: fields.include_unlisted,
                target_frameworks: fields.target_frameworks,
            })
            .collect();

        Self::from_entries(entries)
    }

    /// Read a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&text)?;
        debug!("Loaded {} manifest entries from {}", registry.len(), path.display());
        Ok(registry)
    }

    /// Entry by name, ignoring case
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.index
            .get(&name.to_lowercase())
            .map(|&position| &self.entries[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Entries in manifest order
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Framework;
    use crate::version::NuGetVersion;

    const MANIFEST: &str = r#"{
        "Scriban": { "listed": true, "version": "2.1.0" },
        "Meziantou.Analyzer": { "analyzer": true, "version": "[2.0.0, )" },
        "Newtonsoft.Json": { "ignore": true },
        "NUnit": {
            "version": "3.13.0",
            "includePrerelease": true,
            "targetFrameworks": [ { "name": "netstandard2.0" } ]
        }
    }"#;

    #[test]
    fn test_from_json_keeps_order() {
        let registry = Registry::from_json(MANIFEST).unwrap();
        let names: Vec<&str> = registry.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Scriban", "Meziantou.Analyzer", "Newtonsoft.Json", "NUnit"]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = Registry::from_json(MANIFEST).unwrap();
        for name in ["scriban", "Scriban", "SCRIBAN"] {
            let entry = registry.get(name).unwrap();
            assert_eq!(entry.name, "Scriban");
            assert!(entry.version.satisfies(&NuGetVersion::parse("2.1.0").unwrap()));
            assert!(!entry.version.satisfies(&NuGetVersion::parse("2.0.9").unwrap()));
        }
        assert!(registry.contains("meziantou.analyzer"));
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn test_entry_flags() {
        let registry = Registry::from_json(MANIFEST).unwrap();
        assert!(registry.get("Meziantou.Analyzer").unwrap().analyzer);
        assert!(registry.get("Newtonsoft.Json").unwrap().ignored);
        let nunit = registry.get("nunit").unwrap();
        assert!(nunit.include_prerelease);
        assert!(!nunit.include_unlisted);
        let targets = nunit.target_frameworks.as_ref().unwrap();
        assert_eq!(targets[0].framework, Framework::net_standard(2, 0));
    }

    #[test]
    fn test_missing_version_accepts_all() {
        let registry = Registry::from_json(MANIFEST).unwrap();
        let entry = registry.get("Newtonsoft.Json").unwrap();
        assert_eq!(entry.version, VersionRange::all());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Registry::from_json(r#"{ "Scriban": {}, "scriban": {} }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));

        let err = Registry::from_json(r#"{ "Scriban": {}, "Scriban": {} }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));
    }

    #[test]
    fn test_invalid_manifests() {
        assert!(Registry::from_json("[]").is_err());
        assert!(Registry::from_json(r#"{ "Scriban": { "version": "[2.0" } }"#).is_err());
        assert!(Registry::from_json(r#"{ "Scriban": { "unknown": 1 } }"#).is_err());
        assert!(Registry::from_json(r#"{ "System.Runtime": {} }"#).is_err());
    }

    #[test]
    fn test_load_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(&path, MANIFEST).unwrap();
        assert_eq!(Registry::load(&path).unwrap().len(), 4);
        assert!(matches!(
            Registry::load(&temp.path().join("missing.json")),
            Err(Error::IoError(_))
        ));
    }

    #[test]
    fn test_from_entries() {
        let registry = Registry::from_entries(vec![
            RegistryEntry::new("B", VersionRange::all()),
            RegistryEntry::new("A", VersionRange::all()).analyzer(),
        ])
        .unwrap();
        assert_eq!(registry.entries()[0].name, "B");
        assert!(registry.get("a").unwrap().analyzer);
    }
}
