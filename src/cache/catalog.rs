// src/cache/catalog.rs
//! In-memory package catalog
//!
//! Read side of the registry: many concurrent readers, one writer (the
//! build). Descriptors are swapped whole, so a reader sees either the old or
//! the new package, never a mix.

use super::package::{PackageDocument, PackageSummary, TargetPackage};
use dashmap::DashMap;
use std::sync::Arc;

/// Latest descriptor per target package name
#[derive(Debug, Default)]
pub struct Catalog {
    /// Target package names in manifest order
    order: Vec<String>,
    packages: DashMap<String, Arc<TargetPackage>>,
}

impl Catalog {
    /// Empty catalog listing packages in the given order
    pub fn new(order: Vec<String>) -> Self {
        Self {
            order: order.into_iter().map(|name| name.to_lowercase()).collect(),
            packages: DashMap::new(),
        }
    }

    /// Install or replace a descriptor
    pub fn publish(&self, package: Arc<TargetPackage>) {
        self.packages.insert(package.name().to_lowercase(), package);
    }

    pub fn get(&self, name: &str) -> Option<Arc<TargetPackage>> {
        self.packages
            .get(&name.to_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn document(&self, name: &str) -> Option<PackageDocument> {
        self.get(name).map(|package| package.document())
    }

    /// Summaries of every published package, manifest order first
    ///
    /// Names published without being part of the order come last, sorted.
    pub fn list(&self) -> Vec<PackageSummary> {
        let mut summaries: Vec<PackageSummary> = self
            .order
            .iter()
            .filter_map(|name| self.packages.get(name).map(|p| p.summary()))
            .collect();

        let mut extra: Vec<PackageSummary> = self
            .packages
            .iter()
            .filter(|entry| !self.order.contains(entry.key()))
            .map(|entry| entry.value().summary())
            .collect();
        extra.sort_by(|a, b| a.name.cmp(&b.name));
        summaries.extend(extra);

        summaries
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
