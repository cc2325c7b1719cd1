// src/framework/mod.rs

//! Framework compatibility resolution
//!
//! Decides which upstream dependency groups and `lib/<tfm>` folders serve the
//! configured Unity target frameworks, and which upstream version is the
//! first one usable at all. Everything here is pure computation over
//! already-fetched metadata.

mod moniker;
mod provided;

pub use moniker::{get_nearest, Framework, FrameworkFamily, FrameworkVersion};
pub use provided::is_net_standard_assembly;

use crate::upstream::{DependencyGroup, PackageIdentity, PackageMetadata};
use serde::{Deserialize, Serialize};

/// A framework Unity compiles against, with the defines that select it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFramework {
    #[serde(rename = "name")]
    pub framework: Framework,
    #[serde(default)]
    pub define_constraints: Vec<String>,
}

impl TargetFramework {
    pub fn new(moniker: &str, define_constraints: &[&str]) -> Self {
        Self {
            framework: Framework::parse(moniker),
            define_constraints: define_constraints.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Package items grouped by their framework folder (`lib/netstandard2.0/...`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkSpecificGroup {
    pub framework: Framework,
    /// Folder the items came from, relative to the package root
    pub folder: String,
    pub items: Vec<String>,
}

impl FrameworkSpecificGroup {
    /// Group items found under `prefix` (`lib`, `ref`, ...) by framework folder
    ///
    /// Files directly under the prefix belong to the universal framework.
    /// Group order follows first appearance in `items`.
    pub fn from_items(items: &[String], prefix: &str) -> Vec<Self> {
        let mut groups: Vec<Self> = Vec::new();
        let lead = format!("{}/", prefix.trim_end_matches('/'));

        for item in items {
            let Some(rest) = item.strip_prefix(&lead) else {
                continue;
            };
            let (folder, framework) = match rest.split_once('/') {
                Some((tfm, _)) => (format!("{}{}", lead, tfm), Framework::parse(tfm)),
                None => (lead.trim_end_matches('/').to_string(), Framework::Any),
            };

            match groups.iter_mut().find(|g| g.folder == folder) {
                Some(group) => group.items.push(item.clone()),
                None => groups.push(Self {
                    framework,
                    folder,
                    items: vec![item.clone()],
                }),
            }
        }

        groups
    }
}

/// Dependency groups relevant to the target frameworks
///
/// Universal groups always apply. Any other group applies when it is the
/// nearest compatible group for at least one target. Original group order
/// is kept and each group appears once.
pub fn compatible_dependency_groups<'a>(
    groups: &'a [DependencyGroup],
    targets: &[TargetFramework],
) -> Vec<&'a DependencyGroup> {
    if targets.is_empty() {
        return Vec::new();
    }

    let nearest: Vec<&DependencyGroup> = targets
        .iter()
        .filter_map(|target| get_nearest(groups, &target.framework, |g| &g.target_framework))
        .collect();

    groups
        .iter()
        .filter(|group| {
            group.target_framework.is_any() || nearest.iter().any(|n| std::ptr::eq(*n, *group))
        })
        .collect()
}

/// Nearest file group per target framework
///
/// Targets without any compatible group are left out.
pub fn closest_framework_specific_groups<'a, 'b>(
    groups: &'a [FrameworkSpecificGroup],
    targets: &'b [TargetFramework],
) -> Vec<(&'a FrameworkSpecificGroup, &'b TargetFramework)> {
    targets
        .iter()
        .filter_map(|target| {
            get_nearest(groups, &target.framework, |g| &g.framework).map(|group| (group, target))
        })
        .collect()
}

/// Does this version declare something usable by every target?
pub fn is_compatible_version(
    metadata: &PackageMetadata,
    targets: &[TargetFramework],
    include_any: bool,
) -> bool {
    targets.iter().all(|target| {
        metadata.dependency_groups.iter().any(|group| {
            if group.target_framework.is_any() {
                include_any
            } else {
                target.framework.is_compatible_with(&group.target_framework)
            }
        })
    })
}

/// Lowest candidate version that every target can consume
///
/// `None` means no version has managed content for the targets; callers
/// fall back to native-only handling instead of failing outright.
pub fn minimum_compatible_package_identity<'a>(
    candidates: &'a [PackageMetadata],
    targets: &[TargetFramework],
    include_any: bool,
) -> Option<&'a PackageIdentity> {
    let mut ordered: Vec<&PackageMetadata> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.identity.version.cmp(&b.identity.version));

    ordered
        .into_iter()
        .find(|metadata| is_compatible_version(metadata, targets, include_any))
        .map(|metadata| &metadata.identity)
}
