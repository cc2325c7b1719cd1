// src/cache/assemble.rs
//! Output layout of a target package
//!
//! Decides where every upstream item lands and which `.meta` it gets:
//!
//! ```text
//! lib/<tfm>/<file>                 managed assemblies, any platform
//! lib/<tfm>/<OS>/<CPU>/<file>      runtime overrides and their fallbacks
//! native/<OS>/<CPU>/<path>         native plugins, upstream subfolders kept
//! analyzers/...                    analyzers keep their upstream path
//! ```
//!
//! Planning is pure; the orchestrator reads the planned sources afterwards.

use crate::framework::{closest_framework_specific_groups, FrameworkSpecificGroup, TargetFramework};
use crate::hash::unity_guid;
use crate::meta::{extension_meta, extension_of, folder_meta, plugin_meta, PluginTarget};
use crate::platform::{
    native_libraries, native_relative_path, runtime_libraries, NodeId, PlatformFile, PlatformTree,
    RuntimeFile,
};
use crate::upstream::PackageIdentity;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// One output file before its content is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub destination: String,
    pub source: String,
    pub meta: String,
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_assembly(path: &str) -> bool {
    extension_of(path).eq_ignore_ascii_case(".dll")
}

/// Define constraints for a group chosen by `selected` of `all` targets
///
/// A group every target picked needs no fence; otherwise the constraints
/// of the targets that picked it, in target order.
fn group_constraints(selected: &[&TargetFramework], all: &[TargetFramework]) -> Vec<String> {
    if selected.len() == all.len() {
        return Vec::new();
    }
    let mut constraints: Vec<String> = Vec::new();
    for target in selected {
        for constraint in &target.define_constraints {
            if !constraints.contains(constraint) {
                constraints.push(constraint.clone());
            }
        }
    }
    constraints
}

fn platform_plugin(
    tree: &PlatformTree,
    identity: &PackageIdentity,
    destination: String,
    source: &str,
    node: NodeId,
    constraints: &[String],
) -> PlannedFile {
    let guid = unity_guid(identity, &destination);
    PlannedFile {
        meta: plugin_meta(&guid, PluginTarget::for_node(tree, node), &[], constraints),
        destination,
        source: source.to_string(),
    }
}

/// Runtime files bound to tree nodes; identifiers the tree lacks are dropped
fn bind_runtime_files(tree: &PlatformTree, files: Vec<RuntimeFile>) -> Vec<PlatformFile> {
    files
        .into_iter()
        .filter_map(|file| match tree.find(file.os, file.cpu) {
            Some(node) => Some(PlatformFile::new(file.path, node)),
            None => {
                debug!("No platform for {} ({:?} {:?})", file.path, file.os, file.cpu);
                None
            }
        })
        .collect()
}

/// Managed assemblies for the target frameworks, with runtime overrides
///
/// `items` is every item of the package. For each nearest `lib/<tfm>`
/// group, files with a runtime-specific replacement are placed once per
/// platform the replacements leave uncovered; the rest go to `lib/<tfm>/`
/// for every platform.
pub fn plan_managed(
    tree: &PlatformTree,
    identity: &PackageIdentity,
    items: &[String],
    targets: &[TargetFramework],
) -> Vec<PlannedFile> {
    let groups = FrameworkSpecificGroup::from_items(items, "lib");
    let closest = closest_framework_specific_groups(&groups, targets);

    // Group -> targets that picked it, in first-pick order
    let mut picks: Vec<(&FrameworkSpecificGroup, Vec<&TargetFramework>)> = Vec::new();
    for (group, target) in closest {
        match picks.iter_mut().find(|(g, _)| std::ptr::eq(*g, group)) {
            Some((_, selected)) => selected.push(target),
            None => picks.push((group, vec![target])),
        }
    }

    let mut planned = Vec::new();
    for (group, selected) in picks {
        let constraints = group_constraints(&selected, targets);
        let base = group.folder.clone();

        let overrides = bind_runtime_files(tree, runtime_libraries(items, &selected[0].framework));
        for file in &overrides {
            let name = file_name(&file.source);
            // A more specific override of the same file claims its own subtree
            let shadowed: HashSet<NodeId> = overrides
                .iter()
                .filter(|other| {
                    tree.is_ancestor(file.node, other.node)
                        && file_name(&other.source).eq_ignore_ascii_case(name)
                })
                .map(|other| other.node)
                .collect();

            for node in tree.remaining_below(file.node, &shadowed) {
                debug!("{}: {} placed on {}", identity, file.source, tree.describe(node));
                let placed = PlatformFile::new(file.source.clone(), node);
                planned.push(platform_plugin(
                    tree,
                    identity,
                    placed.destination(tree, &base),
                    &file.source,
                    node,
                    &constraints,
                ));
            }
        }

        for item in &group.items {
            let relative = item.strip_prefix(&format!("{}/", base)).unwrap_or(item);
            let name = file_name(item);

            let covered: HashSet<NodeId> = overrides
                .iter()
                .filter(|file| file_name(&file.source).eq_ignore_ascii_case(name))
                .map(|file| file.node)
                .collect();

            if !covered.is_empty() {
                for node in tree.remaining_platforms(&covered) {
                    let placed = PlatformFile::new(item.clone(), node);
                    planned.push(platform_plugin(
                        tree,
                        identity,
                        placed.destination(tree, &base),
                        item,
                        node,
                        &constraints,
                    ));
                }
                continue;
            }

            let destination = format!("{}/{}", base, relative);
            let guid = unity_guid(identity, &destination);
            let meta = if is_assembly(item) {
                Some(plugin_meta(
                    &guid,
                    PluginTarget::for_node(tree, tree.root()),
                    &[],
                    &constraints,
                ))
            } else {
                extension_meta(&guid, extension_of(item))
            };
            match meta {
                Some(meta) => planned.push(PlannedFile {
                    destination,
                    source: item.clone(),
                    meta,
                }),
                None => debug!("{}: no importer for {}, skipped", identity, item),
            }
        }
    }

    planned
}

/// Native plugins under `native/<OS>/<CPU>/`
///
/// Subfolders below `runtimes/<rid>/native/` are kept.
pub fn plan_native(tree: &PlatformTree, identity: &PackageIdentity, items: &[String]) -> Vec<PlannedFile> {
    bind_runtime_files(tree, native_libraries(items))
        .into_iter()
        .map(|file| {
            let relative = native_relative_path(&file.source).unwrap_or(&file.source);
            platform_plugin(
                tree,
                identity,
                file.destination_as(tree, "native", relative),
                &file.source,
                file.node,
                &[],
            )
        })
        .collect()
}

/// Analyzer files at their upstream paths with precomputed sidecars
pub fn plan_analyzers(selected: BTreeMap<String, String>) -> Vec<PlannedFile> {
    selected
        .into_iter()
        .map(|(path, meta)| PlannedFile {
            destination: path.clone(),
            source: path,
            meta,
        })
        .collect()
}

/// Sidecars for every folder containing an output file
pub fn folder_metas<'a>(
    identity: &PackageIdentity,
    paths: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, String> {
    let mut folders = BTreeMap::new();
    for path in paths {
        let mut end = 0;
        while let Some(slash) = path[end..].find('/') {
            end += slash;
            let folder = &path[..end];
            if !folders.contains_key(folder) {
                folders.insert(folder.to_string(), folder_meta(&unity_guid(identity, folder)));
            }
            end += 1;
        }
    }
    folders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Cpu, Os};
    use crate::version::NuGetVersion;

    fn identity() -> PackageIdentity {
        PackageIdentity::new("Test", NuGetVersion::parse("1.0.0").unwrap())
    }

    fn items(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    fn targets() -> Vec<TargetFramework> {
        vec![
            TargetFramework::new("netstandard2.0", &["!UNITY_2021_2_OR_NEWER"]),
            TargetFramework::new("netstandard2.1", &["UNITY_2021_2_OR_NEWER"]),
        ]
    }

    fn destinations(planned: &[PlannedFile]) -> Vec<&str> {
        planned.iter().map(|p| p.destination.as_str()).collect()
    }

    #[test]
    fn test_shared_group_has_no_constraints() {
        let tree = PlatformTree::create_all();
        let planned = plan_managed(
            &tree,
            &identity(),
            &items(&[
                "lib/netstandard2.0/Test.dll",
                "lib/netstandard2.0/Test.xml",
                "lib/netstandard2.0/Test.pdb",
                "lib/net461/Test.dll",
            ]),
            &targets(),
        );
        assert_eq!(
            destinations(&planned),
            vec!["lib/netstandard2.0/Test.dll", "lib/netstandard2.0/Test.xml"]
        );
        assert!(planned[0].meta.contains("  defineConstraints: []\n"));
        assert!(planned[1].meta.contains("TextScriptImporter:"));
    }

    #[test]
    fn test_split_groups_carry_target_constraints() {
        let tree = PlatformTree::create_all();
        let planned = plan_managed(
            &tree,
            &identity(),
            &items(&["lib/netstandard2.0/Test.dll", "lib/netstandard2.1/Test.dll"]),
            &targets(),
        );
        assert_eq!(
            destinations(&planned),
            vec!["lib/netstandard2.0/Test.dll", "lib/netstandard2.1/Test.dll"]
        );
        assert!(planned[0].meta.contains("  - !UNITY_2021_2_OR_NEWER\n"));
        assert!(planned[1].meta.contains("  - UNITY_2021_2_OR_NEWER\n"));
    }

    #[test]
    fn test_runtime_overrides_fill_remaining_platforms() {
        let tree = PlatformTree::create_all();
        let targets = vec![TargetFramework::new("netstandard2.0", &[])];
        let planned = plan_managed(
            &tree,
            &identity(),
            &items(&[
                "lib/netstandard2.0/System.Foo.dll",
                "runtimes/win/lib/netstandard2.0/System.Foo.dll",
            ]),
            &targets,
        );

        let win = tree.find(Os::Windows, None).unwrap();
        let expected_fallbacks = tree.remaining_platforms(&HashSet::from([win]));
        assert_eq!(planned.len(), 1 + expected_fallbacks.len());
        assert_eq!(planned[0].destination, "lib/netstandard2.0/Windows/System.Foo.dll");
        assert_eq!(planned[0].source, "runtimes/win/lib/netstandard2.0/System.Foo.dll");

        let fallbacks = destinations(&planned[1..]);
        assert!(fallbacks.contains(&"lib/netstandard2.0/Linux/System.Foo.dll"));
        assert!(fallbacks.contains(&"lib/netstandard2.0/OSX/System.Foo.dll"));
        assert!(!fallbacks.iter().any(|d| d.contains("Windows")));
        assert!(planned[1..].iter().all(|p| p.source == "lib/netstandard2.0/System.Foo.dll"));
    }

    #[test]
    fn test_nested_overrides_do_not_overlap() {
        let tree = PlatformTree::create_all();
        let targets = vec![TargetFramework::new("netstandard2.0", &[])];
        let planned = plan_managed(
            &tree,
            &identity(),
            &items(&[
                "lib/netstandard2.0/Over.dll",
                "runtimes/win/lib/netstandard2.0/Over.dll",
                "runtimes/win-x64/lib/netstandard2.0/Over.dll",
            ]),
            &targets,
        );

        let windows: Vec<(&str, &str)> = planned
            .iter()
            .filter(|p| p.destination.contains("/Windows/"))
            .map(|p| (p.destination.as_str(), p.source.as_str()))
            .collect();
        assert_eq!(
            windows,
            vec![
                ("lib/netstandard2.0/Windows/x86/Over.dll", "runtimes/win/lib/netstandard2.0/Over.dll"),
                ("lib/netstandard2.0/Windows/ARM64/Over.dll", "runtimes/win/lib/netstandard2.0/Over.dll"),
                ("lib/netstandard2.0/Windows/x86_64/Over.dll", "runtimes/win-x64/lib/netstandard2.0/Over.dll"),
            ]
        );
        assert!(!planned.iter().any(|p| p.destination == "lib/netstandard2.0/Windows/Over.dll"));

        let win64_copies = planned.iter().filter(|p| p.meta.contains("Standalone: Win64")).count();
        assert_eq!(win64_copies, 2);
        let x64_copies = planned
            .iter()
            .filter(|p| p.meta.contains("Standalone: Win64") && p.meta.contains("CPU: x86_64"))
            .count();
        assert_eq!(x64_copies, 1);
        assert!(planned.iter().any(|p| p.destination == "lib/netstandard2.0/Linux/Over.dll"));
    }

    #[test]
    fn test_native_subfolders_kept() {
        let tree = PlatformTree::create_all();
        let planned = plan_native(
            &tree,
            &identity(),
            &items(&["runtimes/win-x64/native/a/foo.dll", "runtimes/win-x64/native/b/foo.dll"]),
        );
        assert_eq!(
            destinations(&planned),
            vec!["native/Windows/x86_64/a/foo.dll", "native/Windows/x86_64/b/foo.dll"]
        );
        assert_ne!(planned[0].meta, planned[1].meta);
    }

    #[test]
    fn test_native_layout() {
        let tree = PlatformTree::create_all();
        let planned = plan_native(
            &tree,
            &identity(),
            &items(&[
                "runtimes/win-x64/native/foo.dll",
                "runtimes/osx/native/libfoo.dylib",
                "runtimes/linux-musl-x64/native/libfoo.so",
            ]),
        );
        assert_eq!(
            destinations(&planned),
            vec!["native/Windows/x86_64/foo.dll", "native/OSX/libfoo.dylib"]
        );
        assert!(planned[0].meta.contains("Standalone: Win64"));
        let win64 = tree.find(Os::Windows, Some(Cpu::X64)).unwrap();
        assert_eq!(tree.node(win64).cpu, Cpu::X64);
    }

    #[test]
    fn test_folder_metas() {
        let folders = folder_metas(
            &identity(),
            ["lib/netstandard2.0/a.dll", "lib/netstandard2.0/b.dll", "package.json"],
        );
        let names: Vec<&str> = folders.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["lib", "lib/netstandard2.0"]);
        assert!(folders["lib"].contains("folderAsset: yes"));
        assert_ne!(folders["lib"], folders["lib/netstandard2.0"]);
    }

    #[test]
    fn test_group_constraints() {
        let all = targets();
        assert!(group_constraints(&[&all[0], &all[1]], &all).is_empty());
        assert_eq!(group_constraints(&[&all[1]], &all), vec!["UNITY_2021_2_OR_NEWER"]);
    }
}
