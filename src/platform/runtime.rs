// src/platform/runtime.rs

//! Runtime-specific package content
//!
//! Upstream packages ship platform-specific binaries under
//! `runtimes/<rid>/lib/<tfm>/` (managed overrides) and
//! `runtimes/<rid>/native/` (native plugins). The runtime identifier is
//! mapped onto the platform model; identifiers outside the table are not an
//! error, their files are simply left out.

use super::{Cpu, Os};
use crate::framework::{get_nearest, Framework, FrameworkSpecificGroup};

const RUNTIMES_FOLDER: &str = "runtimes";

/// Runtime identifier to (OS, CPU); `None` CPU means every CPU of the OS
const RUNTIME_IDENTIFIERS: &[(&str, Os, Option<Cpu>)] = &[
    ("win", Os::Windows, None),
    ("win-x64", Os::Windows, Some(Cpu::X64)),
    ("win-x86", Os::Windows, Some(Cpu::X86)),
    ("win-arm64", Os::Windows, Some(Cpu::Arm64)),
    ("linux", Os::Linux, None),
    ("linux-x64", Os::Linux, Some(Cpu::X64)),
    ("osx", Os::MacOs, None),
    ("osx-x64", Os::MacOs, Some(Cpu::X64)),
    ("osx-arm64", Os::MacOs, Some(Cpu::Arm64)),
    ("android", Os::Android, None),
    ("android-arm", Os::Android, Some(Cpu::ArmV7)),
    ("android-arm64", Os::Android, Some(Cpu::Arm64)),
    ("ios", Os::Ios, None),
    ("ios-arm64", Os::Ios, Some(Cpu::Arm64)),
    ("browser-wasm", Os::WebGl, None),
];

/// Platform of a runtime identifier, `None` when Unity has no matching platform
pub fn platform_for_rid(rid: &str) -> Option<(Os, Option<Cpu>)> {
    RUNTIME_IDENTIFIERS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(rid))
        .map(|&(_, os, cpu)| (os, cpu))
}

/// A runtime-specific file and the platform it serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFile {
    pub path: String,
    pub os: Os,
    pub cpu: Option<Cpu>,
}

/// Split `runtimes/<rid>/<kind>/<rest>` into (rid, rest)
fn split_runtime_path<'a>(path: &'a str, kind: &str) -> Option<(&'a str, &'a str)> {
    let mut parts = path.splitn(4, '/');
    let root = parts.next()?;
    let rid = parts.next()?;
    let folder = parts.next()?;
    let rest = parts.next()?;
    (root.eq_ignore_ascii_case(RUNTIMES_FOLDER) && folder.eq_ignore_ascii_case(kind) && !rest.is_empty())
        .then_some((rid, rest))
}

/// Path of a native plugin below `runtimes/<rid>/native/`
pub fn native_relative_path(path: &str) -> Option<&str> {
    split_runtime_path(path, "native").map(|(_, rest)| rest)
}

/// Managed runtime overrides for one target framework
///
/// Per runtime identifier, only the `lib/<tfm>` folder nearest to `target`
/// contributes. Output follows item order.
pub fn runtime_libraries(items: &[String], target: &Framework) -> Vec<RuntimeFile> {
    let mut rids: Vec<&str> = Vec::new();
    for item in items {
        if let Some((rid, _)) = split_runtime_path(item, "lib") {
            if !rids.iter().any(|r| r.eq_ignore_ascii_case(rid)) {
                rids.push(rid);
            }
        }
    }

    let mut files = Vec::new();
    for rid in rids {
        let Some((os, cpu)) = platform_for_rid(rid) else {
            continue;
        };
        let groups = FrameworkSpecificGroup::from_items(items, &format!("{}/{}/lib", RUNTIMES_FOLDER, rid));
        let Some(group) = get_nearest(&groups, target, |g| &g.framework) else {
            continue;
        };
        files.extend(group.items.iter().map(|path| RuntimeFile {
            path: path.clone(),
            os,
            cpu,
        }));
    }
    files
}

/// Native plugins under `runtimes/<rid>/native/`
pub fn native_libraries(items: &[String]) -> Vec<RuntimeFile> {
    items
        .iter()
        .filter_map(|item| {
            let (rid, _) = split_runtime_path(item, "native")?;
            let (os, cpu) = platform_for_rid(rid)?;
            Some(RuntimeFile {
                path: item.clone(),
                os,
                cpu,
            })
        })
        .collect()
}
