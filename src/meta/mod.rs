// src/meta/mod.rs

//! Unity `.meta` sidecar text
//!
//! Every file and folder in a Unity package carries a `.meta` file with its
//! guid and importer settings. Unity rewrites these files when their layout
//! differs from what it would have written itself, which dirties consumer
//! projects, so the text produced here is fixed down to the byte: two-space
//! indentation, `\n` line endings, dash lists for `labels:` and
//! `defineConstraints:`.

use crate::platform::{Cpu, NodeId, Os, PlatformTree};

/// Label Unity uses to load a plugin into the C# compiler
pub const ROSLYN_ANALYZER_LABEL: &str = "RoslynAnalyzer";

/// Which platforms a plugin is enabled for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginTarget {
    pub os: Os,
    /// `None` disables the plugin on every platform
    pub cpu: Option<Cpu>,
    pub editor: bool,
}

impl PluginTarget {
    /// Settings for a node of the platform tree
    pub fn for_node(tree: &PlatformTree, id: NodeId) -> Self {
        let node = tree.node(id);
        Self {
            os: node.os,
            cpu: Some(node.cpu),
            editor: node.editor,
        }
    }

    /// Not loaded by any player or by the editor (compiler plugins)
    pub fn none() -> Self {
        Self {
            os: Os::AnyOs,
            cpu: None,
            editor: false,
        }
    }

    fn is_everywhere(&self) -> bool {
        self.os == Os::AnyOs && self.cpu == Some(Cpu::AnyCpu)
    }
}

/// Player build targets per OS: (group, target, CPUs it runs)
fn build_targets(os: Os) -> &'static [(&'static str, &'static str, &'static [Cpu])] {
    match os {
        Os::AnyOs => &[],
        Os::Windows => &[
            ("Standalone", "Win64", &[Cpu::X64, Cpu::Arm64]),
            ("Standalone", "Win", &[Cpu::X86]),
        ],
        Os::Linux => &[("Standalone", "Linux64", &[Cpu::X64])],
        Os::MacOs => &[("Standalone", "OSXUniversal", &[Cpu::X64, Cpu::Arm64])],
        Os::Android => &[("Android", "Android", &[Cpu::ArmV7, Cpu::Arm64])],
        Os::Ios => &[("iPhone", "iOS", &[Cpu::Arm64])],
        Os::WebGl => &[("WebGL", "WebGL", &[])],
    }
}

fn editor_os(os: Os) -> &'static str {
    match os {
        Os::Windows => "Windows",
        Os::Linux => "Linux",
        Os::MacOs => "OSX",
        _ => "AnyOS",
    }
}

fn header(guid: &str) -> String {
    format!("fileFormatVersion: 2\nguid: {}\n", guid)
}

fn asset_footer() -> &'static str {
    "  userData: \n  assetBundleName: \n  assetBundleVariant: \n"
}

fn dash_list(out: &mut String, indent: &str, values: &[String]) {
    for value in values {
        out.push_str(indent);
        out.push_str("- ");
        out.push_str(value);
        out.push('\n');
    }
}

fn platform_entry(out: &mut String, key: &str, value: &str, enabled: bool, settings: &[(&str, String)]) {
    out.push_str(&format!("  - first:\n      {}: {}\n", key, value));
    out.push_str(&format!("    second:\n      enabled: {}\n", u8::from(enabled)));
    if settings.is_empty() {
        out.push_str("      settings: {}\n");
    } else {
        out.push_str("      settings:\n");
        for (name, setting) in settings {
            out.push_str(&format!("        {}: {}\n", name, setting));
        }
    }
}

/// Plugin importer metadata for assemblies and native binaries
pub fn plugin_meta(
    guid: &str,
    target: PluginTarget,
    labels: &[String],
    define_constraints: &[String],
) -> String {
    let mut out = header(guid);
    if !labels.is_empty() {
        out.push_str("labels:\n");
        dash_list(&mut out, "", labels);
    }

    out.push_str("PluginImporter:\n");
    out.push_str("  externalObjects: {}\n");
    out.push_str("  serializedVersion: 2\n");
    out.push_str("  iconMap: {}\n");
    out.push_str("  executionOrder: {}\n");
    if define_constraints.is_empty() {
        out.push_str("  defineConstraints: []\n");
    } else {
        out.push_str("  defineConstraints:\n");
        dash_list(&mut out, "  ", define_constraints);
    }
    out.push_str("  isPreloaded: 0\n");
    out.push_str("  isOverridable: 0\n");
    out.push_str("  isExplicitlyReferenced: 0\n");
    out.push_str("  validateReferences: 1\n");
    out.push_str("  platformData:\n");

    let cpu_name = target.cpu.unwrap_or(Cpu::AnyCpu).to_string();
    platform_entry(&mut out, "Any", "", target.is_everywhere(), &[]);
    platform_entry(
        &mut out,
        "Editor",
        "Editor",
        target.editor,
        &[
            ("CPU", cpu_name.clone()),
            ("DefaultValueInitialized", "true".to_string()),
            ("OS", editor_os(target.os).to_string()),
        ],
    );

    if let Some(cpu) = target.cpu.filter(|_| !target.is_everywhere()) {
        for (group, name, cpus) in build_targets(target.os) {
            if cpu != Cpu::AnyCpu && !cpus.contains(&cpu) {
                continue;
            }
            platform_entry(&mut out, group, name, true, &[("CPU", cpu_name.clone())]);
        }
    }

    out.push_str(asset_footer());
    out
}

/// Metadata for text assets (docs, sources, json)
pub fn text_meta(guid: &str) -> String {
    let mut out = header(guid);
    out.push_str("TextScriptImporter:\n  externalObjects: {}\n");
    out.push_str(asset_footer());
    out
}

/// Metadata for the package manifest (`package.json`)
pub fn package_manifest_meta(guid: &str) -> String {
    let mut out = header(guid);
    out.push_str("PackageManifestImporter:\n  externalObjects: {}\n");
    out.push_str(asset_footer());
    out
}

/// Metadata for a folder
pub fn folder_meta(guid: &str) -> String {
    let mut out = header(guid);
    out.push_str("folderAsset: yes\nDefaultImporter:\n  externalObjects: {}\n");
    out.push_str(asset_footer());
    out
}

/// Metadata chosen by file extension, `None` for files Unity should not see
///
/// Extensions are compared case-insensitively and include the dot.
pub fn extension_meta(guid: &str, extension: &str) -> Option<String> {
    match extension.to_ascii_lowercase().as_str() {
        ".asmdef" | ".cs" | ".json" | ".md" | ".txt" | ".xml" => Some(text_meta(guid)),
        _ => None,
    }
}

/// Extension of the last path segment, including the dot
pub fn extension_of(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').map_or("", |i| &name[i..])
}
