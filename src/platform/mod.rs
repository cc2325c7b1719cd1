// src/platform/mod.rs

//! Unity platform model
//!
//! Platforms form a fixed three-level tree: the root is "any OS, any CPU",
//! its children are one node per operating system (any CPU), and each OS
//! node holds one leaf per supported CPU. The tree is an arena addressed by
//! [`NodeId`]; it is built once and never mutated, so lookups hand out plain
//! copies of the handle.
//!
//! The tree answers two questions for binary placement:
//! - where does a file targeting a node live (`PlatformFile::destination`)
//! - which nodes are still uncovered once some nodes received specific
//!   binaries (`PlatformTree::remaining_platforms`)

pub mod runtime;

use std::collections::HashSet;
use strum_macros::{Display, EnumIter, EnumString};

pub use runtime::{
    native_libraries, native_relative_path, platform_for_rid, runtime_libraries, RuntimeFile,
};

/// Operating systems Unity can build for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Os {
    #[strum(to_string = "AnyOS")]
    AnyOs,
    Windows,
    Linux,
    #[strum(to_string = "OSX")]
    MacOs,
    Android,
    #[strum(to_string = "iOS")]
    Ios,
    #[strum(to_string = "WebGL")]
    WebGl,
}

/// CPU architectures, named the way Unity names its plugin folders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Cpu {
    #[strum(to_string = "AnyCPU")]
    AnyCpu,
    #[strum(to_string = "x86_64")]
    X64,
    #[strum(to_string = "x86")]
    X86,
    #[strum(to_string = "ARM64")]
    Arm64,
    #[strum(to_string = "ARMv7")]
    ArmV7,
}

/// Fixed platform table: OS, editor can load it, CPU leaves with their editor flag
const PLATFORM_TABLE: &[(Os, bool, &[(Cpu, bool)])] = &[
    (
        Os::Windows,
        true,
        &[(Cpu::X64, true), (Cpu::X86, false), (Cpu::Arm64, false)],
    ),
    (Os::Linux, true, &[(Cpu::X64, true)]),
    (Os::MacOs, true, &[(Cpu::X64, true), (Cpu::Arm64, true)]),
    (Os::Android, false, &[(Cpu::ArmV7, false), (Cpu::Arm64, false)]),
    (Os::Ios, false, &[(Cpu::Arm64, false)]),
    (Os::WebGl, false, &[]),
];

/// Handle of a node inside a [`PlatformTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One platform in the tree
#[derive(Debug, Clone)]
pub struct PlatformNode {
    pub os: Os,
    pub cpu: Cpu,
    /// The Unity editor itself loads binaries placed on this node
    pub editor: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl PlatformNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// The complete platform hierarchy
#[derive(Debug, Clone)]
pub struct PlatformTree {
    nodes: Vec<PlatformNode>,
}

impl PlatformTree {
    /// Build the full tree
    ///
    /// Pure: every call yields the same tree with the same node handles.
    pub fn create_all() -> Self {
        let mut tree = Self {
            nodes: vec![PlatformNode {
                os: Os::AnyOs,
                cpu: Cpu::AnyCpu,
                editor: true,
                parent: None,
                children: Vec::new(),
            }],
        };

        let root = tree.root();
        for &(os, editor, cpus) in PLATFORM_TABLE {
            let os_node = tree.add(root, os, Cpu::AnyCpu, editor);
            for &(cpu, cpu_editor) in cpus {
                tree.add(os_node, os, cpu, cpu_editor);
            }
        }

        tree
    }

    fn add(&mut self, parent: NodeId, os: Os, cpu: Cpu, editor: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PlatformNode {
            os,
            cpu,
            editor,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &PlatformNode {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Find the node for an OS and, optionally, a CPU
    ///
    /// Omitting the CPU (or asking for any CPU) yields the OS node itself.
    /// Combinations missing from the tree return `None`.
    pub fn find(&self, os: Os, cpu: Option<Cpu>) -> Option<NodeId> {
        let cpu = cpu.unwrap_or(Cpu::AnyCpu);
        let root = self.root();
        if os == Os::AnyOs {
            return (cpu == Cpu::AnyCpu).then_some(root);
        }

        let os_node = self
            .children(root)
            .iter()
            .copied()
            .find(|&id| self.node(id).os == os)?;
        if cpu == Cpu::AnyCpu {
            return Some(os_node);
        }

        self.children(os_node)
            .iter()
            .copied()
            .find(|&id| self.node(id).cpu == cpu)
    }

    /// Nodes covering every platform not already covered by `visited`
    ///
    /// The result never overlaps a visited node, its ancestors or its
    /// descendants, and together with `visited` covers each leaf exactly
    /// once. Nothing visited yields the root alone.
    pub fn remaining_platforms(&self, visited: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut remaining = Vec::new();
        self.collect_remaining(self.root(), visited, &mut remaining);
        remaining
    }

    /// Nodes covering every platform below `id` not covered by `visited`
    ///
    /// Like [`remaining_platforms`](Self::remaining_platforms), restricted
    /// to the subtree rooted at `id`.
    pub fn remaining_below(&self, id: NodeId, visited: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut remaining = Vec::new();
        self.collect_remaining(id, visited, &mut remaining);
        remaining
    }

    /// Is `ancestor` a strict ancestor of `id`?
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    fn collect_remaining(&self, id: NodeId, visited: &HashSet<NodeId>, out: &mut Vec<NodeId>) {
        if visited.contains(&id) {
            return;
        }
        if !self.has_visited_descendants(id, visited) {
            out.push(id);
            return;
        }
        for &child in self.children(id) {
            self.collect_remaining(child, visited, out);
        }
    }

    fn has_visited_descendants(&self, id: NodeId, visited: &HashSet<NodeId>) -> bool {
        self.children(id)
            .iter()
            .any(|child| visited.contains(child) || self.has_visited_descendants(*child, visited))
    }

    /// Path segments for a node: none for the root, `OS` or `OS/CPU` otherwise
    pub fn path_segments(&self, id: NodeId) -> Vec<String> {
        let node = self.node(id);
        let mut segments = Vec::new();
        if node.os != Os::AnyOs {
            segments.push(node.os.to_string());
        }
        if node.cpu != Cpu::AnyCpu {
            segments.push(node.cpu.to_string());
        }
        segments
    }

    /// Human-readable node label for logs
    pub fn describe(&self, id: NodeId) -> String {
        let segments = self.path_segments(id);
        if segments.is_empty() {
            "any".to_string()
        } else {
            segments.join("/")
        }
    }
}

/// A source file bound to the platform it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFile {
    pub source: String,
    pub node: NodeId,
}

impl PlatformFile {
    pub fn new(source: impl Into<String>, node: NodeId) -> Self {
        Self {
            source: source.into(),
            node,
        }
    }

    /// `base/OS/CPU/file`, leaving out segments the node does not pin down
    pub fn destination(&self, tree: &PlatformTree, base: &str) -> String {
        let file_name = self.source.rsplit('/').next().unwrap_or(&self.source);
        self.destination_as(tree, base, file_name)
    }

    /// `base/OS/CPU/relative`, for files that keep their upstream subfolders
    pub fn destination_as(&self, tree: &PlatformTree, base: &str, relative: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !base.is_empty() {
            parts.push(base.trim_end_matches('/').to_string());
        }
        parts.extend(tree.path_segments(self.node));
        parts.push(relative.trim_start_matches('/').to_string());
        parts.join("/")
    }
}
