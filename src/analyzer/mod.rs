// src/analyzer/mod.rs
//! Roslyn analyzer selection
//!
//! Analyzer packages ship compiler plugins under `analyzers/`, either in
//! folders named after the Roslyn version they were built against
//! (`analyzers/dotnet/roslyn4.3/cs/...`) or unversioned. Unity loads every
//! DLL labelled `RoslynAnalyzer`, so each shipped file is paired with define
//! constraints that restrict it to the Unity versions whose compiler can load
//! it.
//!
//! Selection runs ordered strategies over the same file list; the first
//! strategy to claim a path decides its constraints:
//!
//! 1. **Versioned folders**: pick, per configured compiler version, the
//!    highest `roslynX.Y` folder it can load
//! 2. **Unversioned fallback**: inspect each remaining DLL for the
//!    `Microsoft.CodeAnalysis` version it references

pub mod metadata;

use crate::hash::unity_guid;
use crate::meta::{extension_meta, extension_of, plugin_meta, PluginTarget, ROSLYN_ANALYZER_LABEL};
use crate::upstream::{under_prefix, PackageIdentity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

pub use metadata::{assembly_references, referenced_version, AssemblyReference, MetadataError, MetadataResult};

/// Assembly every analyzer references when built against Roslyn
pub const CODE_ANALYSIS_ASSEMBLY: &str = "Microsoft.CodeAnalysis";

const ANALYZERS_FOLDER: &str = "analyzers";

static ROSLYN_FOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)analyzers/dotnet/roslyn(?P<major>\d+)\.(?P<minor>\d+)(\.\d+)?/?").unwrap()
});

/// Four-part compiler (assembly) version
///
/// Parsed from `4.3` or `4.3.0.0`; missing parts are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompilerVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl CompilerVersion {
    pub fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl FromStr for CompilerVersion {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        let invalid = || crate::error::Error::ParseError(format!("invalid compiler version: {:?}", s));
        let parts: Vec<u32> = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| invalid())?;
        if !(2..=4).contains(&parts.len()) {
            return Err(invalid());
        }
        let part = |i: usize| parts.get(i).copied().unwrap_or(0);
        Ok(Self::new(part(0), part(1), part(2), part(3)))
    }
}

impl fmt::Display for CompilerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.build > 0 || self.revision > 0 {
            write!(f, ".{}", self.build)?;
        }
        if self.revision > 0 {
            write!(f, ".{}", self.revision)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for CompilerVersion {
    type Error = crate::error::Error;

    fn try_from(s: String) -> crate::error::Result<Self> {
        s.parse()
    }
}

impl From<CompilerVersion> for String {
    fn from(v: CompilerVersion) -> Self {
        v.to_string()
    }
}

/// A compiler version some Unity release ships, with its define constraints
///
/// `single_define_constraints` applies when one build of the analyzer serves
/// every configured compiler; `define_constraints` when the package ships a
/// separate build per compiler and each must be fenced off from the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerVersion {
    pub version: CompilerVersion,
    #[serde(default)]
    pub single_define_constraints: Vec<String>,
    #[serde(default)]
    pub define_constraints: Vec<String>,
}

impl AnalyzerVersion {
    pub fn new(version: CompilerVersion, single: &[&str], multi: &[&str]) -> Self {
        Self {
            version,
            single_define_constraints: single.iter().map(|s| s.to_string()).collect(),
            define_constraints: multi.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Satellite resource assembly of a C# analyzer
pub fn is_applicable_analyzer_resource(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with(ANALYZERS_FOLDER) && lower.ends_with(".resources.dll") && !lower.contains("/vb/")
}

/// Analyzer assembly Unity's C# compiler can load
pub fn is_applicable_analyzer(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with(ANALYZERS_FOLDER)
        && lower.ends_with(".dll")
        && !lower.ends_with(".resources.dll")
        && (lower.contains("/cs/") || !lower.contains("/vb/"))
}

/// Does the path live in a `roslynX.Y` folder?
pub fn is_versioned(path: &str) -> bool {
    ROSLYN_FOLDER.is_match(path)
}

/// Inputs shared by the selection strategies
pub struct SelectionContext<'a> {
    pub identity: &'a PackageIdentity,
    /// Compiler versions in configured order
    pub versions: &'a [AnalyzerVersion],
    /// Contents of the files listed by [`fallback_candidates`], by path
    pub assemblies: &'a HashMap<String, Vec<u8>>,
}

/// Path to define constraints, first claim wins
type Selection = BTreeMap<String, Vec<String>>;

type Strategy = fn(&SelectionContext<'_>, &[&str], &mut Selection);

const STRATEGIES: &[(&str, Strategy)] = &[
    ("versioned-folders", versioned_folders),
    ("unversioned-fallback", unversioned_fallback),
];

/// Analyzer files without satellite resources
fn candidates(files: &[String]) -> Vec<&str> {
    files
        .iter()
        .map(String::as_str)
        .filter(|path| under_prefix(path, ANALYZERS_FOLDER) && !is_applicable_analyzer_resource(path))
        .collect()
}

/// Files the unversioned strategy inspects
///
/// C# analyzer assemblies when the package has any, every candidate
/// otherwise, leaving out versioned folders in both cases. Callers read
/// these files into [`SelectionContext::assemblies`].
pub fn fallback_candidates(files: &[String]) -> Vec<String> {
    fallback_pool(&candidates(files))
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn fallback_pool<'a>(candidates: &[&'a str]) -> Vec<&'a str> {
    let by_language: Vec<&str> = candidates
        .iter()
        .copied()
        .filter(|path| is_applicable_analyzer(path))
        .collect();
    let pool = if by_language.is_empty() { candidates.to_vec() } else { by_language };
    pool.into_iter().filter(|path| !is_versioned(path)).collect()
}

/// Select analyzer files Unity can load and render their `.meta` text
///
/// Returns output path to sidecar text, sorted by path. Files whose
/// compiler requirement no configured version meets are left out, as are
/// files with no sidecar kind (`.pdb`, ...).
pub fn unity_supported_files(ctx: &SelectionContext<'_>, files: &[String]) -> BTreeMap<String, String> {
    let candidates = candidates(files);
    let mut selection = Selection::new();

    for (name, strategy) in STRATEGIES {
        let before = selection.len();
        strategy(ctx, &candidates, &mut selection);
        debug!(
            "{}: strategy {} selected {} files",
            ctx.identity,
            name,
            selection.len() - before
        );
    }

    selection
        .into_iter()
        .filter_map(|(path, constraints)| {
            let guid = unity_guid(ctx.identity, &path);
            let extension = extension_of(&path);
            let meta = if extension.eq_ignore_ascii_case(".dll") {
                Some(plugin_meta(
                    &guid,
                    PluginTarget::none(),
                    &[ROSLYN_ANALYZER_LABEL.to_string()],
                    &constraints,
                ))
            } else {
                extension_meta(&guid, extension)
            };
            meta.map(|meta| (path, meta))
        })
        .collect()
}

fn claim(selection: &mut Selection, path: &str, constraints: &[String]) {
    selection
        .entry(path.to_string())
        .or_insert_with(|| constraints.to_vec());
}

fn versioned_folders(ctx: &SelectionContext<'_>, candidates: &[&str], selection: &mut Selection) {
    let mut folders: Vec<(CompilerVersion, String)> = Vec::new();
    for path in candidates {
        let Some(caps) = ROSLYN_FOLDER.captures(path) else {
            continue;
        };
        let (Ok(major), Ok(minor)) = (caps["major"].parse(), caps["minor"].parse()) else {
            continue;
        };
        let folder = caps[0].trim_end_matches('/').to_string();
        if !folders.iter().any(|(_, f)| f.eq_ignore_ascii_case(&folder)) {
            folders.push((CompilerVersion::new(major, minor, 0, 0), folder));
        }
    }
    if folders.is_empty() {
        return;
    }

    // Highest folder each configured compiler can load
    let matched: Vec<(&AnalyzerVersion, &CompilerVersion, &str)> = ctx
        .versions
        .iter()
        .filter_map(|descriptor| {
            folders
                .iter()
                .filter(|(version, _)| *version <= descriptor.version)
                .max_by_key(|(version, _)| *version)
                .map(|(version, folder)| (descriptor, version, folder.as_str()))
        })
        .collect();

    let Some(&(first, first_version, first_folder)) = matched.first() else {
        return;
    };

    if matched.iter().all(|(_, version, _)| *version == first_version) {
        for path in candidates.iter().filter(|p| under_prefix(p, first_folder)) {
            claim(selection, path, &first.single_define_constraints);
        }
        return;
    }

    for (descriptor, _, folder) in &matched {
        for path in candidates.iter().filter(|p| under_prefix(p, folder)) {
            claim(selection, path, &descriptor.define_constraints);
        }
    }
}

fn unversioned_fallback(ctx: &SelectionContext<'_>, candidates: &[&str], selection: &mut Selection) {
    for path in fallback_pool(candidates) {
        if selection.contains_key(path) {
            continue;
        }

        let reference = ctx
            .assemblies
            .get(path)
            .map(|image| referenced_version(image, CODE_ANALYSIS_ASSEMBLY));

        match reference {
            Some(Ok(Some(required))) => {
                match ctx.versions.iter().find(|d| required <= d.version) {
                    Some(descriptor) => claim(selection, path, &descriptor.single_define_constraints),
                    None => debug!(
                        "{}: {} needs compiler {}, newer than any configured",
                        ctx.identity, path, required
                    ),
                }
            }
            Some(Err(e)) => {
                debug!("{}: cannot read {} ({}), loading unconditionally", ctx.identity, path, e);
                claim(selection, path, &[]);
            }
            Some(Ok(None)) | None => claim(selection, path, &[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::NuGetVersion;

    fn versions() -> Vec<AnalyzerVersion> {
        vec![
            AnalyzerVersion::new(CompilerVersion::new(3, 8, 0, 0), &[], &["!UNITY_6000_0_OR_NEWER"]),
            AnalyzerVersion::new(
                CompilerVersion::new(4, 3, 0, 0),
                &["UNITY_6000_0_OR_NEWER"],
                &["UNITY_6000_0_OR_NEWER"],
            ),
        ]
    }

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    fn select(paths: &[&str]) -> BTreeMap<String, String> {
        let identity = PackageIdentity::new("Test.Analyzers", NuGetVersion::parse("1.0.0").unwrap());
        let versions = versions();
        let assemblies = HashMap::new();
        let ctx = SelectionContext {
            identity: &identity,
            versions: &versions,
            assemblies: &assemblies,
        };
        unity_supported_files(&ctx, &files(paths))
    }

    fn has_constraint(meta: &str, constraint: &str) -> bool {
        meta.contains(&format!("  - {}\n", constraint))
    }

    #[test]
    fn test_compiler_version_parse() {
        assert_eq!("4.3".parse::<CompilerVersion>().unwrap(), CompilerVersion::new(4, 3, 0, 0));
        assert_eq!("3.8.0.0".parse::<CompilerVersion>().unwrap(), CompilerVersion::new(3, 8, 0, 0));
        assert!("4".parse::<CompilerVersion>().is_err());
        assert!("4.x".parse::<CompilerVersion>().is_err());
        assert_eq!(CompilerVersion::new(4, 3, 0, 0).to_string(), "4.3");
        assert_eq!(CompilerVersion::new(4, 3, 1, 0).to_string(), "4.3.1");
        assert!(CompilerVersion::new(4, 3, 0, 0) < CompilerVersion::new(4, 11, 0, 0));
    }

    #[test]
    fn test_resource_and_language_filters() {
        assert!(is_applicable_analyzer_resource("analyzers/dotnet/cs/de/Foo.resources.dll"));
        assert!(is_applicable_analyzer_resource("analyzers/dotnet/Foo.Resources.DLL"));
        assert!(!is_applicable_analyzer_resource("analyzers/dotnet/vb/de/Foo.resources.dll"));
        assert!(!is_applicable_analyzer_resource("lib/netstandard2.0/Foo.resources.dll"));

        assert!(is_applicable_analyzer("analyzers/dotnet/cs/Foo.dll"));
        assert!(is_applicable_analyzer("analyzers/dotnet/Foo.dll"));
        assert!(!is_applicable_analyzer("analyzers/dotnet/vb/Foo.dll"));
        assert!(!is_applicable_analyzer("analyzers/dotnet/cs/Foo.resources.dll"));
        assert!(!is_applicable_analyzer("analyzers/dotnet/cs/Foo.pdb"));
    }

    #[test]
    fn test_versioned_folders_split_by_compiler() {
        let result = select(&[
            "analyzers/dotnet/roslyn3.8/cs/Meziantou.Analyzer.dll",
            "analyzers/dotnet/roslyn4.2/cs/Meziantou.Analyzer.dll",
            "analyzers/dotnet/roslyn4.4/cs/Meziantou.Analyzer.dll",
        ]);
        assert_eq!(result.len(), 2);

        let old = &result["analyzers/dotnet/roslyn3.8/cs/Meziantou.Analyzer.dll"];
        assert!(has_constraint(old, "!UNITY_6000_0_OR_NEWER"));
        assert!(old.contains("labels:\n- RoslynAnalyzer\n"));

        let new = &result["analyzers/dotnet/roslyn4.2/cs/Meziantou.Analyzer.dll"];
        assert!(has_constraint(new, "UNITY_6000_0_OR_NEWER"));
        assert!(!has_constraint(new, "!UNITY_6000_0_OR_NEWER"));
        assert!(!result.contains_key("analyzers/dotnet/roslyn4.4/cs/Meziantou.Analyzer.dll"));
    }

    #[test]
    fn test_versioned_folder_shared_by_all_compilers() {
        let result = select(&[
            "analyzers/dotnet/roslyn3.8/cs/Roslynator.CSharp.Analyzers.dll",
            "analyzers/dotnet/roslyn3.8/cs/Roslynator.Core.dll",
        ]);
        assert_eq!(result.len(), 2);
        for meta in result.values() {
            assert!(meta.contains("  defineConstraints: []\n"));
        }
    }

    #[test]
    fn test_versioned_folder_too_new() {
        let result = select(&["analyzers/dotnet/roslyn4.8/cs/Future.Analyzer.dll"]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_unversioned_without_metadata_is_unconditional() {
        let result = select(&[
            "analyzers/dotnet/cs/StrongInject.Generator.dll",
            "analyzers/dotnet/cs/de/StrongInject.Generator.resources.dll",
            "analyzers/dotnet/vb/StrongInject.Generator.VisualBasic.dll",
        ]);
        let paths: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["analyzers/dotnet/cs/StrongInject.Generator.dll"]);
        assert!(result["analyzers/dotnet/cs/StrongInject.Generator.dll"].contains("  defineConstraints: []\n"));
    }

    #[test]
    fn test_unversioned_skips_versioned_paths_and_pdb() {
        let result = select(&[
            "analyzers/dotnet/roslyn3.8/cs/A.dll",
            "analyzers/dotnet/cs/B.dll",
            "analyzers/dotnet/cs/B.pdb",
        ]);
        let paths: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["analyzers/dotnet/cs/B.dll", "analyzers/dotnet/roslyn3.8/cs/A.dll"]);
    }

    #[test]
    fn test_non_analyzer_files_ignored() {
        let result = select(&["lib/netstandard2.0/Foo.dll", "analyzers/dotnet/cs/readme.txt"]);
        let paths: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["analyzers/dotnet/cs/readme.txt"]);
        assert!(result["analyzers/dotnet/cs/readme.txt"].contains("TextScriptImporter:"));
    }

    #[test]
    fn test_fallback_candidates() {
        let candidates = fallback_candidates(&files(&[
            "analyzers/dotnet/roslyn4.3/cs/A.dll",
            "analyzers/dotnet/cs/B.dll",
            "analyzers/dotnet/cs/B.xml",
            "analyzers/dotnet/cs/fr/B.resources.dll",
        ]));
        assert_eq!(candidates, vec!["analyzers/dotnet/cs/B.dll"]);

        let candidates = fallback_candidates(&files(&["analyzers/dotnet/vb/C.dll"]));
        assert_eq!(candidates, vec!["analyzers/dotnet/vb/C.dll"]);
    }
}
