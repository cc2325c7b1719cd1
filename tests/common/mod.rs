// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use unity_nuget::framework::Framework;
use unity_nuget::upstream::{DependencyGroup, PackageDependency, PackageMetadata};
use unity_nuget::{
    AnalyzerVersion, CacheOptions, CompilerVersion, MemoryPackage, MemorySource, NuGetVersion,
    PackageIdentity, TargetFramework, VersionRange,
};

pub fn identity(id: &str, version: &str) -> PackageIdentity {
    PackageIdentity::new(id, NuGetVersion::parse(version).unwrap())
}

pub fn group(moniker: &str, dependencies: &[(&str, &str)]) -> DependencyGroup {
    DependencyGroup {
        target_framework: Framework::parse(moniker),
        dependencies: dependencies
            .iter()
            .map(|(id, range)| PackageDependency::new(*id, VersionRange::parse(range).unwrap()))
            .collect(),
    }
}

pub fn metadata(id: &str, version: &str, groups: Vec<DependencyGroup>) -> PackageMetadata {
    PackageMetadata {
        identity: identity(id, version),
        listed: true,
        description: Some(format!("{} for tests", id)),
        dependency_groups: groups,
    }
}

/// Register a version whose content is the given (path, bytes) files
pub fn add_package(
    source: &mut MemorySource,
    id: &str,
    version: &str,
    groups: Vec<DependencyGroup>,
    files: &[(&str, Vec<u8>)],
) {
    let meta = metadata(id, version, groups);
    let mut package = MemoryPackage::new(meta.identity.clone());
    for (path, content) in files {
        package = package.with_file(path, content.clone());
    }
    source.add(meta, package);
}

/// Target frameworks split at Unity 2021.2
pub fn unity_targets() -> Vec<TargetFramework> {
    vec![
        TargetFramework::new("netstandard2.0", &["!UNITY_2021_2_OR_NEWER"]),
        TargetFramework::new("netstandard2.1", &["UNITY_2021_2_OR_NEWER"]),
    ]
}

/// Roslyn versions split at Unity 6
pub fn analyzer_versions() -> Vec<AnalyzerVersion> {
    vec![
        AnalyzerVersion::new(CompilerVersion::new(3, 8, 0, 0), &[], &["!UNITY_6000_0_OR_NEWER"]),
        AnalyzerVersion::new(
            CompilerVersion::new(4, 3, 0, 0),
            &["UNITY_6000_0_OR_NEWER"],
            &["UNITY_6000_0_OR_NEWER"],
        ),
    ]
}

pub fn options() -> CacheOptions {
    CacheOptions {
        target_frameworks: unity_targets(),
        analyzer_versions: analyzer_versions(),
        max_concurrent: 2,
        ..CacheOptions::default()
    }
}

/// Define constraints listed in a `.meta` text
pub fn define_constraints(meta: &str) -> Vec<String> {
    let mut constraints = Vec::new();
    let mut in_list = false;
    for line in meta.lines() {
        if line == "  defineConstraints:" {
            in_list = true;
            continue;
        }
        if in_list {
            match line.strip_prefix("  - ") {
                Some(value) => constraints.push(value.to_string()),
                None => break,
            }
        }
    }
    constraints
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// ECMA-335 metadata root with a Module row and the given AssemblyRef rows
fn metadata_root(references: &[(&str, [u16; 4])]) -> Vec<u8> {
    let mut strings = vec![0u8];
    let mut name_offsets = Vec::new();
    for (name, _) in references {
        name_offsets.push(strings.len() as u16);
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);
    }
    while strings.len() % 4 != 0 {
        strings.push(0);
    }

    let mut tables = Vec::new();
    put_u32(&mut tables, 0);
    tables.extend_from_slice(&[2, 0, 0, 1]);
    let valid: u64 = 1 | (1 << 0x23);
    tables.extend_from_slice(&valid.to_le_bytes());
    tables.extend_from_slice(&0u64.to_le_bytes());
    put_u32(&mut tables, 1);
    put_u32(&mut tables, references.len() as u32);
    tables.extend_from_slice(&[0u8; 10]);
    for ((_, version), name) in references.iter().zip(&name_offsets) {
        for part in version {
            put_u16(&mut tables, *part);
        }
        put_u32(&mut tables, 0);
        put_u16(&mut tables, 0);
        put_u16(&mut tables, *name);
        put_u16(&mut tables, 0);
        put_u16(&mut tables, 0);
    }
    while tables.len() % 4 != 0 {
        tables.push(0);
    }

    let version = b"v4.0.30319\0\0";
    let header_len = 16 + version.len() + 4 + 12 + 20;
    let mut root = Vec::new();
    put_u32(&mut root, 0x424A_5342);
    put_u16(&mut root, 1);
    put_u16(&mut root, 1);
    put_u32(&mut root, 0);
    put_u32(&mut root, version.len() as u32);
    root.extend_from_slice(version);
    put_u16(&mut root, 0);
    put_u16(&mut root, 2);
    put_u32(&mut root, header_len as u32);
    put_u32(&mut root, tables.len() as u32);
    root.extend_from_slice(b"#~\0\0");
    put_u32(&mut root, (header_len + tables.len()) as u32);
    put_u32(&mut root, strings.len() as u32);
    root.extend_from_slice(b"#Strings\0\0\0\0");
    root.extend_from_slice(&tables);
    root.extend_from_slice(&strings);
    root
}

/// Minimal PE32 DLL with a CLI header and the given assembly references
pub fn managed_assembly(references: &[(&str, [u16; 4])]) -> Vec<u8> {
    const PE_OFFSET: usize = 0x80;
    const OPTIONAL_HEADER: usize = PE_OFFSET + 4 + 20;
    const SECTION_TABLE: usize = OPTIONAL_HEADER + 0xE0;
    const RAW_DATA: usize = 0x200;
    const TEXT_RVA: u32 = 0x2000;
    const CLI_HEADER_SIZE: usize = 72;

    let metadata = metadata_root(references);
    let section_len = CLI_HEADER_SIZE + metadata.len();
    let raw_size = section_len.div_ceil(0x200) * 0x200;

    let mut image = vec![0u8; RAW_DATA + raw_size];

    // DOS header
    image[0] = b'M';
    image[1] = b'Z';
    write_u32(&mut image, 0x3C, PE_OFFSET as u32);

    // PE signature and COFF header
    image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");
    let coff = PE_OFFSET + 4;
    write_u16(&mut image, coff, 0x014C);
    write_u16(&mut image, coff + 2, 1);
    write_u16(&mut image, coff + 16, 0xE0);
    write_u16(&mut image, coff + 18, 0x2102);

    // PE32 optional header
    let opt = OPTIONAL_HEADER;
    write_u16(&mut image, opt, 0x010B);
    write_u32(&mut image, opt + 4, raw_size as u32);
    write_u32(&mut image, opt + 20, TEXT_RVA);
    write_u32(&mut image, opt + 28, 0x1000_0000);
    write_u32(&mut image, opt + 32, 0x1000);
    write_u32(&mut image, opt + 36, 0x200);
    write_u16(&mut image, opt + 40, 4);
    write_u16(&mut image, opt + 48, 4);
    write_u32(&mut image, opt + 56, 0x4000);
    write_u32(&mut image, opt + 60, RAW_DATA as u32);
    write_u16(&mut image, opt + 68, 3);
    write_u32(&mut image, opt + 72, 0x10_0000);
    write_u32(&mut image, opt + 76, 0x1000);
    write_u32(&mut image, opt + 80, 0x10_0000);
    write_u32(&mut image, opt + 84, 0x1000);
    write_u32(&mut image, opt + 92, 16);
    // CLI header data directory (index 14)
    write_u32(&mut image, opt + 208, TEXT_RVA);
    write_u32(&mut image, opt + 212, CLI_HEADER_SIZE as u32);

    // .text section header
    let section = SECTION_TABLE;
    image[section..section + 5].copy_from_slice(b".text");
    write_u32(&mut image, section + 8, section_len as u32);
    write_u32(&mut image, section + 12, TEXT_RVA);
    write_u32(&mut image, section + 16, raw_size as u32);
    write_u32(&mut image, section + 20, RAW_DATA as u32);
    write_u32(&mut image, section + 36, 0x6000_0020);

    // CLI header followed by the metadata root
    let cli = RAW_DATA;
    write_u32(&mut image, cli, CLI_HEADER_SIZE as u32);
    write_u16(&mut image, cli + 4, 2);
    write_u16(&mut image, cli + 6, 5);
    write_u32(&mut image, cli + 8, TEXT_RVA + CLI_HEADER_SIZE as u32);
    write_u32(&mut image, cli + 12, metadata.len() as u32);
    write_u32(&mut image, cli + 16, 1);
    image[cli + CLI_HEADER_SIZE..cli + CLI_HEADER_SIZE + metadata.len()].copy_from_slice(&metadata);

    image
}

/// Analyzer assembly built against the given Roslyn version
pub fn analyzer_assembly(major: u16, minor: u16) -> Vec<u8> {
    managed_assembly(&[
        ("netstandard", [2, 0, 0, 0]),
        ("Microsoft.CodeAnalysis", [major, minor, 0, 0]),
    ])
}
