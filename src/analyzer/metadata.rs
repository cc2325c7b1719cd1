// src/analyzer/metadata.rs
//! Assembly reference extraction from managed PE images
//!
//! goblin locates the CLI header inside the PE container; the ECMA-335
//! metadata behind it is walked by hand: metadata root, stream headers,
//! the `#~` table stream and the `#Strings` heap. Only the AssemblyRef
//! table (0x23) is decoded; every table before it is sized and skipped.

use super::CompilerVersion;
use goblin::Object;
use goblin::pe::section_table::SectionTable;
use thiserror::Error;

/// Errors while reading managed metadata
///
/// None of these are fatal to a build: the caller treats an unreadable
/// assembly the same as one without a compiler reference.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Not a PE image: {0}")]
    NotPortableExecutable(String),

    #[error("Image has no CLI header")]
    NotManaged,

    #[error("Metadata truncated at offset {0:#x}")]
    Truncated(usize),

    #[error("Invalid metadata: {0}")]
    Invalid(String),
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// One row of the AssemblyRef table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReference {
    pub name: String,
    pub version: CompilerVersion,
}

const METADATA_SIGNATURE: u32 = 0x424A_5342;
const ASSEMBLY_REF_TABLE: usize = 0x23;

// Heap size flags of the table stream header
const WIDE_STRINGS: u8 = 0x01;
const WIDE_GUIDS: u8 = 0x02;
const WIDE_BLOBS: u8 = 0x04;
const EXTRA_DATA: u8 = 0x40;

#[derive(Debug, Clone, Copy)]
struct CodedIndex {
    tables: &'static [u8],
    tag_bits: u32,
}

const TYPE_DEF_OR_REF: CodedIndex = CodedIndex { tables: &[0x02, 0x01, 0x1B], tag_bits: 2 };
const HAS_CONSTANT: CodedIndex = CodedIndex { tables: &[0x04, 0x08, 0x17], tag_bits: 2 };
const HAS_CUSTOM_ATTRIBUTE: CodedIndex = CodedIndex {
    tables: &[
        0x06, 0x04, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x00, 0x0E, 0x17, 0x14, 0x11, 0x1A, 0x1B, 0x20,
        0x23, 0x26, 0x27, 0x28, 0x2A, 0x2C, 0x2B,
    ],
    tag_bits: 5,
};
const HAS_FIELD_MARSHAL: CodedIndex = CodedIndex { tables: &[0x04, 0x08], tag_bits: 1 };
const HAS_DECL_SECURITY: CodedIndex = CodedIndex { tables: &[0x02, 0x06, 0x20], tag_bits: 2 };
const MEMBER_REF_PARENT: CodedIndex = CodedIndex { tables: &[0x02, 0x01, 0x1A, 0x06, 0x1B], tag_bits: 3 };
const HAS_SEMANTICS: CodedIndex = CodedIndex { tables: &[0x14, 0x17], tag_bits: 1 };
const METHOD_DEF_OR_REF: CodedIndex = CodedIndex { tables: &[0x06, 0x0A], tag_bits: 1 };
const MEMBER_FORWARDED: CodedIndex = CodedIndex { tables: &[0x04, 0x06], tag_bits: 1 };
const CUSTOM_ATTRIBUTE_TYPE: CodedIndex = CodedIndex { tables: &[0x06, 0x0A], tag_bits: 3 };
const RESOLUTION_SCOPE: CodedIndex = CodedIndex { tables: &[0x00, 0x1A, 0x23, 0x01], tag_bits: 2 };

#[derive(Debug, Clone, Copy)]
enum Column {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Table(u8),
    Coded(CodedIndex),
}

use Column::{Blob, Coded, Guid, Str, Table, U16, U32};

/// Column layout of tables 0x00..0x22, the ones stored before AssemblyRef
const TABLE_SCHEMAS: [&[Column]; ASSEMBLY_REF_TABLE] = [
    &[U16, Str, Guid, Guid, Guid],                                          // Module
    &[Coded(RESOLUTION_SCOPE), Str, Str],                                   // TypeRef
    &[U32, Str, Str, Coded(TYPE_DEF_OR_REF), Table(0x04), Table(0x06)],     // TypeDef
    &[Table(0x04)],                                                         // FieldPtr
    &[U16, Str, Blob],                                                      // Field
    &[Table(0x06)],                                                         // MethodPtr
    &[U32, U16, U16, Str, Blob, Table(0x08)],                               // MethodDef
    &[Table(0x08)],                                                         // ParamPtr
    &[U16, U16, Str],                                                       // Param
    &[Table(0x02), Coded(TYPE_DEF_OR_REF)],                                 // InterfaceImpl
    &[Coded(MEMBER_REF_PARENT), Str, Blob],                                 // MemberRef
    &[U16, Coded(HAS_CONSTANT), Blob],                                      // Constant
    &[Coded(HAS_CUSTOM_ATTRIBUTE), Coded(CUSTOM_ATTRIBUTE_TYPE), Blob],     // CustomAttribute
    &[Coded(HAS_FIELD_MARSHAL), Blob],                                      // FieldMarshal
    &[U16, Coded(HAS_DECL_SECURITY), Blob],                                 // DeclSecurity
    &[U16, U32, Table(0x02)],                                               // ClassLayout
    &[U32, Table(0x04)],                                                    // FieldLayout
    &[Blob],                                                                // StandAloneSig
    &[Table(0x02), Table(0x14)],                                            // EventMap
    &[Table(0x14)],                                                         // EventPtr
    &[U16, Str, Coded(TYPE_DEF_OR_REF)],                                    // Event
    &[Table(0x02), Table(0x17)],                                            // PropertyMap
    &[Table(0x17)],                                                         // PropertyPtr
    &[U16, Str, Blob],                                                      // Property
    &[U16, Table(0x06), Coded(HAS_SEMANTICS)],                              // MethodSemantics
    &[Table(0x02), Coded(METHOD_DEF_OR_REF), Coded(METHOD_DEF_OR_REF)],     // MethodImpl
    &[Str],                                                                 // ModuleRef
    &[Blob],                                                                // TypeSpec
    &[U16, Coded(MEMBER_FORWARDED), Str, Table(0x1A)],                      // ImplMap
    &[U32, Table(0x04)],                                                    // FieldRVA
    &[U32, U32],                                                            // EncLog
    &[U32],                                                                 // EncMap
    &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],                        // Assembly
    &[U32],                                                                 // AssemblyProcessor
    &[U32, U32, U32],                                                       // AssemblyOS
];

/// Little-endian cursor over a byte slice
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn take<const N: usize>(&mut self) -> MetadataResult<[u8; N]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or(MetadataError::Truncated(self.pos))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self) -> MetadataResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> MetadataResult<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> MetadataResult<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> MetadataResult<u64> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    /// 2- or 4-byte index
    fn index(&mut self, wide: bool) -> MetadataResult<u32> {
        if wide { self.u32() } else { self.u16().map(u32::from) }
    }

    fn skip(&mut self, count: usize) -> MetadataResult<()> {
        if self.pos + count > self.data.len() {
            return Err(MetadataError::Truncated(self.pos));
        }
        self.pos += count;
        Ok(())
    }

    /// NUL-terminated name padded to a 4-byte boundary (stream headers)
    fn padded_name(&mut self) -> MetadataResult<&'a str> {
        let start = self.pos;
        let rest = self.data.get(start..).ok_or(MetadataError::Truncated(start))?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(MetadataError::Truncated(start))?;
        let name = std::str::from_utf8(&rest[..len])
            .map_err(|_| MetadataError::Invalid("stream name is not UTF-8".to_string()))?;
        self.pos = start + ((len + 1 + 3) & !3);
        Ok(name)
    }
}

/// Byte widths of every column kind, derived from heap flags and row counts
struct Widths {
    heap_sizes: u8,
    rows: [u32; 64],
}

impl Widths {
    fn column(&self, column: Column) -> usize {
        match column {
            U16 => 2,
            U32 => 4,
            Str => self.heap(WIDE_STRINGS),
            Guid => self.heap(WIDE_GUIDS),
            Blob => self.heap(WIDE_BLOBS),
            Table(table) => {
                if self.rows[table as usize] < 0x1_0000 { 2 } else { 4 }
            }
            Coded(coded) => {
                let max_rows = coded
                    .tables
                    .iter()
                    .map(|&t| self.rows[t as usize])
                    .max()
                    .unwrap_or(0);
                if max_rows < (1u32 << (16 - coded.tag_bits)) { 2 } else { 4 }
            }
        }
    }

    fn heap(&self, flag: u8) -> usize {
        if self.heap_sizes & flag != 0 { 4 } else { 2 }
    }

    fn row_size(&self, schema: &[Column]) -> usize {
        schema.iter().map(|&c| self.column(c)).sum()
    }
}

/// All assembly references of a managed PE image
pub fn assembly_references(image: &[u8]) -> MetadataResult<Vec<AssemblyReference>> {
    let pe = match Object::parse(image) {
        Ok(Object::PE(pe)) => pe,
        Ok(_) => return Err(MetadataError::NotPortableExecutable("not a PE container".to_string())),
        Err(e) => return Err(MetadataError::NotPortableExecutable(e.to_string())),
    };

    let optional = pe.header.optional_header.as_ref().ok_or(MetadataError::NotManaged)?;
    let cli_rva = optional
        .data_directories
        .get_clr_runtime_header()
        .clone()
        .map(|dir| dir.virtual_address)
        .filter(|&rva| rva != 0)
        .ok_or(MetadataError::NotManaged)?;

    let cli_offset = rva_to_offset(&pe.sections, cli_rva)
        .ok_or_else(|| MetadataError::Invalid("CLI header outside of any section".to_string()))?;

    // cb, major and minor runtime version precede the metadata directory
    let mut header = Reader::at(image, cli_offset + 8);
    let metadata_rva = header.u32()?;
    let metadata_size = header.u32()? as usize;
    let metadata_offset = rva_to_offset(&pe.sections, metadata_rva)
        .ok_or_else(|| MetadataError::Invalid("metadata outside of any section".to_string()))?;
    let metadata = image
        .get(metadata_offset..metadata_offset + metadata_size)
        .ok_or(MetadataError::Truncated(metadata_offset))?;

    parse_metadata(metadata)
}

/// Version of the referenced assembly called `name`, if the image references it
pub fn referenced_version(image: &[u8], name: &str) -> MetadataResult<Option<CompilerVersion>> {
    Ok(assembly_references(image)?
        .into_iter()
        .find(|reference| reference.name == name)
        .map(|reference| reference.version))
}

fn rva_to_offset(sections: &[SectionTable], rva: u32) -> Option<usize> {
    let rva = u64::from(rva);
    sections.iter().find_map(|section| {
        let start = u64::from(section.virtual_address);
        let size = u64::from(section.virtual_size.max(section.size_of_raw_data));
        (rva >= start && rva < start + size)
            .then(|| (rva - start + u64::from(section.pointer_to_raw_data)) as usize)
    })
}

/// Decode AssemblyRef rows from a metadata root
fn parse_metadata(metadata: &[u8]) -> MetadataResult<Vec<AssemblyReference>> {
    let mut root = Reader::at(metadata, 0);
    if root.u32()? != METADATA_SIGNATURE {
        return Err(MetadataError::Invalid("bad metadata signature".to_string()));
    }
    // major, minor, reserved
    root.skip(8)?;
    let version_length = root.u32()? as usize;
    root.skip(version_length)?;
    // flags
    root.skip(2)?;
    let stream_count = root.u16()?;

    let mut tables = None;
    let mut strings = None;
    for _ in 0..stream_count {
        let offset = root.u32()? as usize;
        let size = root.u32()? as usize;
        let name = root.padded_name()?;
        let body = metadata
            .get(offset..offset + size)
            .ok_or(MetadataError::Truncated(offset))?;
        match name {
            "#~" | "#-" => tables = Some(body),
            "#Strings" => strings = Some(body),
            _ => {}
        }
    }

    let tables = tables.ok_or_else(|| MetadataError::Invalid("no table stream".to_string()))?;
    let strings = strings.ok_or_else(|| MetadataError::Invalid("no #Strings heap".to_string()))?;
    read_assembly_refs(tables, strings)
}

fn read_assembly_refs(tables: &[u8], strings: &[u8]) -> MetadataResult<Vec<AssemblyReference>> {
    let mut reader = Reader::at(tables, 0);
    // reserved, major, minor
    reader.skip(6)?;
    let heap_sizes = reader.u8()?;
    reader.skip(1)?;
    let valid = reader.u64()?;
    let _sorted = reader.u64()?;

    let mut rows = [0u32; 64];
    for (table, count) in rows.iter_mut().enumerate() {
        if valid & (1u64 << table) != 0 {
            *count = reader.u32()?;
        }
    }
    if heap_sizes & EXTRA_DATA != 0 {
        reader.skip(4)?;
    }

    let widths = Widths { heap_sizes, rows };
    let preceding: usize = TABLE_SCHEMAS
        .iter()
        .enumerate()
        .map(|(table, schema)| widths.row_size(schema) * rows[table] as usize)
        .sum();
    reader.skip(preceding)?;

    let wide_strings = heap_sizes & WIDE_STRINGS != 0;
    let wide_blobs = heap_sizes & WIDE_BLOBS != 0;
    let mut references = Vec::with_capacity(rows[ASSEMBLY_REF_TABLE] as usize);
    for _ in 0..rows[ASSEMBLY_REF_TABLE] {
        let major = reader.u16()?;
        let minor = reader.u16()?;
        let build = reader.u16()?;
        let revision = reader.u16()?;
        let _flags = reader.u32()?;
        let _public_key = reader.index(wide_blobs)?;
        let name = reader.index(wide_strings)?;
        let _culture = reader.index(wide_strings)?;
        let _hash = reader.index(wide_blobs)?;

        references.push(AssemblyReference {
            name: heap_string(strings, name as usize)?,
            version: CompilerVersion::new(
                u32::from(major),
                u32::from(minor),
                u32::from(build),
                u32::from(revision),
            ),
        });
    }

    Ok(references)
}

fn heap_string(heap: &[u8], index: usize) -> MetadataResult<String> {
    let rest = heap.get(index..).ok_or(MetadataError::Truncated(index))?;
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(MetadataError::Truncated(index))?;
    Ok(String::from_utf8_lossy(&rest[..len]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Metadata root with a Module row and the given AssemblyRef rows
    fn metadata_blob(references: &[(&str, [u16; 4])]) -> Vec<u8> {
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
        tables.extend_from_slice(&0u32.to_le_bytes());
        tables.extend_from_slice(&[2, 0, 0, 1]);
        let valid: u64 = 1 | (1 << ASSEMBLY_REF_TABLE);
        tables.extend_from_slice(&valid.to_le_bytes());
        tables.extend_from_slice(&0u64.to_le_bytes());
        tables.extend_from_slice(&1u32.to_le_bytes());
        tables.extend_from_slice(&(references.len() as u32).to_le_bytes());
        // Module: generation, name, mvid, encid, encbaseid
        tables.extend_from_slice(&[0u8; 10]);
        for ((_, v), name) in references.iter().zip(&name_offsets) {
            for part in v {
                tables.extend_from_slice(&part.to_le_bytes());
            }
            tables.extend_from_slice(&0u32.to_le_bytes());
            tables.extend_from_slice(&0u16.to_le_bytes());
            tables.extend_from_slice(&name.to_le_bytes());
            tables.extend_from_slice(&0u16.to_le_bytes());
            tables.extend_from_slice(&0u16.to_le_bytes());
        }
        while tables.len() % 4 != 0 {
            tables.push(0);
        }

        let version = b"v4.0.30319\0\0";
        let header_len = 16 + version.len() + 4 + (8 + 4) + (8 + 12);
        let mut blob = Vec::new();
        blob.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
        blob.extend_from_slice(&1u16.to_le_bytes());
        blob.extend_from_slice(&1u16.to_le_bytes());
        blob.extend_from_slice(&0u32.to_le_bytes());
        blob.extend_from_slice(&(version.len() as u32).to_le_bytes());
        blob.extend_from_slice(version);
        blob.extend_from_slice(&0u16.to_le_bytes());
        blob.extend_from_slice(&2u16.to_le_bytes());
        blob.extend_from_slice(&(header_len as u32).to_le_bytes());
        blob.extend_from_slice(&(tables.len() as u32).to_le_bytes());
        blob.extend_from_slice(b"#~\0\0");
        blob.extend_from_slice(&((header_len + tables.len()) as u32).to_le_bytes());
        blob.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        blob.extend_from_slice(b"#Strings\0\0\0\0");
        assert_eq!(blob.len(), header_len);
        blob.extend_from_slice(&tables);
        blob.extend_from_slice(&strings);
        blob
    }

    #[test]
    fn test_parse_metadata_reads_assembly_refs() {
        let blob = metadata_blob(&[
            ("netstandard", [2, 0, 0, 0]),
            ("Microsoft.CodeAnalysis", [4, 3, 0, 0]),
        ]);
        let references = parse_metadata(&blob).unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].name, "netstandard");
        assert_eq!(references[1].name, "Microsoft.CodeAnalysis");
        assert_eq!(references[1].version, CompilerVersion::new(4, 3, 0, 0));
    }

    #[test]
    fn test_parse_metadata_without_references() {
        let blob = metadata_blob(&[]);
        assert!(parse_metadata(&blob).unwrap().is_empty());
    }

    #[test]
    fn test_parse_metadata_rejects_bad_signature() {
        let mut blob = metadata_blob(&[]);
        blob[0] = 0;
        assert!(matches!(parse_metadata(&blob), Err(MetadataError::Invalid(_))));
    }

    #[test]
    fn test_parse_metadata_truncated() {
        let blob = metadata_blob(&[("Microsoft.CodeAnalysis", [3, 8, 0, 0])]);
        assert!(parse_metadata(&blob[..blob.len() / 2]).is_err());
    }

    #[test]
    fn test_non_pe_input() {
        assert!(matches!(
            assembly_references(b"plain text, not an assembly"),
            Err(MetadataError::NotPortableExecutable(_))
        ));
        assert!(referenced_version(&[], "Microsoft.CodeAnalysis").is_err());
    }
}
