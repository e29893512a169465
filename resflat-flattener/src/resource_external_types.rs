// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Types the runtime loader itself uses to describe a resource table. Field
// order, widths and flag bits here are a hard compatibility contract; the
// loader is versioned independently of this code.
use deku::prelude::*;

use crate::config_description::ConfigDescription;

pub const RES_CHUNK_HEADER_SIZE: u32 = 8;

/// Sentinel for "this entry id has no value in this configuration" in a
/// dense 32-bit offset index.
pub const NO_ENTRY: u32 = 0xFFFF_FFFF;
/// Same sentinel for the 16-bit offset index (offsets stored divided by 4).
pub const NO_ENTRY16: u16 = 0xFFFF;

// ResTable_entry flags
pub const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
pub const ENTRY_FLAG_PUBLIC: u16 = 0x0002;
pub const ENTRY_FLAG_WEAK: u16 = 0x0004;
pub const ENTRY_FLAG_COMPACT: u16 = 0x0008;

// ResTable_type flags
pub const TYPE_FLAG_SPARSE: u8 = 0x01;
pub const TYPE_FLAG_OFFSET16: u8 = 0x02;

// ResTable_typeSpec per-entry mask bits; the low bits hold configuration
// axis diffs from ConfigDescription::diff.
pub const SPEC_STAGED_API: u32 = 0x2000_0000;
pub const SPEC_PUBLIC: u32 = 0x4000_0000;

// Synthetic map keys used for attribute metadata, plural quantities and
// array element positions.
pub const ATTR_TYPE: u32 = 0x0100_0000;
pub const ATTR_MIN: u32 = 0x0100_0001;
pub const ATTR_MAX: u32 = 0x0100_0002;
pub const ATTR_L10N: u32 = 0x0100_0003;
pub const ATTR_OTHER: u32 = 0x0100_0004;
pub const ATTR_ZERO: u32 = 0x0100_0005;
pub const ATTR_ONE: u32 = 0x0100_0006;
pub const ATTR_TWO: u32 = 0x0100_0007;
pub const ATTR_FEW: u32 = 0x0100_0008;
pub const ATTR_MANY: u32 = 0x0100_0009;

// Overlayable policy partitions
pub const POLICY_PUBLIC: u32 = 0x0000_0001;
pub const POLICY_SYSTEM: u32 = 0x0000_0002;
pub const POLICY_VENDOR: u32 = 0x0000_0004;
pub const POLICY_PRODUCT: u32 = 0x0000_0008;
pub const POLICY_SIGNATURE: u32 = 0x0000_0010;
pub const POLICY_ODM: u32 = 0x0000_0020;
pub const POLICY_OEM: u32 = 0x0000_0040;
pub const POLICY_ACTOR_SIGNATURE: u32 = 0x0000_0080;
pub const POLICY_CONFIG_SIGNATURE: u32 = 0x0000_0100;

// Visibility states carried by the extended public chunk
pub const PUBLIC_STATE_UNDEFINED: u32 = 0;
pub const PUBLIC_STATE_PRIVATE: u32 = 1;
pub const PUBLIC_STATE_PUBLIC: u32 = 2;

#[derive(Debug, PartialEq, Clone, Copy, DekuWrite)]
#[deku(id_type = "u16")]
pub enum ChunkType {
    #[deku(id = 0x0000)]
    Null,
    #[deku(id = 0x0001)]
    StringPool,
    #[deku(id = 0x0002)]
    Table,

    // Types within a Table
    #[deku(id = 0x0200)]
    TablePackage,
    #[deku(id = 0x0201)]
    TableType,
    #[deku(id = 0x0202)]
    TableTypeSpec,
    #[deku(id = 0x0203)]
    TableLibrary,
    #[deku(id = 0x0204)]
    TableOverlayable,
    #[deku(id = 0x0205)]
    TableOverlayablePolicy,
    #[deku(id = 0x0206)]
    TableStagedAlias,

    // Extended/debug builds only
    #[deku(id = 0x0207)]
    TablePublic,
    #[deku(id = 0x0209)]
    TableSymbols
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct ResChunkHeader {
    pub chunk_type: ChunkType,
    pub header_size: u16,
    // Includes both this header and the data that follows
    pub chunk_size: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableHeaderChunk {
    pub package_count: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TablePackageChunk {
    pub id: u32,
    // This is always 128 u16s (256 bytes) long, NUL-padded.
    pub name: Vec<u16>,
    pub type_string_offset: u32,
    pub last_public_type: u32,
    pub key_string_offset: u32,
    pub last_public_key: u32,
    pub type_id_offset: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableTypeSpecChunk {
    pub id: u8,
    // This is always 0
    pub res0: u8,
    pub types_count: u16,
    pub entry_count: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableTypeChunk {
    pub id: u8,
    pub flags: u8,
    // Must be 0
    pub reserved: u16,
    pub entry_count: u32,
    pub entries_start: u32,
    pub config: ConfigDescription
}

/// Fixed-size header preceding every entry value in the entries blob.
#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableEntry {
    pub size: u16,
    pub flags: u16,
    pub key: u32
}

/// Compact form: same 8 bytes as [TableEntry] but the size field holds the
/// key index and bits 8-15 of the flags hold the value's data type. Only
/// legal for scalar values whose key index fits 16 bits.
#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableEntryCompact {
    pub key: u16,
    pub flags: u16,
    pub data: u32
}

/// Extension of [TableEntry] for complex (map) values.
#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableMapEntryExt {
    pub parent: u32,
    pub count: u32
}

#[derive(Debug, PartialEq, Clone, Copy, DekuWrite)]
pub struct ResValueChunk {
    pub size: u16,
    // Always 0
    pub res0: u8,
    pub data_type: u8,
    pub data: u32
}

impl ResValueChunk {
    pub fn new(data_type: u8, data: u32) -> Self {
        ResValueChunk {
            size: 8,
            res0: 0,
            data_type,
            data
        }
    }
}

// Res_value data types understood by the loader
pub const DATA_TYPE_NULL: u8 = 0x00;
pub const DATA_TYPE_REFERENCE: u8 = 0x01;
pub const DATA_TYPE_ATTRIBUTE: u8 = 0x02;
pub const DATA_TYPE_STRING: u8 = 0x03;
pub const DATA_TYPE_FLOAT: u8 = 0x04;
pub const DATA_TYPE_DIMENSION: u8 = 0x05;
pub const DATA_TYPE_FRACTION: u8 = 0x06;
pub const DATA_TYPE_DYNAMIC_REFERENCE: u8 = 0x07;
pub const DATA_TYPE_DYNAMIC_ATTRIBUTE: u8 = 0x08;
pub const DATA_TYPE_INT_DEC: u8 = 0x10;
pub const DATA_TYPE_INT_HEX: u8 = 0x11;
pub const DATA_TYPE_INT_BOOLEAN: u8 = 0x12;
pub const DATA_TYPE_INT_COLOR_ARGB8: u8 = 0x1c;
pub const DATA_TYPE_INT_COLOR_RGB8: u8 = 0x1d;
pub const DATA_TYPE_INT_COLOR_ARGB4: u8 = 0x1e;
pub const DATA_TYPE_INT_COLOR_RGB4: u8 = 0x1f;

/// One key+value pair inside a complex entry.
#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableMapChunk {
    pub name: u32,
    pub value: ResValueChunk
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableLibraryChunk {
    pub entry_count: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableLibraryEntry {
    pub package_id: u32,
    // This is always 128 u16s (256 bytes) long, NUL-padded.
    pub package_name: Vec<u16>
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableOverlayableChunk {
    // Both fixed at 256 u16s, NUL-padded.
    pub name: Vec<u16>,
    pub actor: Vec<u16>
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableOverlayablePolicyChunk {
    pub policy_flags: u32,
    pub entry_count: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableStagedAliasChunk {
    pub count: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableStagedAliasEntry {
    pub staged_id: u32,
    pub finalized_id: u32
}

/// Header of the extended-format visibility chunk, one per type.
#[derive(Debug, PartialEq, DekuWrite)]
pub struct TablePublicChunk {
    pub id: u8,
    pub res0: u8,
    pub res1: u16,
    pub entry_count: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TablePublicEntry {
    pub entry_id: u32,
    pub key: u32,
    pub source_path: u32,
    pub source_line: u32,
    pub state: u32
}

/// Header of the extended-format symbols chunk, written once per table
/// after package concatenation.
#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableSymbolsChunk {
    pub count: u32
}

#[derive(Debug, PartialEq, DekuWrite)]
pub struct TableSymbolEntry {
    pub resource_id: u32,
    pub offset: u32
}

pub const STRING_POOL_SORTED_FLAG: u32 = 1 << 0;
pub const STRING_POOL_UTF8_FLAG: u32 = 1 << 8;

#[derive(Debug, PartialEq, DekuWrite)]
pub struct StringPoolHeader {
    pub string_count: u32,
    pub style_count: u32,
    pub flags: u32,
    pub strings_start: u32,
    pub styles_start: u32
}

/// Pads `text` out to a fixed-width NUL-terminated UTF-16 buffer of `width`
/// code units, as used by package and overlayable chunk name fields.
/// Returns None when the name (plus terminator) does not fit.
pub fn fixed_utf16(text: &str, width: usize) -> Option<Vec<u16>> {
    let utf16: Vec<u16> = text.encode_utf16().collect();
    if utf16.len() >= width {
        return None;
    }
    let mut out = vec![0u16; width];
    out[..utf16.len()].copy_from_slice(&utf16);
    Some(out)
}
