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

// Minimal conformant reader for the flattened chunk stream, just enough to
// verify round-trip properties from the outside.
#![allow(dead_code)]

use resflat_flattener::config_description::ConfigDescription;
use resflat_flattener::resource_internal_types::{
    BinaryPrimitive, ConfigValue, Item, ResourceEntry, ResourcePackage, ResourceTable,
    ResourceType, Value
};

pub const CHUNK_STRING_POOL: u16 = 0x0001;
pub const CHUNK_TABLE: u16 = 0x0002;
pub const CHUNK_PACKAGE: u16 = 0x0200;
pub const CHUNK_TYPE: u16 = 0x0201;
pub const CHUNK_TYPE_SPEC: u16 = 0x0202;
pub const CHUNK_LIBRARY: u16 = 0x0203;
pub const CHUNK_OVERLAYABLE: u16 = 0x0204;
pub const CHUNK_OVERLAYABLE_POLICY: u16 = 0x0205;
pub const CHUNK_STAGED_ALIAS: u16 = 0x0206;
pub const CHUNK_PUBLIC: u16 = 0x0207;
pub const CHUNK_SYMBOLS: u16 = 0x0209;

pub const DATA_TYPE_STRING: u8 = 0x03;
pub const DATA_TYPE_COLOR: u8 = 0x1c;
pub const DATA_TYPE_INT_DEC: u8 = 0x10;

pub fn u16_at(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(buffer[offset..offset + 2].try_into().unwrap())
}

pub fn u32_at(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buffer[offset..offset + 4].try_into().unwrap())
}

#[derive(Debug, Clone, Copy)]
pub struct Chunk {
    pub chunk_type: u16,
    pub start: usize,
    pub header_size: u16,
    pub size: u32
}

pub fn read_chunk(buffer: &[u8], start: usize) -> Chunk {
    Chunk {
        chunk_type: u16_at(buffer, start),
        start,
        header_size: u16_at(buffer, start + 2),
        size: u32_at(buffer, start + 4)
    }
}

/// Child chunks of `parent`, starting `body_offset` bytes into it (12 for
/// the table chunk, 288 for a package chunk, 1032 for an overlayable).
pub fn children(buffer: &[u8], parent: &Chunk, body_offset: usize) -> Vec<Chunk> {
    let mut out = vec![];
    let end = parent.start + parent.size as usize;
    let mut at = parent.start + body_offset;
    while at < end {
        let child = read_chunk(buffer, at);
        assert!(child.size >= 8, "corrupt child chunk at {}", at);
        out.push(child);
        at += child.size as usize;
    }
    assert_eq!(at, end, "children overrun parent chunk");
    out
}

pub fn find_children(buffer: &[u8], parent: &Chunk, body_offset: usize, chunk_type: u16) -> Vec<Chunk> {
    children(buffer, parent, body_offset)
        .into_iter()
        .filter(|c| c.chunk_type == chunk_type)
        .collect()
}

pub fn table_chunk(buffer: &[u8]) -> Chunk {
    let table = read_chunk(buffer, 0);
    assert_eq!(table.chunk_type, CHUNK_TABLE);
    assert_eq!(table.size as usize, buffer.len());
    table
}

pub fn packages(buffer: &[u8]) -> Vec<Chunk> {
    find_children(buffer, &table_chunk(buffer), 12, CHUNK_PACKAGE)
}

/// The table-wide value pool is the first child of the table chunk.
pub fn value_pool(buffer: &[u8]) -> Chunk {
    let first = children(buffer, &table_chunk(buffer), 12)[0];
    assert_eq!(first.chunk_type, CHUNK_STRING_POOL);
    first
}

/// Decodes a UTF-8 string pool chunk.
pub fn pool_strings(buffer: &[u8], pool: &Chunk) -> Vec<String> {
    assert_eq!(pool.chunk_type, CHUNK_STRING_POOL);
    let string_count = u32_at(buffer, pool.start + 8) as usize;
    let strings_start = u32_at(buffer, pool.start + 20) as usize;
    let indices = pool.start + 28;
    let data = pool.start + strings_start;

    (0..string_count)
        .map(|i| {
            let mut at = data + u32_at(buffer, indices + i * 4) as usize;
            // skip the char count
            at += if buffer[at] & 0x80 != 0 { 2 } else { 1 };
            let byte_len = if buffer[at] & 0x80 != 0 {
                let len = (((buffer[at] & 0x7F) as usize) << 8) | buffer[at + 1] as usize;
                at += 2;
                len
            } else {
                let len = buffer[at] as usize;
                at += 1;
                len
            };
            String::from_utf8(buffer[at..at + byte_len].to_vec()).unwrap()
        })
        .collect()
}

/// Decodes a NUL-terminated fixed-width UTF-16 field.
pub fn fixed_utf16_at(buffer: &[u8], offset: usize, width: usize) -> String {
    let mut units = vec![];
    for i in 0..width {
        let unit = u16_at(buffer, offset + i * 2);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16(&units).unwrap()
}

/// Looks an entry id up in a type chunk's index, handling all three
/// encodings, and returns its offset into the entries blob.
pub fn entry_offset(buffer: &[u8], type_chunk: &Chunk, entry_id: u16) -> Option<u32> {
    assert_eq!(type_chunk.chunk_type, CHUNK_TYPE);
    let flags = buffer[type_chunk.start + 9];
    let entry_count = u32_at(buffer, type_chunk.start + 12);
    let index = type_chunk.start + 84;
    if flags & 0x01 != 0 {
        // sparse: sorted (id, offset/4) pairs, entry_count of them
        for i in 0..entry_count as usize {
            if u16_at(buffer, index + i * 4) == entry_id {
                return Some(u16_at(buffer, index + i * 4 + 2) as u32 * 4);
            }
        }
        None
    } else if flags & 0x02 != 0 {
        if entry_id as u32 >= entry_count {
            return None;
        }
        match u16_at(buffer, index + entry_id as usize * 2) {
            0xFFFF => None,
            offset16 => Some(offset16 as u32 * 4)
        }
    } else {
        if entry_id as u32 >= entry_count {
            return None;
        }
        match u32_at(buffer, index + entry_id as usize * 4) {
            0xFFFF_FFFF => None,
            offset => Some(offset)
        }
    }
}

/// Reads back a scalar entry: (flags, data type, datum). Handles both the
/// full and the compact entry forms.
pub fn entry_value(buffer: &[u8], type_chunk: &Chunk, entry_id: u16) -> Option<(u16, u8, u32)> {
    let offset = entry_offset(buffer, type_chunk, entry_id)?;
    let entries_start = u32_at(buffer, type_chunk.start + 16) as usize;
    let at = type_chunk.start + entries_start + offset as usize;
    let flags = u16_at(buffer, at + 2);
    if flags & 0x0008 != 0 {
        // compact: key in the size slot, data type in the flag high byte
        Some((flags, (flags >> 8) as u8, u32_at(buffer, at + 4)))
    } else {
        assert_eq!(flags & 0x0001, 0, "entry {} is complex, not scalar", entry_id);
        Some((flags, buffer[at + 11], u32_at(buffer, at + 12)))
    }
}

/// Orientation byte of the type chunk's embedded configuration, enough to
/// tell default from landscape in tests.
pub fn type_chunk_orientation(buffer: &[u8], type_chunk: &Chunk) -> u8 {
    buffer[type_chunk.start + 32]
}

pub fn type_chunk_id(buffer: &[u8], type_chunk: &Chunk) -> u8 {
    buffer[type_chunk.start + 8]
}

// Model-building helpers shared by the test files.

pub fn color_value(argb: u32) -> Value {
    Value::Item(Item::Primitive(BinaryPrimitive::new(DATA_TYPE_COLOR, argb)))
}

pub fn string_value(text: &str) -> Value {
    Value::Item(Item::String(text.to_string()))
}

pub fn landscape() -> ConfigDescription {
    ConfigDescription {
        orientation: 2,
        ..Default::default()
    }
}

pub fn entry_with_values(name: &str, id: u16, values: Vec<(ConfigDescription, Value)>) -> ResourceEntry {
    let mut entry = ResourceEntry::new(name, id);
    for (config, value) in values {
        entry.values.push(ConfigValue::new(config, value));
    }
    entry
}

pub fn single_type_table(type_name: &str, type_id: u8, entries: Vec<ResourceEntry>) -> ResourceTable {
    let mut resource_type = ResourceType::new(type_name, type_id);
    resource_type.entries = entries;
    let mut package = ResourcePackage::new("com.example.app", 0x7F);
    package.types.push(resource_type);
    let mut table = ResourceTable::new();
    table.packages.push(package);
    table
}
