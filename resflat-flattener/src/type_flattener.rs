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

use std::collections::BTreeMap;

use log::debug;
use resflat_common::Result;

use crate::{
    chunk_writer::ChunkWriter,
    config_description::ConfigDescription,
    entry_writer::{DedupingEntryWriter, EntryWriter, FlatEntry, SequentialEntryWriter},
    resource_external_types::*,
    resource_internal_types::{ResourceEntry, VisibilityLevel},
    string_pool::StringPool,
    SparseEntriesMode, TableFlattenerOptions
};

/// First SDK level whose loader understands sparse type chunks. Kept as a
/// named constant because the eligibility policy is tuned against the real
/// runtime rather than derived from first principles.
pub const SDK_SPARSE_FLOOR: u32 = 26;

/// What one flattened (type, configuration) chunk ended up containing.
/// Offsets are relative to the chunk's entries blob; the package encoder
/// turns them into table-relative symbol offsets for extended builds.
pub struct TypeChunkInfo {
    pub chunk_start: usize,
    pub entries_start: u32,
    pub entry_offsets: BTreeMap<u16, u32>
}

/// Emits the per-type configuration-axis masks: one dense u32 slot per
/// entry id, independent of configuration.
pub fn flatten_type_spec(
    writer: &mut ChunkWriter,
    type_id: u8,
    entry_slots: &[Option<&ResourceEntry>]
) -> Result<()> {
    let header = TableTypeSpecChunk {
        id: type_id,
        res0: 0,
        types_count: 0,
        entry_count: entry_slots.len() as u32
    };
    let chunk = writer.start_chunk(ChunkType::TableTypeSpec, &header)?;
    for slot in entry_slots {
        writer.write_u32(slot.map_or(0, spec_flags));
    }
    writer.finish_chunk(chunk);
    Ok(())
}

// O(configs^2) per entry, acceptable because configs-per-entry stays small.
fn spec_flags(entry: &ResourceEntry) -> u32 {
    let mut flags = 0;
    if entry.visibility.level == VisibilityLevel::Public {
        flags |= SPEC_PUBLIC;
    }
    if entry.visibility.staged_api {
        flags |= SPEC_STAGED_API;
    }
    for (i, a) in entry.values.iter().enumerate() {
        for b in entry.values.iter().skip(i + 1) {
            flags |= a.config.diff(&b.config);
        }
    }
    flags
}

/// Emits one type chunk for a (type, configuration) pair: the config
/// descriptor, an index from entry id to values-blob offset, and the blob
/// itself. The index encoding is chosen here.
pub fn flatten_type_chunk(
    writer: &mut ChunkWriter,
    type_id: u8,
    config: &ConfigDescription,
    type_entry_count: u32,
    flat_entries: &[FlatEntry],
    value_pool: &mut StringPool,
    options: &TableFlattenerOptions
) -> Result<TypeChunkInfo> {
    // Compact entries are only legal when every key index in this batch
    // fits 16 bits; maps keep the extended form either way.
    let compact = options.compact_entries && flat_entries.iter().all(|f| f.entry_key <= 0xFFFF);

    let mut sequential;
    let mut deduping;
    let entry_writer: &mut dyn EntryWriter = if options.deduplicate_entries {
        deduping = DedupingEntryWriter::new(compact);
        &mut deduping
    } else {
        sequential = SequentialEntryWriter::new(compact);
        &mut sequential
    };

    let mut entry_offsets: BTreeMap<u16, u32> = BTreeMap::new();
    for flat in flat_entries {
        let entry_id = flat.entry.id.expect("entry ids are validated before flattening");
        let offset = entry_writer.write_entry(flat, value_pool)?;
        entry_offsets.insert(entry_id, offset);
    }
    let blob = entry_writer.bytes().to_vec();

    let offsets_fit_16 = entry_offsets.values().all(|offset| offset / 4 < NO_ENTRY16 as u32);
    let sparse = offsets_fit_16
        && match options.use_sparse_entries {
            SparseEntriesMode::Forced => true,
            SparseEntriesMode::Enabled => {
                sparse_api_ok(options, config)
                    && type_entry_count > 0
                    && (entry_offsets.len() as u32 * 100 / type_entry_count)
                        < options.sparse_threshold_percent
            }
            SparseEntriesMode::Disabled => false
        };
    let offset16 = !sparse && compact && offsets_fit_16;

    let mut flags = 0;
    let index_bytes;
    if sparse {
        flags |= TYPE_FLAG_SPARSE;
        index_bytes = entry_offsets.len() * 4;
    } else if offset16 {
        flags |= TYPE_FLAG_OFFSET16;
        index_bytes = type_entry_count as usize * 2;
    } else {
        index_bytes = type_entry_count as usize * 4;
    }
    debug!(
        "type 0x{:02x}: {} of {} entries, sparse={} offset16={}",
        type_id,
        entry_offsets.len(),
        type_entry_count,
        sparse,
        offset16
    );

    let entries_start = TYPE_CHUNK_HEADER_SIZE + index_bytes as u32 + pad4(index_bytes);
    let header = TableTypeChunk {
        id: type_id,
        flags,
        reserved: 0,
        // Sparse chunks report how many index pairs follow; dense chunks
        // report the type-wide slot count.
        entry_count: if sparse {
            entry_offsets.len() as u32
        } else {
            type_entry_count
        },
        entries_start,
        config: config.clone()
    };
    let chunk = writer.start_chunk(ChunkType::TableType, &header)?;
    let chunk_start = chunk.start();

    if sparse {
        // Sorted (entry id, offset/4) pairs; lookup is a binary search.
        for (&entry_id, &offset) in &entry_offsets {
            writer.write_u16(entry_id);
            writer.write_u16((offset / 4) as u16);
        }
    } else if offset16 {
        for slot in 0..type_entry_count {
            match entry_offsets.get(&(slot as u16)) {
                Some(&offset) => writer.write_u16((offset / 4) as u16),
                None => writer.write_u16(NO_ENTRY16)
            }
        }
    } else {
        for slot in 0..type_entry_count {
            match entry_offsets.get(&(slot as u16)) {
                Some(&offset) => writer.write_u32(offset),
                None => writer.write_u32(NO_ENTRY)
            }
        }
    }
    writer.align();
    debug_assert_eq!(writer.position() - chunk_start, entries_start as usize);

    writer.write_bytes(&blob);
    writer.finish_chunk(chunk);

    Ok(TypeChunkInfo {
        chunk_start,
        entries_start,
        entry_offsets
    })
}

// Common header + type chunk fields + 64-byte config descriptor.
const TYPE_CHUNK_HEADER_SIZE: u32 = RES_CHUNK_HEADER_SIZE + 12 + 64;

fn pad4(len: usize) -> u32 {
    ((4 - len % 4) % 4) as u32
}

fn sparse_api_ok(options: &TableFlattenerOptions, config: &ConfigDescription) -> bool {
    options.min_sdk_version >= SDK_SPARSE_FLOOR
        || (options.min_sdk_version == 0 && config.sdk_version == 0)
}
