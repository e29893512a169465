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

use std::collections::HashMap;

use deku::DekuContainerWrite;
use log::trace;
use resflat_common::{FlatError, Result};

use crate::{
    resource_external_types::*,
    resource_internal_types::{
        Array, Attribute, Item, Plural, Quantity, Reference, ReferenceKind, ResourceEntry, Style,
        Styleable, Value, VisibilityLevel
    },
    string_pool::StringPool
};

/// One fully-resolved (entry, value) pair queued for serialisation, with
/// the entry name already interned in the package key pool.
pub struct FlatEntry<'a> {
    pub entry: &'a ResourceEntry,
    pub value: &'a Value,
    pub entry_key: u32
}

/// Serialises flat entries into a values blob and reports the offset each
/// one was written at. Offsets are only meaningful within one writer, so a
/// fresh writer is used per (type, configuration) blob.
pub trait EntryWriter {
    fn write_entry(&mut self, flat: &FlatEntry, value_pool: &mut StringPool) -> Result<u32>;

    fn bytes(&self) -> &[u8];
}

/// Writes every entry sequentially, identical blocks included.
pub struct SequentialEntryWriter {
    out: Vec<u8>,
    compact: bool
}

impl SequentialEntryWriter {
    pub fn new(compact: bool) -> Self {
        SequentialEntryWriter {
            out: vec![],
            compact
        }
    }
}

impl EntryWriter for SequentialEntryWriter {
    fn write_entry(&mut self, flat: &FlatEntry, value_pool: &mut StringPool) -> Result<u32> {
        let offset = self.out.len() as u32;
        match flat.value {
            Value::Item(item) => {
                serialize_item_block(flat, item, self.compact, value_pool, &mut self.out)?
            }
            _ => serialize_map_block(flat, value_pool, &mut self.out)?
        }
        Ok(offset)
    }

    fn bytes(&self) -> &[u8] {
        &self.out
    }
}

/// Deduplicates scalar item blocks by exact byte content: a block whose
/// serialised header+value bytes match an earlier one reuses that offset.
/// Compound values are never deduplicated.
pub struct DedupingEntryWriter {
    out: Vec<u8>,
    compact: bool,
    seen: HashMap<Vec<u8>, u32>,
    hits: usize
}

impl DedupingEntryWriter {
    pub fn new(compact: bool) -> Self {
        DedupingEntryWriter {
            out: vec![],
            compact,
            seen: HashMap::new(),
            hits: 0
        }
    }

    pub fn dedup_hits(&self) -> usize {
        self.hits
    }
}

impl EntryWriter for DedupingEntryWriter {
    fn write_entry(&mut self, flat: &FlatEntry, value_pool: &mut StringPool) -> Result<u32> {
        let item = match flat.value {
            Value::Item(item) => item,
            _ => {
                let offset = self.out.len() as u32;
                serialize_map_block(flat, value_pool, &mut self.out)?;
                return Ok(offset);
            }
        };

        // Serialise into a scratch block first so a duplicate never has to
        // be backed out of the real buffer.
        let mut block = vec![];
        serialize_item_block(flat, item, self.compact, value_pool, &mut block)?;
        if let Some(&offset) = self.seen.get(&block) {
            self.hits += 1;
            trace!("entry '{}' deduplicated to offset {}", flat.entry.name, offset);
            return Ok(offset);
        }
        let offset = self.out.len() as u32;
        self.out.extend_from_slice(&block);
        self.seen.insert(block, offset);
        Ok(offset)
    }

    fn bytes(&self) -> &[u8] {
        &self.out
    }
}

fn entry_flags(flat: &FlatEntry, weak: bool) -> u16 {
    let mut flags = 0;
    if flat.entry.visibility.level == VisibilityLevel::Public {
        flags |= ENTRY_FLAG_PUBLIC;
    }
    if weak {
        flags |= ENTRY_FLAG_WEAK;
    }
    flags
}

fn serialize_item_block(
    flat: &FlatEntry,
    item: &Item,
    compact: bool,
    value_pool: &mut StringPool,
    out: &mut Vec<u8>
) -> Result<()> {
    let value = flatten_item(item, value_pool)?;
    let flags = entry_flags(flat, item.is_weak());
    if compact {
        // The caller has verified every key in the batch fits 16 bits.
        let compact_entry = TableEntryCompact {
            key: flat.entry_key as u16,
            flags: flags | ENTRY_FLAG_COMPACT | ((value.data_type as u16) << 8),
            data: value.data
        };
        out.extend(compact_entry.to_bytes()?);
    } else {
        let header = TableEntry {
            size: 8,
            flags,
            key: flat.entry_key
        };
        out.extend(header.to_bytes()?);
        out.extend(value.to_bytes()?);
    }
    Ok(())
}

fn serialize_map_block(flat: &FlatEntry, value_pool: &mut StringPool, out: &mut Vec<u8>) -> Result<()> {
    let mut parent = 0;
    let pairs = match flat.value {
        Value::Item(_) => unreachable!("scalar handled by serialize_item_block"),
        Value::Attribute(attribute) => flatten_attribute(attribute)?,
        Value::Style(style) => {
            if let Some(style_parent) = &style.parent {
                parent = style_parent
                    .id
                    .ok_or_else(|| FlatError::StyleParentWithoutId(flat.entry.name.clone()))?;
            }
            flatten_style(flat, style, value_pool)?
        }
        Value::Array(array) => flatten_array(array, value_pool)?,
        Value::Plural(plural) => flatten_plural(plural, value_pool)?,
        Value::Styleable(styleable) => flatten_styleable(styleable)?
    };

    let header = TableEntry {
        size: 16,
        flags: entry_flags(flat, false) | ENTRY_FLAG_COMPLEX,
        key: flat.entry_key
    };
    let ext = TableMapEntryExt {
        parent,
        count: pairs.len() as u32
    };
    out.extend(header.to_bytes()?);
    out.extend(ext.to_bytes()?);
    for pair in pairs {
        out.extend(pair.to_bytes()?);
    }
    Ok(())
}

/// Converts one scalar item into its 8-byte typed form. By this stage all
/// values are link-resolved, so an unresolved reference is a contract
/// breach reported as an error.
pub fn flatten_item(item: &Item, value_pool: &mut StringPool) -> Result<ResValueChunk> {
    Ok(match item {
        Item::Reference(reference) => flatten_reference(reference)?,
        Item::String(text) | Item::RawString(text) | Item::StyledString(text) => {
            ResValueChunk::new(DATA_TYPE_STRING, value_pool.make_ref(text))
        }
        Item::FileReference(path) => ResValueChunk::new(DATA_TYPE_STRING, value_pool.make_ref(path)),
        Item::Id => ResValueChunk::new(DATA_TYPE_INT_BOOLEAN, 0),
        Item::Primitive(primitive) => ResValueChunk::new(primitive.data_type, primitive.data)
    })
}

fn flatten_reference(reference: &Reference) -> Result<ResValueChunk> {
    let id = reference
        .id
        .ok_or_else(|| FlatError::UnresolvedReference(reference.name.clone()))?;
    let data_type = match (reference.kind, reference.dynamic) {
        (ReferenceKind::Resource, false) => DATA_TYPE_REFERENCE,
        (ReferenceKind::Resource, true) => DATA_TYPE_DYNAMIC_REFERENCE,
        (ReferenceKind::Attribute, false) => DATA_TYPE_ATTRIBUTE,
        (ReferenceKind::Attribute, true) => DATA_TYPE_DYNAMIC_ATTRIBUTE
    };
    Ok(ResValueChunk::new(data_type, id))
}

fn flatten_attribute(attribute: &Attribute) -> Result<Vec<TableMapChunk>> {
    let mut pairs = vec![TableMapChunk {
        name: ATTR_TYPE,
        value: ResValueChunk::new(DATA_TYPE_INT_DEC, attribute.format)
    }];
    if let Some(min) = attribute.min {
        pairs.push(TableMapChunk {
            name: ATTR_MIN,
            value: ResValueChunk::new(DATA_TYPE_INT_DEC, min)
        });
    }
    if let Some(max) = attribute.max {
        pairs.push(TableMapChunk {
            name: ATTR_MAX,
            value: ResValueChunk::new(DATA_TYPE_INT_DEC, max)
        });
    }
    if attribute.l10n_suggested {
        pairs.push(TableMapChunk {
            name: ATTR_L10N,
            value: ResValueChunk::new(DATA_TYPE_INT_DEC, 1)
        });
    }
    for symbol in &attribute.symbols {
        let id = symbol
            .reference
            .id
            .ok_or_else(|| FlatError::AttributeSymbolWithoutId(symbol.reference.name.clone()))?;
        pairs.push(TableMapChunk {
            name: id,
            value: ResValueChunk::new(DATA_TYPE_INT_DEC, symbol.value)
        });
    }
    Ok(pairs)
}

// The runtime resolves style attributes with a binary search over this
// order: keys with ids ascending, ids always ahead of unresolved names.
fn flatten_style(
    flat: &FlatEntry,
    style: &Style,
    value_pool: &mut StringPool
) -> Result<Vec<TableMapChunk>> {
    let mut sorted: Vec<_> = style.entries.iter().collect();
    sorted.sort_by(|a, b| match (a.key.id, b.key.id) {
        (Some(a_id), Some(b_id)) => a_id.cmp(&b_id),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.key.name.cmp(&b.key.name)
    });

    let mut pairs = Vec::with_capacity(sorted.len());
    for style_entry in sorted {
        let id = style_entry.key.id.ok_or_else(|| FlatError::StyleEntryWithoutId {
            style: flat.entry.name.clone(),
            attribute: style_entry.key.name.clone()
        })?;
        pairs.push(TableMapChunk {
            name: id,
            value: flatten_item(&style_entry.value, value_pool)?
        });
    }
    Ok(pairs)
}

fn flatten_array(array: &Array, value_pool: &mut StringPool) -> Result<Vec<TableMapChunk>> {
    array
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            Ok(TableMapChunk {
                name: ATTR_MIN + i as u32,
                value: flatten_item(item, value_pool)?
            })
        })
        .collect()
}

fn flatten_plural(plural: &Plural, value_pool: &mut StringPool) -> Result<Vec<TableMapChunk>> {
    let mut pairs = vec![];
    for quantity in Quantity::ALL {
        if let Some(item) = &plural.values[quantity.index()] {
            pairs.push(TableMapChunk {
                name: quantity.map_key(),
                value: flatten_item(item, value_pool)?
            });
        }
    }
    Ok(pairs)
}

fn flatten_styleable(styleable: &Styleable) -> Result<Vec<TableMapChunk>> {
    styleable
        .entries
        .iter()
        .map(|reference| {
            let id = reference
                .id
                .ok_or_else(|| FlatError::StyleableEntryWithoutId(reference.name.clone()))?;
            Ok(TableMapChunk {
                name: id,
                value: ResValueChunk::new(DATA_TYPE_REFERENCE, id)
            })
        })
        .collect()
}
