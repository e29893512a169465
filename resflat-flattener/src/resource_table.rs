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

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use resflat_common::{Diagnostics, FlatError, Result, Source};

use crate::{
    chunk_writer::ChunkWriter,
    config_description::ConfigDescription,
    entry_writer::FlatEntry,
    resource_external_types::*,
    resource_internal_types::{
        make_resource_id, Item, ResourceEntry, ResourcePackage, ResourceTable, ResourceType,
        Value, VisibilityLevel, APP_PACKAGE_ID, FRAMEWORK_PACKAGE_ID, SHARED_LIBRARY_PACKAGE_ID
    },
    string_pool::{StringPool, PRIORITY_FILE_PATH, PRIORITY_NORMAL},
    type_flattener::{flatten_type_chunk, flatten_type_spec},
    TableFlattenerOptions
};

// Byte offsets of the patched package chunk header fields, measured from
// the chunk start: 8 header + 4 id + 256 name.
const PACKAGE_TYPE_STRINGS_FIELD: usize = 268;
const PACKAGE_LAST_PUBLIC_TYPE_FIELD: usize = 272;
const PACKAGE_KEY_STRINGS_FIELD: usize = 276;
const PACKAGE_LAST_PUBLIC_KEY_FIELD: usize = 280;

const PACKAGE_NAME_WIDTH: usize = 128;
const OVERLAYABLE_NAME_WIDTH: usize = 256;

/// Serialises a fully-linked resource table into its canonical binary
/// chunk stream.
///
/// The input graph is only read; the value string pool is copied, pruned
/// and sorted internally so repeated flattens of the same table stay
/// byte-identical. The first structural or validation error aborts the
/// whole operation; everything pushed to `diagnostics` up to that point is
/// for the caller to surface.
pub fn flatten_resource_table(
    table: &ResourceTable,
    options: &TableFlattenerOptions,
    diagnostics: &mut Diagnostics
) -> Result<Vec<u8>> {
    let mut value_pool = table.value_pool.clone();
    value_pool.reset_refs();
    for package in &table.packages {
        for resource_type in &package.types {
            for entry in &resource_type.entries {
                for config_value in &entry.values {
                    collect_value_strings(&config_value.value, &config_value.config, &mut value_pool);
                }
            }
        }
    }
    value_pool.prune();
    value_pool.sort();
    debug!("value pool holds {} strings after prune+sort", value_pool.len());

    // Register id -> name mappings up front so an ambiguous reuse fails
    // before any package bytes exist.
    let mut package_ids: BTreeMap<u8, String> = table.referenced_packages.clone();
    for package in &table.packages {
        let id = package
            .id
            .ok_or_else(|| FlatError::MissingPackageId(package.name.clone()))?;
        if options.shared_library || id == APP_PACKAGE_ID || id == FRAMEWORK_PACKAGE_ID {
            continue;
        }
        match package_ids.get(&id) {
            Some(existing) if *existing != package.name => {
                let error = FlatError::ConflictingPackageId {
                    id,
                    existing: existing.clone(),
                    conflicting: package.name.clone()
                };
                diagnostics.error(error.to_string(), None);
                return Err(error);
            }
            _ => {
                package_ids.insert(id, package.name.clone());
            }
        }
    }

    let mut source_pool = StringPool::new();
    let mut package_buffers = vec![];
    let mut symbols: Vec<TableSymbolEntry> = vec![];
    for package in &table.packages {
        let flattener = PackageFlattener {
            package,
            package_id: package.id.unwrap_or(SHARED_LIBRARY_PACKAGE_ID),
            table,
            options,
            value_pool: &mut value_pool,
            source_pool: &mut source_pool,
            diagnostics
        };
        let (buffer, package_symbols) = flattener.flatten()?;
        package_buffers.push((buffer, package_symbols));
    }

    let mut out = vec![];
    let mut writer = ChunkWriter::new(&mut out);
    let table_chunk = writer.start_chunk(
        ChunkType::Table,
        &TableHeaderChunk {
            package_count: table.packages.len() as u32
        }
    )?;
    value_pool.flatten(writer.buffer_mut(), !options.utf16_string_pools)?;

    for (buffer, package_symbols) in package_buffers {
        // Symbol offsets were recorded package-relative; lift them to
        // table-relative now the concatenation base is known.
        let base = writer.position() as u32;
        for symbol in package_symbols {
            symbols.push(TableSymbolEntry {
                resource_id: symbol.resource_id,
                offset: symbol.offset + base
            });
        }
        writer.write_bytes(&buffer);
    }

    if options.use_extended_chunks {
        symbols.sort_by_key(|s| (s.resource_id, s.offset));
        let symbols_chunk = writer.start_chunk(
            ChunkType::TableSymbols,
            &TableSymbolsChunk {
                count: symbols.len() as u32
            }
        )?;
        for symbol in &symbols {
            writer.write(symbol)?;
        }
        writer.finish_chunk(symbols_chunk);
        source_pool.flatten(writer.buffer_mut(), !options.utf16_string_pools)?;
    }

    writer.finish_chunk(table_chunk);
    Ok(out)
}

// Every string a value can pull into the shared pool, with the sort
// context that clusters it: file paths first, then by configuration.
fn collect_value_strings(value: &Value, config: &ConfigDescription, pool: &mut StringPool) {
    match value {
        Value::Item(item) => collect_item_strings(item, config, pool),
        Value::Style(style) => {
            for entry in &style.entries {
                collect_item_strings(&entry.value, config, pool);
            }
        }
        Value::Array(array) => {
            for item in &array.items {
                collect_item_strings(item, config, pool);
            }
        }
        Value::Plural(plural) => {
            for item in plural.values.iter().flatten() {
                collect_item_strings(item, config, pool);
            }
        }
        // Attributes and styleables hold only references
        Value::Attribute(_) | Value::Styleable(_) => {}
    }
}

fn collect_item_strings(item: &Item, config: &ConfigDescription, pool: &mut StringPool) {
    match item {
        Item::String(text) | Item::RawString(text) | Item::StyledString(text) => {
            pool.make_ref_with_context(text, PRIORITY_NORMAL, config);
        }
        Item::FileReference(path) => {
            pool.make_ref_with_context(path, PRIORITY_FILE_PATH, config);
        }
        Item::Reference(_) | Item::Id | Item::Primitive(_) => {}
    }
}

// Per-type bookkeeping gathered while walking entries, flushed into
// chunks after all types are done.
#[derive(Default)]
struct OverlayableRecord {
    actor: String,
    source: Source,
    by_policy: BTreeMap<u32, BTreeSet<u32>>
}

struct PackageFlattener<'a> {
    package: &'a ResourcePackage,
    package_id: u8,
    table: &'a ResourceTable,
    options: &'a TableFlattenerOptions,
    value_pool: &'a mut StringPool,
    source_pool: &'a mut StringPool,
    diagnostics: &'a mut Diagnostics
}

impl<'a> PackageFlattener<'a> {
    fn flatten(mut self) -> Result<(Vec<u8>, Vec<TableSymbolEntry>)> {
        let name = self.validated_package_name()?;

        let mut buffer = vec![];
        let mut writer = ChunkWriter::new(&mut buffer);
        let package_chunk = writer.start_chunk(
            ChunkType::TablePackage,
            &TablePackageChunk {
                id: self.package_id as u32,
                name,
                type_string_offset: 0,
                last_public_type: 0,
                key_string_offset: 0,
                last_public_key: 0,
                type_id_offset: 0
            }
        )?;

        let mut type_pool = StringPool::new();
        let mut key_pool = StringPool::new();
        let mut symbols = vec![];
        let mut overlayables: BTreeMap<String, OverlayableRecord> = BTreeMap::new();
        let mut staged_aliases: Vec<TableStagedAliasEntry> = vec![];

        let mut types: Vec<&ResourceType> = self
            .package
            .types
            .iter()
            .filter(|t| t.emits_binary_chunks())
            .collect();
        for resource_type in &types {
            if resource_type.id.is_none() {
                return Err(FlatError::MissingTypeId {
                    package: self.package.name.clone(),
                    type_name: resource_type.name.clone()
                });
            }
        }
        types.sort_by_key(|t| t.id);

        let mut expected_id = 1;
        for resource_type in types {
            let type_id = resource_type.id.unwrap();
            // The loader indexes the type pool by raw type id, so gaps get
            // placeholder names to keep the array contiguous.
            while expected_id < type_id {
                type_pool.make_ref(&format!("?{}", expected_id));
                expected_id += 1;
            }
            expected_id = type_id + 1;
            type_pool.make_ref(&resource_type.name);

            self.flatten_type(
                &mut writer,
                resource_type,
                type_id,
                &mut key_pool,
                &mut symbols,
                &mut overlayables,
                &mut staged_aliases
            )?;
        }

        self.flatten_libraries(&mut writer)?;
        self.flatten_overlayables(&mut writer, overlayables)?;
        self.flatten_staged_aliases(&mut writer, staged_aliases)?;

        let package_start = package_chunk.start();
        let type_strings_offset = (writer.position() - package_start) as u32;
        type_pool.flatten(writer.buffer_mut(), !self.options.utf16_string_pools)?;
        let key_strings_offset = (writer.position() - package_start) as u32;
        key_pool.flatten(writer.buffer_mut(), !self.options.utf16_string_pools)?;

        writer.patch_u32(package_start + PACKAGE_TYPE_STRINGS_FIELD, type_strings_offset);
        writer.patch_u32(package_start + PACKAGE_LAST_PUBLIC_TYPE_FIELD, type_pool.len() as u32);
        writer.patch_u32(package_start + PACKAGE_KEY_STRINGS_FIELD, key_strings_offset);
        writer.patch_u32(package_start + PACKAGE_LAST_PUBLIC_KEY_FIELD, key_pool.len() as u32);
        writer.finish_chunk(package_chunk);

        Ok((buffer, symbols))
    }

    fn validated_package_name(&mut self) -> Result<Vec<u16>> {
        match fixed_utf16(&self.package.name, PACKAGE_NAME_WIDTH) {
            Some(name) => Ok(name),
            None => {
                // Shared libraries are looked up by name at load time, so
                // a truncated name would never resolve.
                if self.options.shared_library || self.package_id == SHARED_LIBRARY_PACKAGE_ID {
                    let error = FlatError::PackageNameTooLong(self.package.name.clone());
                    self.diagnostics.error(error.to_string(), None);
                    return Err(error);
                }
                // Truncate by UTF-16 units, not chars, so the result is
                // guaranteed to fit the fixed field.
                let mut truncated = String::new();
                let mut units = 0;
                for c in self.package.name.chars() {
                    if units + c.len_utf16() > PACKAGE_NAME_WIDTH - 1 {
                        break;
                    }
                    truncated.push(c);
                    units += c.len_utf16();
                }
                self.diagnostics.warn(
                    format!(
                        "package name '{}' is too long, truncated to '{}'",
                        self.package.name, truncated
                    ),
                    None
                );
                Ok(fixed_utf16(&truncated, PACKAGE_NAME_WIDTH)
                    .expect("truncated name fits the fixed field"))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn flatten_type(
        &mut self,
        writer: &mut ChunkWriter,
        resource_type: &ResourceType,
        type_id: u8,
        key_pool: &mut StringPool,
        symbols: &mut Vec<TableSymbolEntry>,
        overlayables: &mut BTreeMap<String, OverlayableRecord>,
        staged_aliases: &mut Vec<TableStagedAliasEntry>
    ) -> Result<()> {
        if resource_type.entries.len() > 0x10000 {
            return Err(FlatError::TooManyEntries {
                type_name: resource_type.name.clone(),
                count: resource_type.entries.len()
            });
        }

        // Dense slot array over the full id range of the type; holes stay
        // None so every chunk below shares one stable entry count.
        let mut max_id = None;
        for entry in &resource_type.entries {
            let id = entry.id.ok_or_else(|| FlatError::MissingEntryId {
                type_name: resource_type.name.clone(),
                entry_name: entry.name.clone()
            })?;
            max_id = Some(max_id.map_or(id, |m: u16| m.max(id)));
        }
        let entry_count = max_id.map_or(0, |m| m as u32 + 1);
        let mut slots: Vec<Option<&ResourceEntry>> = vec![None; entry_count as usize];
        for entry in &resource_type.entries {
            slots[entry.id.unwrap() as usize] = Some(entry);
        }

        flatten_type_spec(writer, type_id, &slots)?;
        if self.options.use_extended_chunks {
            self.flatten_public_chunk(writer, type_id, &slots, key_pool)?;
        }

        // Key refs are taken before any value is written so compact-mode
        // key indices are final.
        let mut entry_keys: BTreeMap<u16, u32> = BTreeMap::new();
        for &entry in slots.iter().flatten() {
            entry_keys.insert(entry.id.unwrap(), key_pool.make_ref(&entry.name));
        }

        let mut by_config: BTreeMap<ConfigDescription, Vec<FlatEntry>> = BTreeMap::new();
        for &entry in slots.iter().flatten() {
            let entry_id = entry.id.unwrap();
            self.collect_entry_metadata(resource_type, entry, type_id, entry_id, overlayables, staged_aliases)?;
            for config_value in &entry.values {
                by_config.entry(config_value.config.clone()).or_default().push(FlatEntry {
                    entry,
                    value: &config_value.value,
                    entry_key: entry_keys[&entry_id]
                });
            }
        }

        for (config, flat_entries) in &by_config {
            let info = flatten_type_chunk(
                writer,
                type_id,
                config,
                entry_count,
                flat_entries,
                self.value_pool,
                self.options
            )?;
            if self.options.use_extended_chunks {
                for (&entry_id, &offset) in &info.entry_offsets {
                    symbols.push(TableSymbolEntry {
                        resource_id: make_resource_id(self.package_id, type_id, entry_id),
                        offset: info.chunk_start as u32 + info.entries_start + offset
                    });
                }
            }
        }
        Ok(())
    }

    fn collect_entry_metadata(
        &mut self,
        resource_type: &ResourceType,
        entry: &ResourceEntry,
        type_id: u8,
        entry_id: u16,
        overlayables: &mut BTreeMap<String, OverlayableRecord>,
        staged_aliases: &mut Vec<TableStagedAliasEntry>
    ) -> Result<()> {
        let resource_id = make_resource_id(self.package_id, type_id, entry_id);

        if let Some(staged_id) = entry.staged_id {
            staged_aliases.push(TableStagedAliasEntry {
                staged_id,
                finalized_id: resource_id
            });
        }

        let membership = match &entry.overlayable {
            Some(membership) => membership,
            None => return Ok(())
        };
        let group = &self.table.overlayables[membership.group];
        if membership.policies == 0 {
            let error = FlatError::OverlayableWithoutPolicies {
                name: group.name.clone(),
                source: membership.source.clone()
            };
            self.diagnostics.error(
                format!(
                    "overlayable entry '{}/{}' declares no policies",
                    resource_type.name, entry.name
                ),
                Some(membership.source.clone())
            );
            return Err(error);
        }

        let record = overlayables.entry(group.name.clone()).or_insert_with(|| OverlayableRecord {
            actor: group.actor.clone(),
            source: group.source.clone(),
            by_policy: BTreeMap::new()
        });
        if record.actor != group.actor || record.source != group.source {
            let error = FlatError::ConflictingOverlayable {
                name: group.name.clone(),
                first: record.source.clone(),
                second: group.source.clone()
            };
            self.diagnostics.error(
                format!(
                    "overlayable '{}' re-declared with actor '{}', first declared at {}",
                    group.name, group.actor, record.source
                ),
                Some(group.source.clone())
            );
            return Err(error);
        }
        record
            .by_policy
            .entry(membership.policies)
            .or_default()
            .insert(resource_id);
        Ok(())
    }

    fn flatten_public_chunk(
        &mut self,
        writer: &mut ChunkWriter,
        type_id: u8,
        slots: &[Option<&ResourceEntry>],
        key_pool: &mut StringPool
    ) -> Result<()> {
        let visible: Vec<(u16, &ResourceEntry)> = slots
            .iter()
            .flatten()
            .filter(|e| e.visibility.level != VisibilityLevel::Undefined)
            .map(|e| (e.id.unwrap(), *e))
            .collect();
        if visible.is_empty() {
            return Ok(());
        }

        let chunk = writer.start_chunk(
            ChunkType::TablePublic,
            &TablePublicChunk {
                id: type_id,
                res0: 0,
                res1: 0,
                entry_count: visible.len() as u32
            }
        )?;
        for (entry_id, entry) in visible {
            let (source_path, source_line) = match &entry.visibility.source {
                Some(source) => (
                    self.source_pool.make_ref(&source.path),
                    source.line.unwrap_or(0)
                ),
                None => (self.source_pool.make_ref(""), 0)
            };
            let state = match entry.visibility.level {
                VisibilityLevel::Undefined => PUBLIC_STATE_UNDEFINED,
                VisibilityLevel::Private => PUBLIC_STATE_PRIVATE,
                VisibilityLevel::Public => PUBLIC_STATE_PUBLIC
            };
            writer.write(&TablePublicEntry {
                entry_id: entry_id as u32,
                key: key_pool.make_ref(&entry.name),
                source_path,
                source_line,
                state
            })?;
        }
        writer.finish_chunk(chunk);
        Ok(())
    }

    // Shared libraries register themselves under id 0x00; any package that
    // references other libraries lists them so the loader can remap ids.
    fn flatten_libraries(&mut self, writer: &mut ChunkWriter) -> Result<()> {
        let mut entries: Vec<(u8, &str)> = vec![];
        if self.package_id == SHARED_LIBRARY_PACKAGE_ID {
            entries.push((SHARED_LIBRARY_PACKAGE_ID, &self.package.name));
        }
        for (id, name) in &self.table.referenced_packages {
            entries.push((*id, name.as_str()));
        }
        if entries.is_empty() {
            return Ok(());
        }

        let chunk = writer.start_chunk(
            ChunkType::TableLibrary,
            &TableLibraryChunk {
                entry_count: entries.len() as u32
            }
        )?;
        for (id, name) in entries {
            let padded = fixed_utf16(name, PACKAGE_NAME_WIDTH)
                .ok_or_else(|| FlatError::PackageNameTooLong(name.to_string()))?;
            writer.write(&TableLibraryEntry {
                package_id: id as u32,
                package_name: padded
            })?;
        }
        writer.finish_chunk(chunk);
        Ok(())
    }

    fn flatten_overlayables(
        &mut self,
        writer: &mut ChunkWriter,
        overlayables: BTreeMap<String, OverlayableRecord>
    ) -> Result<()> {
        for (name, record) in overlayables {
            let padded_name = match fixed_utf16(&name, OVERLAYABLE_NAME_WIDTH) {
                Some(padded) => padded,
                None => {
                    let error = FlatError::OverlayableNameTooLong(name.clone());
                    self.diagnostics.error(error.to_string(), Some(record.source.clone()));
                    return Err(error);
                }
            };
            let padded_actor = match fixed_utf16(&record.actor, OVERLAYABLE_NAME_WIDTH) {
                Some(padded) => padded,
                None => {
                    let error = FlatError::OverlayableActorTooLong(record.actor.clone());
                    self.diagnostics.error(error.to_string(), Some(record.source.clone()));
                    return Err(error);
                }
            };

            let chunk = writer.start_chunk(
                ChunkType::TableOverlayable,
                &TableOverlayableChunk {
                    name: padded_name,
                    actor: padded_actor
                }
            )?;
            for (policies, resource_ids) in record.by_policy {
                let policy_chunk = writer.start_chunk(
                    ChunkType::TableOverlayablePolicy,
                    &TableOverlayablePolicyChunk {
                        policy_flags: policies,
                        entry_count: resource_ids.len() as u32
                    }
                )?;
                for resource_id in resource_ids {
                    writer.write_u32(resource_id);
                }
                writer.finish_chunk(policy_chunk);
            }
            writer.finish_chunk(chunk);
        }
        Ok(())
    }

    fn flatten_staged_aliases(
        &mut self,
        writer: &mut ChunkWriter,
        mut staged_aliases: Vec<TableStagedAliasEntry>
    ) -> Result<()> {
        if staged_aliases.is_empty() {
            return Ok(());
        }
        staged_aliases.sort_by_key(|a| a.staged_id);

        let chunk = writer.start_chunk(
            ChunkType::TableStagedAlias,
            &TableStagedAliasChunk {
                count: staged_aliases.len() as u32
            }
        )?;
        for alias in &staged_aliases {
            writer.write(alias)?;
        }
        writer.finish_chunk(chunk);
        Ok(())
    }
}
