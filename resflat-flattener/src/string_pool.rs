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

use resflat_common::{FlatError, Result};

use crate::{
    chunk_writer::ChunkWriter,
    config_description::ConfigDescription,
    resource_external_types::{ChunkType, StringPoolHeader, STRING_POOL_UTF8_FLAG}
};

/// Sort priority for ordinary value strings.
pub const PRIORITY_NORMAL: u32 = 0x7FFF_FFFF;
/// Sort priority for file-reference paths; clustering them ahead of other
/// values improves downstream compressibility.
pub const PRIORITY_FILE_PATH: u32 = 1;

#[derive(Debug, Clone)]
struct PoolEntry {
    text: String,
    priority: u32,
    // Lowest-ordering configuration that referenced the string; None when
    // no configuration context was ever supplied.
    config: Option<ConfigDescription>,
    ref_count: usize
}

/// Interning table mapping strings to dense indices, flattened once into
/// its own chunk.
///
/// Indices handed out by `make_ref` are stable until [sort](StringPool::sort)
/// runs; `flatten` must only be called once every ref has been taken, since
/// serialisation fixes the final order.
#[derive(Debug, Default, Clone)]
pub struct StringPool {
    entries: Vec<PoolEntry>,
    lookup: HashMap<String, usize>
}

impl StringPool {
    pub fn new() -> Self {
        StringPool::default()
    }

    /// Interns `text` and returns its dense index, creating an entry on
    /// first use.
    pub fn make_ref(&mut self, text: &str) -> u32 {
        self.make_ref_impl(text, PRIORITY_NORMAL, None)
    }

    /// Interns `text` carrying a sort priority and the configuration it
    /// was referenced from. Repeated refs keep the lowest priority and
    /// configuration seen.
    pub fn make_ref_with_context(
        &mut self,
        text: &str,
        priority: u32,
        config: &ConfigDescription
    ) -> u32 {
        self.make_ref_impl(text, priority, Some(config.clone()))
    }

    fn make_ref_impl(&mut self, text: &str, priority: u32, config: Option<ConfigDescription>) -> u32 {
        if let Some(&index) = self.lookup.get(text) {
            let entry = &mut self.entries[index];
            entry.ref_count += 1;
            entry.priority = entry.priority.min(priority);
            if let Some(new) = config {
                let keep_old = matches!(&entry.config, Some(old) if *old <= new);
                if !keep_old {
                    entry.config = Some(new);
                }
            }
            return index as u32;
        }
        let index = self.entries.len();
        self.entries.push(PoolEntry {
            text: text.to_string(),
            priority,
            config,
            ref_count: 1
        });
        self.lookup.insert(text.to_string(), index);
        index as u32
    }

    /// Returns the current index of an already-interned string.
    pub fn index_of(&self, text: &str) -> Option<u32> {
        self.lookup.get(text).map(|i| *i as u32)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears every ref count so a fresh collection pass can decide which
    /// entries are still in use before [prune](StringPool::prune).
    pub fn reset_refs(&mut self) {
        for entry in &mut self.entries {
            entry.ref_count = 0;
        }
    }

    /// Drops entries nothing has referenced since the last `reset_refs`.
    pub fn prune(&mut self) {
        self.entries.retain(|e| e.ref_count > 0);
        self.rebuild_lookup();
    }

    /// Sorts by (priority, configuration, content) so semantically-grouped
    /// strings cluster and identical logical input yields byte-identical
    /// pools. Invalidates previously handed-out indices.
    pub fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| a.config.cmp(&b.config))
                    .then_with(|| a.text.cmp(&b.text))
            });
        self.rebuild_lookup();
    }

    fn rebuild_lookup(&mut self) {
        self.lookup = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.text.clone(), i))
            .collect();
    }

    /// Serialises the whole pool as a self-contained chunk, UTF-8 or
    /// UTF-16 as selected by the caller.
    pub fn flatten(&self, buffer: &mut Vec<u8>, utf8: bool) -> Result<()> {
        let mut indices: Vec<u32> = Vec::with_capacity(self.entries.len());
        let mut string_data: Vec<u8> = vec![];
        for entry in &self.entries {
            indices.push(string_data.len() as u32);
            if utf8 {
                encode_utf8_string(&entry.text, &mut string_data)?;
            } else {
                encode_utf16_string(&entry.text, &mut string_data);
            }
        }

        let header_and_indices = 0x1C + 4 * self.entries.len() as u32;
        let header = StringPoolHeader {
            string_count: self.entries.len() as u32,
            style_count: 0,
            flags: if utf8 { STRING_POOL_UTF8_FLAG } else { 0 },
            strings_start: header_and_indices,
            styles_start: 0
        };

        let mut writer = ChunkWriter::new(buffer);
        let chunk = writer.start_chunk(ChunkType::StringPool, &header)?;
        for index in indices {
            writer.write_u32(index);
        }
        writer.write_bytes(&string_data);
        writer.finish_chunk(chunk);
        Ok(())
    }
}

// Length-prefixed UTF-8 form: character count then byte count, each a
// single byte or a two-byte 0x80-high-bit pair, then the bytes and a NUL.
fn encode_utf8_string(text: &str, out: &mut Vec<u8>) -> Result<()> {
    if text.len() > 0x7FFF {
        // The UTF-16 form has wider length encoding, but falling back per
        // string would make pool flags lie. Bail like AAPT's UTF-8 path.
        return Err(FlatError::StringPoolStringTooLong(text.to_string()));
    }
    let char_count = text.chars().count();
    let byte_count = text.len();
    if char_count > 0x7F {
        out.push(0x80 | ((char_count >> 8) & 0x7F) as u8);
    }
    out.push((char_count & 0xFF) as u8);
    if byte_count > 0x7F {
        out.push(0x80 | ((byte_count >> 8) & 0x7F) as u8);
    }
    out.push((byte_count & 0xFF) as u8);
    out.extend(text.bytes());
    out.push(0);
    Ok(())
}

// Length-prefixed UTF-16LE form: unit count as one u16 or a two-u16
// 0x8000-high-bit pair, then the code units and a u16 NUL.
fn encode_utf16_string(text: &str, out: &mut Vec<u8>) {
    let units: Vec<u16> = text.encode_utf16().collect();
    if units.len() > 0x7FFF {
        let high = 0x8000 | ((units.len() >> 16) & 0x7FFF) as u16;
        out.extend(high.to_le_bytes());
    }
    out.extend(((units.len() & 0xFFFF) as u16).to_le_bytes());
    for unit in units {
        out.extend(unit.to_le_bytes());
    }
    out.extend(0u16.to_le_bytes());
}
