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

use deku::DekuContainerWrite;
use resflat_common::Result;

use crate::resource_external_types::{ChunkType, ResChunkHeader, RES_CHUNK_HEADER_SIZE};

/// Handle for a chunk whose total-size field has not been patched yet.
/// Must be passed back to [ChunkWriter::finish_chunk]; chunks nest, and a
/// child must be finished before its parent.
#[must_use]
pub struct OpenChunk {
    start: usize
}

impl OpenChunk {
    /// Buffer offset at which this chunk's common header begins.
    pub fn start(&self) -> usize {
        self.start
    }
}

/// Cursor over a growable output buffer that reserves, tags and
/// length-patches self-describing chunk headers.
///
/// The common header is stamped with the chunk type and the size of the
/// type-specific header immediately; the total-size field stays zero until
/// `finish_chunk` measures the chunk (including any nested children) and
/// patches it in. Misuse (finishing a parent before its child, patching
/// out of bounds) is a logic error in the caller and panics.
pub struct ChunkWriter<'a> {
    buffer: &'a mut Vec<u8>
}

impl<'a> ChunkWriter<'a> {
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        ChunkWriter { buffer }
    }

    /// Current write offset within the buffer.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    /// Direct access to the underlying buffer, for collaborators that
    /// append whole child chunks themselves (string pools).
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        self.buffer
    }

    /// Begins a chunk: writes the common header (type tag, header size,
    /// zero total size) followed by the serialised type-specific header.
    pub fn start_chunk<T: DekuContainerWrite>(
        &mut self,
        chunk_type: ChunkType,
        header: &T
    ) -> Result<OpenChunk> {
        let start = self.buffer.len();
        let header_bytes = header.to_bytes()?;
        let chunk_header = ResChunkHeader {
            chunk_type,
            header_size: RES_CHUNK_HEADER_SIZE as u16 + header_bytes.len() as u16,
            chunk_size: 0
        };
        self.buffer.extend(chunk_header.to_bytes()?);
        self.buffer.extend(header_bytes);
        Ok(OpenChunk { start })
    }

    /// Appends one serialisable value after the current write cursor.
    pub fn write<T: DekuContainerWrite>(&mut self, value: &T) -> Result<()> {
        self.buffer.extend(value.to_bytes()?);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Overwrites a previously-written little-endian u32 in place.
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.buffer[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Zero-pads the buffer up to the next 4-byte boundary.
    pub fn align(&mut self) {
        while self.buffer.len() % 4 != 0 {
            self.buffer.push(0);
        }
    }

    /// Aligns to 4 bytes and patches the chunk's total-size field with the
    /// distance from its start to the current cursor.
    pub fn finish_chunk(&mut self, chunk: OpenChunk) {
        self.align();
        let size = (self.buffer.len() - chunk.start) as u32;
        self.patch_u32(chunk.start + 4, size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_external_types::TableHeaderChunk;

    #[test]
    fn finish_patches_total_size_and_aligns() {
        let mut buffer = vec![];
        let mut writer = ChunkWriter::new(&mut buffer);
        let chunk = writer
            .start_chunk(ChunkType::Table, &TableHeaderChunk { package_count: 1 })
            .unwrap();
        writer.write_bytes(&[0xAA; 3]);
        writer.finish_chunk(chunk);

        // type + header_size
        assert_eq!(&buffer[..4], &[0x02, 0x00, 0x0C, 0x00]);
        // 8 header + 4 package_count + 3 data + 1 pad
        assert_eq!(&buffer[4..8], &16u32.to_le_bytes());
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer[15], 0);
    }

    #[test]
    fn nested_chunks_measure_children() {
        let mut buffer = vec![];
        let mut writer = ChunkWriter::new(&mut buffer);
        let outer = writer
            .start_chunk(ChunkType::Table, &TableHeaderChunk { package_count: 0 })
            .unwrap();
        let inner = writer
            .start_chunk(ChunkType::Null, &TableHeaderChunk { package_count: 0 })
            .unwrap();
        writer.write_u32(0xDEAD_BEEF);
        writer.finish_chunk(inner);
        writer.finish_chunk(outer);

        // inner: 8 + 4 + 4 = 16, starts at 12
        assert_eq!(&buffer[12 + 4..12 + 8], &16u32.to_le_bytes());
        // outer: 12 + 16 = 28
        assert_eq!(&buffer[4..8], &28u32.to_le_bytes());
    }

    #[test]
    fn patch_u32_rewrites_in_place() {
        let mut buffer = vec![];
        let mut writer = ChunkWriter::new(&mut buffer);
        writer.write_u32(0);
        writer.write_u32(7);
        writer.patch_u32(0, 42);
        assert_eq!(&buffer[..4], &42u32.to_le_bytes());
        assert_eq!(&buffer[4..], &7u32.to_le_bytes());
    }
}
