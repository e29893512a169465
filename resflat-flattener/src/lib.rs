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

//! # RESFLAT
//!
//! Serialises an in-memory, fully-linked resource table (packages, types,
//! entries, per-configuration values) into the compact binary chunk format
//! a runtime loader maps and queries without deserialising it.
//!
//! ```no_run
//! use resflat_common::Diagnostics;
//! use resflat_flattener::{flatten_resource_table, TableFlattenerOptions};
//! use resflat_flattener::resource_internal_types::ResourceTable;
//!
//! let table = ResourceTable::new();
//! let mut diagnostics = Diagnostics::new();
//! let _bytes = flatten_resource_table(
//!     &table,
//!     &TableFlattenerOptions::default(),
//!     &mut diagnostics
//! )?;
//! # Ok::<(), resflat_common::FlatError>(())
//! ```

pub mod chunk_writer;
pub mod config_description;
pub mod entry_writer;
pub mod resource_external_types;
pub mod resource_internal_types;
pub mod resource_table;
pub mod string_pool;
pub mod type_flattener;

pub use resource_table::flatten_resource_table;

/// Whether type chunks may use the sparse entry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SparseEntriesMode {
    /// Always dense.
    #[default]
    Disabled,
    /// Sparse when the runtime floor allows it and the type is mostly
    /// holes in the configuration being encoded.
    Enabled,
    /// Sparse whenever the offsets fit the 16-bit form, regardless of
    /// density.
    Forced
}

/// Policy knobs for one flatten invocation. Upstream CLI/config layers set
/// these; the flattener itself has no flag surface.
#[derive(Debug, Clone)]
pub struct TableFlattenerOptions {
    pub use_sparse_entries: SparseEntriesMode,
    /// Populated-to-total percentage below which a sparse index pays off.
    /// Tuned against the real loader, not derived; see the docs on
    /// [type_flattener::SDK_SPARSE_FLOOR].
    pub sparse_threshold_percent: u32,
    /// Lowest SDK level the output must stay loadable on. Zero means
    /// unconstrained.
    pub min_sdk_version: u32,
    /// Fold scalar values into their entry headers where legal, and halve
    /// dense index slots when offsets allow.
    pub compact_entries: bool,
    /// Reuse the bytes of identical scalar entries within one values blob.
    pub deduplicate_entries: bool,
    /// Emit the visibility, symbol and source-path chunks debug builds
    /// consume.
    pub use_extended_chunks: bool,
    /// Flatten string pools as UTF-16 instead of UTF-8.
    pub utf16_string_pools: bool,
    /// The table being flattened is a shared library: full package names
    /// are required and the package registers itself for id remapping.
    pub shared_library: bool
}

impl Default for TableFlattenerOptions {
    fn default() -> Self {
        TableFlattenerOptions {
            use_sparse_entries: SparseEntriesMode::Disabled,
            sparse_threshold_percent: 25,
            min_sdk_version: 0,
            compact_entries: false,
            deduplicate_entries: false,
            use_extended_chunks: false,
            utf16_string_pools: false,
            shared_library: false
        }
    }
}
