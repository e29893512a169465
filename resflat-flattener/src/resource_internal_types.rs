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

// Types that are used internally to describe a resource table before it is
// flattened. The flattener only reads this graph; construction and id
// assignment happen upstream.
use std::collections::BTreeMap;

use resflat_common::Source;

use crate::{
    config_description::ConfigDescription,
    resource_external_types::{
        ATTR_FEW, ATTR_MANY, ATTR_ONE, ATTR_OTHER, ATTR_TWO, ATTR_ZERO
    },
    string_pool::StringPool
};

/// Conventional package id for application packages.
pub const APP_PACKAGE_ID: u8 = 0x7F;
/// Conventional package id for the framework package.
pub const FRAMEWORK_PACKAGE_ID: u8 = 0x01;
/// Reserved id meaning "shared library, remapped at load time".
pub const SHARED_LIBRARY_PACKAGE_ID: u8 = 0x00;

/// Builds the full 0xPPTTEEEE resource id from its three components.
pub fn make_resource_id(package: u8, type_id: u8, entry: u16) -> u32 {
    ((package as u32) << 24) | ((type_id as u32) << 16) | entry as u32
}

/// The fully-linked resource table handed to the flattener.
#[derive(Debug, Default)]
pub struct ResourceTable {
    pub packages: Vec<ResourcePackage>,
    /// Strings referenced by serialised values. The flattener re-collects,
    /// prunes and sorts this pool before any package is encoded.
    pub value_pool: StringPool,
    /// Numeric package id to package name, for every package referenced as
    /// a shared library.
    pub referenced_packages: BTreeMap<u8, String>,
    /// Arena of overlayable groups; entries refer to these by index so
    /// that "same group" is handle equality rather than pointer identity.
    pub overlayables: Vec<OverlayableGroup>
}

impl ResourceTable {
    pub fn new() -> Self {
        ResourceTable::default()
    }

    /// Registers an overlayable group and returns the handle entries store
    /// in their [OverlayableMembership].
    pub fn add_overlayable(&mut self, group: OverlayableGroup) -> usize {
        self.overlayables.push(group);
        self.overlayables.len() - 1
    }
}

#[derive(Debug)]
pub struct ResourcePackage {
    /// 0x00 is reserved for shared libraries, 0x7F is conventional for
    /// apps. Must be assigned before flattening.
    pub id: Option<u8>,
    pub name: String,
    pub types: Vec<ResourceType>
}

impl ResourcePackage {
    pub fn new(name: impl Into<String>, id: u8) -> Self {
        ResourcePackage {
            id: Some(id),
            name: name.into(),
            types: vec![]
        }
    }
}

#[derive(Debug)]
pub struct ResourceType {
    /// Must be assigned before flattening.
    pub id: Option<u8>,
    /// eg. `drawable`, `string`, `style`
    pub name: String,
    pub entries: Vec<ResourceEntry>
}

impl ResourceType {
    pub fn new(name: impl Into<String>, id: u8) -> Self {
        ResourceType {
            id: Some(id),
            name: name.into(),
            entries: vec![]
        }
    }

    /// Styleables and macros only exist in textual form; they never appear
    /// as binary type chunks.
    pub fn emits_binary_chunks(&self) -> bool {
        self.name != "styleable" && self.name != "macro"
    }
}

#[derive(Debug)]
pub struct ResourceEntry {
    /// Dense index within the type, may have holes. Must be assigned
    /// before flattening.
    pub id: Option<u16>,
    pub name: String,
    pub visibility: Visibility,
    pub overlayable: Option<OverlayableMembership>,
    /// When this resource id is staged for finalisation, the alias id it
    /// will be known by.
    pub staged_id: Option<u32>,
    /// One value per configuration the entry is defined for. Configurations
    /// are unique within one entry.
    pub values: Vec<ConfigValue>
}

impl ResourceEntry {
    pub fn new(name: impl Into<String>, id: u16) -> Self {
        ResourceEntry {
            id: Some(id),
            name: name.into(),
            visibility: Visibility::default(),
            overlayable: None,
            staged_id: None,
            values: vec![]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityLevel {
    #[default]
    Undefined,
    Private,
    Public
}

#[derive(Debug, Clone, Default)]
pub struct Visibility {
    pub level: VisibilityLevel,
    /// The entry is part of a staged (pre-release) API surface.
    pub staged_api: bool,
    pub source: Option<Source>
}

/// A named group of resources that overlay packages may replace.
#[derive(Debug, Clone)]
pub struct OverlayableGroup {
    pub name: String,
    /// URI of the actor responsible for the group, eg.
    /// `overlay://theme`.
    pub actor: String,
    pub source: Source
}

/// One entry's membership in an overlayable group, with the policy
/// partitions that gate who may overlay it.
#[derive(Debug, Clone)]
pub struct OverlayableMembership {
    pub group: usize,
    /// OR of POLICY_* bits. An empty set is a validation error.
    pub policies: u32,
    pub source: Source
}

#[derive(Debug)]
pub struct ConfigValue {
    pub config: ConfigDescription,
    /// Product qualifier, already resolved by the upstream linker; kept
    /// for diagnostics only.
    pub product: String,
    pub value: Value
}

impl ConfigValue {
    pub fn new(config: ConfigDescription, value: Value) -> Self {
        ConfigValue {
            config,
            product: String::new(),
            value
        }
    }
}

/// Closed set of value kinds. The entry writer matches exhaustively, so a
/// new kind is a compile error there rather than a runtime fallback.
#[derive(Debug, Clone)]
pub enum Value {
    Item(Item),
    Attribute(Attribute),
    Style(Style),
    Array(Array),
    Plural(Plural),
    Styleable(Styleable)
}

/// Single scalar value flattening to one 8-byte Res_value.
#[derive(Debug, Clone)]
pub enum Item {
    Reference(Reference),
    /// Verbatim string that bypassed parsing, eg. the raw text of an
    /// unparsed XML value.
    RawString(String),
    String(String),
    /// Styled text; flattened as its plain text content, spans are not
    /// carried into the binary table.
    StyledString(String),
    /// Path of a file in the output archive.
    FileReference(String),
    /// `@+id` marker; has no payload of its own.
    Id,
    /// An already-typed 32-bit payload (int, bool, float, dimension,
    /// fraction, color).
    Primitive(BinaryPrimitive)
}

impl Item {
    /// Id markers flatten as weak so duplicate definitions across split
    /// tables can coexist.
    pub fn is_weak(&self) -> bool {
        matches!(self, Item::Id)
    }
}

#[derive(Debug, Clone)]
pub struct Reference {
    /// Resolved resource id; None means the upstream linker never resolved
    /// the reference, which is fatal at flatten time.
    pub id: Option<u32>,
    /// The textual name, kept for diagnostics.
    pub name: String,
    pub kind: ReferenceKind,
    /// References into shared libraries resolve through the dynamic
    /// remap table at load time.
    pub dynamic: bool
}

impl Reference {
    pub fn resource(id: u32) -> Self {
        Reference {
            id: Some(id),
            name: String::new(),
            kind: ReferenceKind::Resource,
            dynamic: false
        }
    }

    pub fn attribute(id: u32) -> Self {
        Reference {
            id: Some(id),
            name: String::new(),
            kind: ReferenceKind::Attribute,
            dynamic: false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Resource,
    Attribute
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryPrimitive {
    pub data_type: u8,
    pub data: u32
}

impl BinaryPrimitive {
    pub fn new(data_type: u8, data: u32) -> Self {
        BinaryPrimitive { data_type, data }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Attribute {
    /// Bitmask of accepted value formats (reference, string, integer...).
    pub format: u32,
    pub min: Option<u32>,
    pub max: Option<u32>,
    /// The attribute's values are suggested for localisation.
    pub l10n_suggested: bool,
    pub symbols: Vec<AttributeSymbol>
}

#[derive(Debug, Clone)]
pub struct AttributeSymbol {
    pub reference: Reference,
    pub value: u32
}

#[derive(Debug, Clone, Default)]
pub struct Style {
    pub parent: Option<Reference>,
    pub entries: Vec<StyleEntry>
}

#[derive(Debug, Clone)]
pub struct StyleEntry {
    pub key: Reference,
    pub value: Item
}

#[derive(Debug, Clone, Default)]
pub struct Array {
    pub items: Vec<Item>
}

#[derive(Debug, Clone, Default)]
pub struct Plural {
    /// Indexed by [Quantity::index]; unset quantities are skipped when
    /// flattening.
    pub values: [Option<Item>; 6]
}

#[derive(Debug, Clone, Default)]
pub struct Styleable {
    pub entries: Vec<Reference>
}

/// The fixed plural quantity set, in the numeric order of their synthetic
/// map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other
}

static QUANTITY_NAMES: phf::Map<&'static str, Quantity> = phf::phf_map! {
    "zero" => Quantity::Zero,
    "one" => Quantity::One,
    "two" => Quantity::Two,
    "few" => Quantity::Few,
    "many" => Quantity::Many,
    "other" => Quantity::Other,
};

impl Quantity {
    pub const ALL: [Quantity; 6] = [
        Quantity::Zero,
        Quantity::One,
        Quantity::Two,
        Quantity::Few,
        Quantity::Many,
        Quantity::Other
    ];

    /// Parses the quantity name as authored in `<item quantity="...">`.
    pub fn from_name(name: &str) -> Option<Quantity> {
        QUANTITY_NAMES.get(name).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Quantity::Zero => 0,
            Quantity::One => 1,
            Quantity::Two => 2,
            Quantity::Few => 3,
            Quantity::Many => 4,
            Quantity::Other => 5
        }
    }

    /// The synthetic map key this quantity is stored under.
    pub fn map_key(self) -> u32 {
        match self {
            Quantity::Zero => ATTR_ZERO,
            Quantity::One => ATTR_ONE,
            Quantity::Two => ATTR_TWO,
            Quantity::Few => ATTR_FEW,
            Quantity::Many => ATTR_MANY,
            Quantity::Other => ATTR_OTHER
        }
    }
}
