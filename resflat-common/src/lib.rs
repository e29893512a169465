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

use std::fmt;

use deku::prelude::*;

/// Common error type making it easier to share `Result`s between RESFLAT
/// crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatError {
    /// A package reached the flattener without a numeric id. Ids are
    /// assigned by the upstream linking stage, so this is a contract breach
    /// by the caller rather than something the flattener can recover from.
    MissingPackageId(String),
    /// A resource type reached the flattener without a numeric id.
    MissingTypeId {
        package: String,
        type_name: String
    },
    /// An entry reached the flattener without a numeric id.
    MissingEntryId {
        type_name: String,
        entry_name: String
    },
    /// Entry ids are 16-bit in the binary format, so a type can hold at
    /// most 0x10000 entries.
    TooManyEntries {
        type_name: String,
        count: usize
    },
    /// The package name does not fit the fixed 128-character UTF-16 field
    /// of the package chunk. Only raised for shared libraries; application
    /// packages get truncated with a warning instead.
    PackageNameTooLong(String),
    /// An overlayable group name does not fit its fixed 256-character
    /// UTF-16 field.
    OverlayableNameTooLong(String),
    /// An overlayable actor URI does not fit its fixed 256-character
    /// UTF-16 field.
    OverlayableActorTooLong(String),
    /// Two entries declare overlayable groups with the same name but a
    /// different actor or declaration site. Both sources are carried so
    /// the caller can report the pair.
    ConflictingOverlayable {
        name: String,
        first: Source,
        second: Source
    },
    /// An entry is marked overlayable but its policy bit set is empty.
    OverlayableWithoutPolicies {
        name: String,
        source: Source
    },
    /// Two packages claim the same numeric id with different names, so
    /// the id-to-name mapping the runtime uses would be ambiguous.
    ConflictingPackageId {
        id: u8,
        existing: String,
        conflicting: String
    },
    /// A style's parent reference carries no resolved numeric id. The
    /// binary format stores parents by id only.
    StyleParentWithoutId(String),
    /// A style entry's attribute key carries no resolved numeric id.
    StyleEntryWithoutId {
        style: String,
        attribute: String
    },
    /// An attribute enum/flag symbol carries no resolved numeric id.
    AttributeSymbolWithoutId(String),
    /// A styleable member reference carries no resolved numeric id.
    StyleableEntryWithoutId(String),
    /// A scalar reference value was never resolved to a numeric id by the
    /// upstream linker.
    UnresolvedReference(String),
    /// RESFLAT only supports UTF-8 encoding up to the format's signed
    /// 16-bit length limit of `0x7FFF` bytes per string.
    StringPoolStringTooLong(String),
    /// Serialising an on-disk struct failed. See [DekuError].
    ByteSerialisationFailed(DekuError)
}

impl fmt::Display for FlatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlatError::MissingPackageId(name) => {
                write!(f, "package '{}' has no id assigned", name)
            }
            FlatError::MissingTypeId { package, type_name } => {
                write!(f, "type '{}/{}' has no id assigned", package, type_name)
            }
            FlatError::MissingEntryId {
                type_name,
                entry_name
            } => {
                write!(f, "entry '{}/{}' has no id assigned", type_name, entry_name)
            }
            FlatError::TooManyEntries { type_name, count } => {
                write!(f, "type '{}' has {} entries, limit is 0x10000", type_name, count)
            }
            FlatError::PackageNameTooLong(name) => {
                write!(f, "package name '{}' is longer than 127 characters", name)
            }
            FlatError::OverlayableNameTooLong(name) => {
                write!(f, "overlayable name '{}' is longer than 255 characters", name)
            }
            FlatError::OverlayableActorTooLong(actor) => {
                write!(f, "overlayable actor '{}' is longer than 255 characters", actor)
            }
            FlatError::ConflictingOverlayable {
                name,
                first,
                second
            } => {
                write!(
                    f,
                    "overlayable '{}' declared at {} conflicts with declaration at {}",
                    name, second, first
                )
            }
            FlatError::OverlayableWithoutPolicies { name, source } => {
                write!(f, "overlayable '{}' at {} declares no policies", name, source)
            }
            FlatError::ConflictingPackageId {
                id,
                existing,
                conflicting
            } => {
                write!(
                    f,
                    "package id 0x{:02x} used by both '{}' and '{}'",
                    id, existing, conflicting
                )
            }
            FlatError::StyleParentWithoutId(style) => {
                write!(f, "style '{}' has a parent reference with no ID", style)
            }
            FlatError::StyleEntryWithoutId { style, attribute } => {
                write!(f, "style '{}' entry '{}' has no ID", style, attribute)
            }
            FlatError::AttributeSymbolWithoutId(symbol) => {
                write!(f, "attribute symbol '{}' has no ID", symbol)
            }
            FlatError::StyleableEntryWithoutId(name) => {
                write!(f, "styleable entry '{}' has no ID", name)
            }
            FlatError::UnresolvedReference(name) => {
                write!(f, "reference '{}' was never assigned an ID", name)
            }
            FlatError::StringPoolStringTooLong(s) => {
                write!(f, "string pool string of {} bytes exceeds 0x7FFF", s.len())
            }
            FlatError::ByteSerialisationFailed(e) => {
                write!(f, "byte serialisation failed: {}", e)
            }
        }
    }
}

impl std::error::Error for FlatError {}

/// Result type where the error is always [FlatError].
pub type Result<T> = std::result::Result<T, FlatError>;

// Automatic conversion from other types of error to FlatError makes the rest of the code cleaner
impl From<DekuError> for FlatError {
    fn from(value: DekuError) -> Self {
        FlatError::ByteSerialisationFailed(value)
    }
}

/// Where a resource declaration came from. Line numbers are only available
/// when the upstream compiler recorded them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Source {
    pub path: String,
    pub line: Option<u32>
}

impl Source {
    pub fn new(path: impl Into<String>) -> Self {
        Source {
            path: path.into(),
            line: None
        }
    }

    pub fn with_line(path: impl Into<String>, line: u32) -> Self {
        Source {
            path: path.into(),
            line: Some(line)
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.path, line),
            None => write!(f, "{}", self.path)
        }
    }
}

/// One message produced while flattening, with source context when the
/// input model carried any.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub source: Option<Source>
}

/// Collector for errors and warnings raised during one flatten invocation.
///
/// Encoders push messages here as they encounter them and return a
/// [FlatError] for the first fatal one; the caller decides how many to
/// surface. The collector is scoped to one invocation and never shared.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, message: impl Into<String>, source: Option<Source>) {
        self.errors.push(Diagnostic {
            message: message.into(),
            source
        });
    }

    pub fn warn(&mut self, message: impl Into<String>, source: Option<Source>) {
        self.warnings.push(Diagnostic {
            message: message.into(),
            source
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_display_includes_line_when_present() {
        assert_eq!(Source::new("res/values/styles.xml").to_string(), "res/values/styles.xml");
        assert_eq!(
            Source::with_line("res/values/styles.xml", 12).to_string(),
            "res/values/styles.xml:12"
        );
    }

    #[test]
    fn diagnostics_collects_errors_and_warnings() {
        let mut diag = Diagnostics::new();
        assert!(!diag.has_errors());
        diag.warn("name truncated", None);
        assert!(!diag.has_errors());
        diag.error("conflicting actor", Some(Source::new("overlays.xml")));
        assert!(diag.has_errors());
        assert_eq!(diag.errors().len(), 1);
        assert_eq!(diag.warnings().len(), 1);
    }
}
