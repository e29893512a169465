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

mod common;

use common::*;
use resflat_common::{Diagnostics, FlatError, Source};
use resflat_flattener::config_description::ConfigDescription;
use resflat_flattener::resource_internal_types::{
    OverlayableGroup, OverlayableMembership, Reference, ReferenceKind, ResourcePackage,
    ResourceTable, Style, Value
};
use resflat_flattener::resource_external_types::{POLICY_SYSTEM, POLICY_VENDOR};
use resflat_flattener::{flatten_resource_table, TableFlattenerOptions};

fn flatten_err(table: &ResourceTable) -> (FlatError, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let error = flatten_resource_table(table, &TableFlattenerOptions::default(), &mut diagnostics)
        .unwrap_err();
    (error, diagnostics)
}

#[test]
fn style_with_unresolved_parent_reports_the_style() {
    let style = Value::Style(Style {
        parent: Some(Reference {
            id: None,
            name: "Base.Theme".into(),
            kind: ReferenceKind::Resource,
            dynamic: false
        }),
        entries: vec![]
    });
    let table = single_type_table(
        "style",
        1,
        vec![entry_with_values(
            "AppTheme",
            0,
            vec![(ConfigDescription::default(), style)]
        )]
    );
    let (error, _) = flatten_err(&table);
    assert_eq!(error, FlatError::StyleParentWithoutId("AppTheme".into()));
}

#[test]
fn missing_package_id_is_fatal() {
    let mut table = ResourceTable::new();
    table.packages.push(ResourcePackage {
        id: None,
        name: "com.example.app".into(),
        types: vec![]
    });
    let (error, _) = flatten_err(&table);
    assert_eq!(error, FlatError::MissingPackageId("com.example.app".into()));
}

#[test]
fn missing_type_id_is_fatal() {
    let mut table = single_type_table("string", 1, vec![]);
    table.packages[0].types[0].id = None;
    let (error, _) = flatten_err(&table);
    assert_eq!(
        error,
        FlatError::MissingTypeId {
            package: "com.example.app".into(),
            type_name: "string".into()
        }
    );
}

#[test]
fn missing_entry_id_is_fatal() {
    let mut table = single_type_table(
        "string",
        1,
        vec![entry_with_values(
            "app_name",
            0,
            vec![(ConfigDescription::default(), string_value("A"))]
        )]
    );
    table.packages[0].types[0].entries[0].id = None;
    let (error, _) = flatten_err(&table);
    assert_eq!(
        error,
        FlatError::MissingEntryId {
            type_name: "string".into(),
            entry_name: "app_name".into()
        }
    );
}

#[test]
fn ambiguous_package_id_reuse_is_rejected() {
    let mut table = ResourceTable::new();
    table.packages.push(ResourcePackage::new("com.example.first", 0x80));
    table.packages.push(ResourcePackage::new("com.example.second", 0x80));
    let (error, diagnostics) = flatten_err(&table);
    assert_eq!(
        error,
        FlatError::ConflictingPackageId {
            id: 0x80,
            existing: "com.example.first".into(),
            conflicting: "com.example.second".into()
        }
    );
    assert!(diagnostics.has_errors());
}

#[test]
fn reusing_an_id_for_the_same_name_is_allowed() {
    let mut table = ResourceTable::new();
    table.referenced_packages.insert(0x80, "com.example.lib".into());
    table.packages.push(ResourcePackage::new("com.example.lib", 0x80));
    let mut diagnostics = Diagnostics::new();
    assert!(
        flatten_resource_table(&table, &TableFlattenerOptions::default(), &mut diagnostics).is_ok()
    );
}

#[test]
fn shared_library_package_name_must_fit_the_field() {
    let long_name: String = std::iter::repeat('a').take(200).collect();
    let mut table = ResourceTable::new();
    table.packages.push(ResourcePackage::new(long_name.clone(), 0x00));
    let mut diagnostics = Diagnostics::new();
    let error = flatten_resource_table(
        &table,
        &TableFlattenerOptions {
            shared_library: true,
            ..Default::default()
        },
        &mut diagnostics
    )
    .unwrap_err();
    assert_eq!(error, FlatError::PackageNameTooLong(long_name));
    assert!(diagnostics.has_errors());
}

#[test]
fn app_package_name_is_truncated_with_a_warning() {
    let long_name: String = std::iter::repeat('a').take(200).collect();
    let mut table = ResourceTable::new();
    table.packages.push(ResourcePackage::new(long_name, 0x7F));
    let mut diagnostics = Diagnostics::new();
    let buffer =
        flatten_resource_table(&table, &TableFlattenerOptions::default(), &mut diagnostics)
            .unwrap();
    assert_eq!(diagnostics.warnings().len(), 1);

    let package = packages(&buffer)[0];
    let written = fixed_utf16_at(&buffer, package.start + 12, 128);
    assert_eq!(written.len(), 127);
}

fn overlayable_table(
    first_policies: u32,
    second_policies: u32,
    second_group: Option<OverlayableGroup>
) -> ResourceTable {
    let mut table = single_type_table(
        "string",
        1,
        vec![
            entry_with_values(
                "title",
                0,
                vec![(ConfigDescription::default(), string_value("A"))]
            ),
            entry_with_values(
                "subtitle",
                1,
                vec![(ConfigDescription::default(), string_value("B"))]
            ),
        ]
    );
    let theme = table.add_overlayable(OverlayableGroup {
        name: "theme".into(),
        actor: "overlay://theme".into(),
        source: Source::with_line("res/values/overlayable.xml", 3)
    });
    let second = match second_group {
        Some(group) => table.add_overlayable(group),
        None => theme
    };
    table.packages[0].types[0].entries[0].overlayable = Some(OverlayableMembership {
        group: theme,
        policies: first_policies,
        source: Source::with_line("res/values/overlayable.xml", 4)
    });
    table.packages[0].types[0].entries[1].overlayable = Some(OverlayableMembership {
        group: second,
        policies: second_policies,
        source: Source::with_line("res/values/overlayable.xml", 9)
    });
    table
}

#[test]
fn overlayable_with_empty_policy_set_is_rejected() {
    let table = overlayable_table(0, POLICY_SYSTEM, None);
    let (error, diagnostics) = flatten_err(&table);
    assert!(matches!(error, FlatError::OverlayableWithoutPolicies { .. }));
    assert!(diagnostics.has_errors());
}

#[test]
fn conflicting_overlayable_actor_cites_both_sources() {
    let table = overlayable_table(
        POLICY_SYSTEM,
        POLICY_VENDOR,
        Some(OverlayableGroup {
            name: "theme".into(),
            actor: "overlay://other".into(),
            source: Source::with_line("res/values/overlayable2.xml", 7)
        })
    );
    let (error, diagnostics) = flatten_err(&table);
    match error {
        FlatError::ConflictingOverlayable { name, first, second } => {
            assert_eq!(name, "theme");
            assert_eq!(first, Source::with_line("res/values/overlayable.xml", 3));
            assert_eq!(second, Source::with_line("res/values/overlayable2.xml", 7));
        }
        other => panic!("unexpected error {:?}", other)
    }
    let message = &diagnostics.errors()[0].message;
    assert!(message.contains("overlayable.xml:3"), "{}", message);
}

#[test]
fn same_overlayable_with_different_policies_succeeds() {
    let table = overlayable_table(POLICY_SYSTEM, POLICY_VENDOR, None);
    let mut diagnostics = Diagnostics::new();
    let buffer =
        flatten_resource_table(&table, &TableFlattenerOptions::default(), &mut diagnostics)
            .unwrap();
    let package = packages(&buffer)[0];
    let overlayable = find_children(&buffer, &package, 288, CHUNK_OVERLAYABLE);
    assert_eq!(overlayable.len(), 1);
    let policy_blocks = find_children(&buffer, &overlayable[0], 1032, CHUNK_OVERLAYABLE_POLICY);
    assert_eq!(policy_blocks.len(), 2);
}

#[test]
fn unresolved_scalar_reference_is_fatal() {
    let table = single_type_table(
        "string",
        1,
        vec![entry_with_values(
            "alias",
            0,
            vec![(
                ConfigDescription::default(),
                Value::Item(resflat_flattener::resource_internal_types::Item::Reference(
                    Reference {
                        id: None,
                        name: "@string/missing".into(),
                        kind: ReferenceKind::Resource,
                        dynamic: false
                    }
                ))
            )]
        )]
    );
    let (error, _) = flatten_err(&table);
    assert_eq!(error, FlatError::UnresolvedReference("@string/missing".into()));
}
