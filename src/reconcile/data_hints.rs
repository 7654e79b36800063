//! Schema-hint synthesis
//!
//! The reconciler's output stage: turns the finished type/field mapping
//! plus the resolved hints into schema-level hints the comparer and the
//! translator consume — table/column renames, row copies for CopyField
//! hints, and row cleanup for removed or moved types. Also fills the
//! safe-removal and enforced-change sets used by safety classification.

use std::collections::HashSet;

use log::debug;

use crate::builder::TYPE_ID_COLUMN;
use crate::domain::{DomainModel, FieldValue, InheritanceSchema, StoredField, StoredType};
use crate::error::UpgradeError;
use crate::hints::{
    CopiedColumnPair, CopyDataHint, DeleteDataHint, HintSet, IdentityPair, RenameHint,
    UpdateDataHint, UpgradeHint,
};
use crate::model::{column_path, table_path};
use crate::reconcile::{FieldRef, ReconcileResult};

pub fn synthesize(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
    result: &mut ReconcileResult,
) -> Result<(), UpgradeError> {
    synthesize_renames(old, new, result);
    synthesize_copies(old, new, hints, result)?;
    synthesize_cleanup(old, new, result);
    collect_safe_sets(old, new, hints, result);
    Ok(())
}

/// Whether a type maps to a table of its own (rather than sharing its
/// hierarchy root's).
fn owns_table(domain: &DomainModel, stored: &StoredType) -> bool {
    if stored.is_structure() {
        return false;
    }
    match stored.hierarchy.as_ref().map(|h| h.schema) {
        Some(InheritanceSchema::SingleTable) => domain.hierarchy_root(stored).name == stored.name,
        _ => true,
    }
}

/// The physical column name of a (possibly nested, dotted) field path:
/// the mapping names of every segment joined with dots, matching the
/// flattening the domain-side builder performs.
fn column_name_of(stored: &StoredType, field_path: &str) -> Option<String> {
    let mut current: &[StoredField] = &stored.fields;
    let mut segments = Vec::new();
    let mut last: Option<&StoredField> = None;
    for segment in field_path.split('.') {
        let field = current.iter().find(|f| f.name == segment)?;
        segments.push(field.mapping_name.as_str());
        current = &field.fields;
        last = Some(field);
    }
    match last?.value {
        FieldValue::Primitive(_) | FieldValue::Reference { .. } => Some(segments.join(".")),
        FieldValue::Structure { .. } | FieldValue::EntitySet { .. } => None,
    }
}

/// Primitive leaves of one field as (dotted field path, column name).
fn column_leaves(field: &StoredField, field_prefix: &str, column_prefix: &str) -> Vec<(String, String)> {
    let field_path = if field_prefix.is_empty() {
        field.name.clone()
    } else {
        format!("{}.{}", field_prefix, field.name)
    };
    let column = if column_prefix.is_empty() {
        field.mapping_name.clone()
    } else {
        format!("{}.{}", column_prefix, field.mapping_name)
    };
    match &field.value {
        FieldValue::Primitive(_) | FieldValue::Reference { .. } => vec![(field_path, column)],
        FieldValue::Structure { .. } => field
            .fields
            .iter()
            .flat_map(|nested| column_leaves(nested, &field_path, &column))
            .collect(),
        FieldValue::EntitySet { .. } => vec![],
    }
}

fn synthesize_renames(old: &DomainModel, new: &DomainModel, result: &mut ReconcileResult) {
    let mut seen_tables: HashSet<(String, String)> = HashSet::new();
    let pairs: Vec<(String, String)> = result
        .mapping
        .type_pairs()
        .map(|(o, n)| (o.to_string(), n.to_string()))
        .collect();

    for (old_name, new_name) in &pairs {
        let (Some(old_type), Some(new_type)) = (old.get(old_name), new.get(new_name)) else {
            continue;
        };
        if !owns_table(old, old_type) || !owns_table(new, new_type) {
            continue;
        }
        let (Some(old_table), Some(new_table)) =
            (old.mapped_table(old_type), new.mapped_table(new_type))
        else {
            continue;
        };
        if old_table != new_table
            && seen_tables.insert((old_table.to_string(), new_table.to_string()))
        {
            debug!("table rename: {} -> {}", old_table, new_table);
            result.schema_hints.renames.push(RenameHint {
                source_path: table_path(old_table),
                target_path: table_path(new_table),
            });
        }
    }

    let field_pairs: Vec<(FieldRef, FieldRef)> = result
        .mapping
        .field_pairs()
        .map(|(o, n)| (o.clone(), n.clone()))
        .collect();
    for (old_ref, new_ref) in field_pairs {
        let (Some(old_type), Some(new_type)) =
            (old.get(&old_ref.type_name), new.get(&new_ref.type_name))
        else {
            continue;
        };
        let (Some(old_column), Some(new_column)) = (
            column_name_of(old_type, &old_ref.field),
            column_name_of(new_type, &new_ref.field),
        ) else {
            continue; // structure and entity-set fields carry no column
        };
        if old_column == new_column {
            continue; // a table rename alone is covered above
        }
        let (Some(old_table), Some(new_table)) =
            (old.mapped_table(old_type), new.mapped_table(new_type))
        else {
            continue;
        };
        debug!(
            "column rename: {}.{} -> {}.{}",
            old_table, old_column, new_table, new_column
        );
        result.schema_hints.renames.push(RenameHint {
            source_path: column_path(old_table, &old_column),
            target_path: column_path(new_table, &new_column),
        });
    }
}

/// One CopyDataHint per explicit CopyField hint, with identity pairs
/// built from the owning hierarchies' key fields.
fn synthesize_copies(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
    result: &mut ReconcileResult,
) -> Result<(), UpgradeError> {
    for hint in hints.iter() {
        let UpgradeHint::CopyField {
            source_type,
            source_field,
            target_type,
            target_field,
        } = hint
        else {
            continue;
        };
        let (Some(source), Some(target)) = (old.get(source_type), new.get(target_type)) else {
            continue;
        };
        let (Some(source_table), Some(target_table)) =
            (old.mapped_table(source), new.mapped_table(target))
        else {
            debug!(
                "copy {}.{}: a structure type holds no rows, skipping",
                source_type, source_field
            );
            continue;
        };

        let mut identity = Vec::new();
        let source_keys: Vec<(String, String)> = old
            .key_fields(source)
            .into_iter()
            .flat_map(|f| column_leaves(f, "", ""))
            .collect();
        let target_keys: Vec<(String, String)> = new
            .key_fields(target)
            .into_iter()
            .flat_map(|f| column_leaves(f, "", ""))
            .collect();
        for (field_path, source_column) in &source_keys {
            let leaf = field_path.rsplit('.').next().unwrap_or(field_path);
            let Some((_, target_column)) = target_keys
                .iter()
                .find(|(p, _)| p.rsplit('.').next().unwrap_or(p) == leaf)
            else {
                // Validation already rejected incompatible key sets.
                return Err(UpgradeError::StructuralIncompatibility {
                    source_path: format!("{}.{}", source_type, source_field),
                    target: format!("{}.{}", target_type, target_field),
                    message: format!("key leaf '{}' has no counterpart", leaf),
                });
            };
            identity.push(IdentityPair::Columns {
                source: column_path(source_table, source_column),
                target: column_path(target_table, target_column),
            });
        }
        // Scope to the source type's own rows in a shared table.
        if let (Some(type_id), Some(InheritanceSchema::SingleTable)) = (
            source.type_id,
            source.hierarchy.as_ref().map(|h| h.schema),
        ) {
            identity.push(IdentityPair::Constant {
                column: column_path(source_table, TYPE_ID_COLUMN),
                value: type_id.to_string(),
            });
        }

        let (Some(sf), Some(tf)) = (source.field(source_field), target.field(target_field))
        else {
            continue;
        };
        let columns = column_leaves(sf, "", "")
            .into_iter()
            .zip(column_leaves(tf, "", ""))
            .map(|((_, source_column), (_, target_column))| CopiedColumnPair {
                source: column_path(source_table, &source_column),
                target: column_path(target_table, &target_column),
            })
            .collect();

        result.schema_hints.copies.push(CopyDataHint {
            source_table: table_path(source_table),
            target_table: table_path(target_table),
            identity,
            columns,
        });
    }
    Ok(())
}

/// Whether any new type still maps to the given physical table name.
fn table_survives(new: &DomainModel, table: &str) -> bool {
    new.types
        .iter()
        .any(|t| new.mapped_table(t) == Some(table))
}

/// Whether the surviving table is claimed by a type other than the old
/// type's own counterpart.
fn table_conflict(
    new: &DomainModel,
    result: &ReconcileResult,
    old_type: &str,
    table: &str,
) -> bool {
    new.types.iter().any(|t| {
        new.mapped_table(t) == Some(table)
            && result.mapping.old_type_of(&t.name) != Some(old_type)
    })
}

/// The identity predicate selecting one type's rows out of a shared
/// hierarchy table, keyed by the root's discriminator column.
fn discriminator_identity(stored: &StoredType, root_table: &str) -> Vec<IdentityPair> {
    match stored.type_id {
        Some(type_id) => vec![IdentityPair::Constant {
            column: column_path(root_table, TYPE_ID_COLUMN),
            value: type_id.to_string(),
        }],
        None => vec![],
    }
}

/// Row cleanup for removed and moved types.
///
/// Removed types delete immediately; types moved to another hierarchy
/// delete after CopyData has relocated their rows. Per inheritance
/// schema: single-table descendants delete their discriminated rows out
/// of the surviving root table; class-table types delete their slice out
/// of every ancestor table (joined through the root's key and scoped by
/// its discriminator); concrete tables only need a delete when the table
/// itself survives under a different new type.
fn synthesize_cleanup(old: &DomainModel, new: &DomainModel, result: &mut ReconcileResult) {
    let removed: Vec<String> = result.removed_types.clone();
    for name in &removed {
        if let Some(stored) = old.get(name) {
            cleanup_type(old, new, stored, false, result);
            clear_references_to(old, new, stored, result);
        }
    }

    // A mapped type whose old hierarchy root is not the counterpart of
    // its new hierarchy root has moved across hierarchies.
    let moved: Vec<String> = result
        .mapping
        .type_pairs()
        .filter_map(|(old_name, new_name)| {
            let stored = old.get(old_name)?;
            let counterpart = new.get(new_name)?;
            let old_root = old.hierarchy_root(stored);
            let new_root = new.hierarchy_root(counterpart);
            let mapped_root = result.mapping.new_type_of(&old_root.name);
            if old_root.name != stored.name && mapped_root != Some(new_root.name.as_str()) {
                Some(old_name.to_string())
            } else {
                None
            }
        })
        .collect();
    for name in moved {
        if let Some(stored) = old.get(&name) {
            debug!("type {} moved across hierarchies, deferring cleanup", name);
            cleanup_type(old, new, stored, true, result);
        }
    }
}

fn cleanup_type(
    old: &DomainModel,
    new: &DomainModel,
    stored: &StoredType,
    post_copy: bool,
    result: &mut ReconcileResult,
) {
    if stored.is_structure() {
        return;
    }
    let root = old.hierarchy_root(stored);
    match stored.hierarchy.as_ref().map(|h| h.schema) {
        Some(InheritanceSchema::SingleTable) => {
            let table = root.mapping_name.as_str();
            if !table_survives(new, table) {
                return; // the whole table is dropped
            }
            let conflict = table_conflict(new, result, &stored.name, table);
            result.schema_hints.deletes.push(DeleteDataHint {
                table: table_path(table),
                identity: discriminator_identity(stored, table),
                post_copy,
                due_to_table_conflict: conflict,
            });
        }
        Some(InheritanceSchema::ClassTable) => {
            let root_table = root.mapping_name.as_str();
            // Own slice of every surviving table in the chain, own table
            // first, root last.
            let mut chain = vec![stored.mapping_name.as_str()];
            chain.extend(old.ancestors(stored).iter().map(|a| a.mapping_name.as_str()));
            for table in chain {
                if !table_survives(new, table) {
                    continue;
                }
                let mut identity = Vec::new();
                if table != root_table {
                    for key in old.key_fields(stored) {
                        for (_, column) in column_leaves(key, "", "") {
                            identity.push(IdentityPair::Columns {
                                source: column_path(table, &column),
                                target: column_path(root_table, &column),
                            });
                        }
                    }
                }
                identity.extend(discriminator_identity(stored, root_table));
                result.schema_hints.deletes.push(DeleteDataHint {
                    table: table_path(table),
                    identity,
                    post_copy,
                    due_to_table_conflict: table_conflict(new, result, &stored.name, table),
                });
            }
        }
        Some(InheritanceSchema::ConcreteTable) | None => {
            let table = stored.mapping_name.as_str();
            if !table_survives(new, table) {
                return;
            }
            result.schema_hints.deletes.push(DeleteDataHint {
                table: table_path(table),
                identity: vec![],
                post_copy,
                due_to_table_conflict: true,
            });
        }
    }
}

/// Null out surviving reference columns that point at a removed type's
/// rows.
fn clear_references_to(
    old: &DomainModel,
    new: &DomainModel,
    removed: &StoredType,
    result: &mut ReconcileResult,
) {
    for holder in &old.types {
        if holder.name == removed.name || holder.is_structure() {
            continue;
        }
        if result.removed_types.contains(&holder.name) {
            continue;
        }
        let Some(table) = old.mapped_table(holder) else {
            continue;
        };
        if !table_survives(new, table) {
            continue;
        }
        for field in &holder.fields {
            let FieldValue::Reference { target_type } = &field.value else {
                continue;
            };
            if target_type != &removed.name {
                continue;
            }
            result.schema_hints.updates.push(UpdateDataHint {
                table: table_path(table),
                column: column_path(table, &field.mapping_name),
                value: None,
                identity: vec![],
                post_copy: false,
            });
        }
    }
}

/// Fill the sets that sanction otherwise-unsafe actions: hinted type
/// removals cover their tables (and owned connector tables), hinted
/// field removals cover their columns, and hinted type changes cover the
/// target column's property change.
fn collect_safe_sets(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
    result: &mut ReconcileResult,
) {
    for hint in hints.iter() {
        match hint {
            UpgradeHint::RemoveType { r#type } => {
                let Some(stored) = old.get(r#type) else {
                    continue;
                };
                if owns_table(old, stored) {
                    if let Some(table) = old.mapped_table(stored) {
                        result.safe_table_removals.insert(table_path(table));
                    }
                }
                // Connector tables owned by the removed type go with it.
                for field in &stored.fields {
                    if let FieldValue::EntitySet { connector_type } = &field.value {
                        if let Some(connector) = old.get(connector_type) {
                            result
                                .safe_table_removals
                                .insert(table_path(&connector.mapping_name));
                        }
                    }
                }
                // Its discriminated columns in a shared single-table are
                // removed too.
                if let Some(table) = old.mapped_table(stored) {
                    if !owns_table(old, stored) {
                        for field in &stored.fields {
                            for (_, column) in column_leaves(field, "", "") {
                                result
                                    .safe_column_removals
                                    .insert(column_path(table, &column));
                            }
                        }
                    }
                }
            }
            UpgradeHint::RemoveField { r#type, field } => {
                let Some(stored) = old.get(r#type) else {
                    continue;
                };
                let Some(table) = old.mapped_table(stored) else {
                    continue;
                };
                if let Some(f) = stored.field(field) {
                    for (_, column) in column_leaves(f, "", "") {
                        result
                            .safe_column_removals
                            .insert(column_path(table, &column));
                    }
                }
            }
            UpgradeHint::ChangeFieldType { r#type, field } => {
                let old_ref = FieldRef::new(r#type.clone(), field.clone());
                let Some(new_ref) = result.mapping.new_field_of(&old_ref).cloned() else {
                    debug!("type-change hint on unmapped field {}", old_ref);
                    continue;
                };
                let Some(new_type) = new.get(&new_ref.type_name) else {
                    continue;
                };
                let (Some(table), Some(column)) = (
                    new.mapped_table(new_type),
                    column_name_of(new_type, &new_ref.field),
                ) else {
                    continue;
                };
                result
                    .enforced_type_changes
                    .insert(column_path(table, &column));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{process, ReconcileOptions};

    fn entity(name: &str, table: &str) -> StoredType {
        StoredType::entity(name, table)
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("Payload", "string"))
    }

    #[test]
    fn diverged_table_name_yields_a_rename_hint() {
        let old = DomainModel {
            types: vec![entity("App.Person", "Person")],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![entity("App.Person", "People")],
            generators: vec![],
        };
        let result =
            process(&old, &new, &HintSet::default(), &ReconcileOptions::default()).unwrap();
        assert_eq!(
            result.schema_hints.rename_target("Tables/Person"),
            Some("Tables/People")
        );
    }

    #[test]
    fn diverged_column_name_yields_a_rename_hint() {
        let old = DomainModel {
            types: vec![StoredType::entity("App.Person", "Person")
                .with_field(StoredField::primitive("Id", "int64").key())
                .with_field(StoredField::primitive("Name", "string"))],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![StoredType::entity("App.Person", "Person")
                .with_field(StoredField::primitive("Id", "int64").key())
                .with_field(
                    StoredField::primitive("Name", "string").mapped_to("FullName"),
                )],
            generators: vec![],
        };
        let result =
            process(&old, &new, &HintSet::default(), &ReconcileOptions::default()).unwrap();
        assert_eq!(
            result.schema_hints.rename_target("Tables/Person/Columns/Name"),
            Some("Tables/Person/Columns/FullName")
        );
    }

    #[test]
    fn copy_field_builds_identity_from_key_fields() {
        let old = DomainModel {
            types: vec![entity("App.Person", "Person"), entity("App.Employee", "Employee")],
            generators: vec![],
        };
        let new = old.clone();
        let hints = HintSet::new(vec![UpgradeHint::CopyField {
            source_type: "App.Person".into(),
            source_field: "Payload".into(),
            target_type: "App.Employee".into(),
            target_field: "Payload".into(),
        }]);
        let result = process(&old, &new, &hints, &ReconcileOptions::default()).unwrap();
        assert_eq!(result.schema_hints.copies.len(), 1);
        let copy = &result.schema_hints.copies[0];
        assert_eq!(copy.source_table, "Tables/Person");
        assert_eq!(copy.target_table, "Tables/Employee");
        assert_eq!(
            copy.identity,
            vec![IdentityPair::Columns {
                source: "Tables/Person/Columns/Id".into(),
                target: "Tables/Employee/Columns/Id".into(),
            }]
        );
        assert_eq!(
            copy.columns,
            vec![CopiedColumnPair {
                source: "Tables/Person/Columns/Payload".into(),
                target: "Tables/Employee/Columns/Payload".into(),
            }]
        );
    }

    #[test]
    fn removed_single_table_descendant_deletes_its_discriminated_rows() {
        let root = StoredType::entity("App.Animal", "Animal")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_hierarchy("App.Animal", InheritanceSchema::SingleTable)
            .with_type_id(1);
        let descendant = StoredType::entity("App.Dog", "Dog")
            .with_field(StoredField::primitive("Breed", "string"))
            .with_hierarchy("App.Animal", InheritanceSchema::SingleTable)
            .with_ancestor("App.Animal")
            .with_type_id(2);
        let old = DomainModel {
            types: vec![root.clone(), descendant],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![root],
            generators: vec![],
        };
        let hints = HintSet::new(vec![UpgradeHint::RemoveType {
            r#type: "App.Dog".into(),
        }]);
        let result = process(&old, &new, &hints, &ReconcileOptions::default()).unwrap();
        assert_eq!(result.schema_hints.deletes.len(), 1);
        let delete = &result.schema_hints.deletes[0];
        assert_eq!(delete.table, "Tables/Animal");
        assert!(!delete.post_copy);
        assert_eq!(
            delete.identity,
            vec![IdentityPair::Constant {
                column: "Tables/Animal/Columns/TypeId".into(),
                value: "2".into(),
            }]
        );
    }

    #[test]
    fn cross_hierarchy_move_defers_cleanup_to_post_copy() {
        let h1_root = StoredType::entity("App.A", "T1")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_hierarchy("App.A", InheritanceSchema::SingleTable)
            .with_type_id(1);
        let h2_root = StoredType::entity("App.B", "T2")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_hierarchy("App.B", InheritanceSchema::SingleTable)
            .with_type_id(2);
        let old_member = StoredType::entity("App.M", "M")
            .with_field(StoredField::primitive("Tag", "string"))
            .with_hierarchy("App.A", InheritanceSchema::SingleTable)
            .with_ancestor("App.A")
            .with_type_id(3);
        let new_member = StoredType::entity("App.M", "M")
            .with_field(StoredField::primitive("Tag", "string"))
            .with_hierarchy("App.B", InheritanceSchema::SingleTable)
            .with_ancestor("App.B")
            .with_type_id(3);
        let old = DomainModel {
            types: vec![h1_root.clone(), h2_root.clone(), old_member],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![h1_root, h2_root, new_member],
            generators: vec![],
        };
        let result =
            process(&old, &new, &HintSet::default(), &ReconcileOptions::default()).unwrap();
        let delete = result
            .schema_hints
            .deletes
            .iter()
            .find(|d| d.table == "Tables/T1")
            .unwrap();
        assert!(delete.post_copy);
        assert_eq!(
            delete.identity,
            vec![IdentityPair::Constant {
                column: "Tables/T1/Columns/TypeId".into(),
                value: "3".into(),
            }]
        );
    }

    #[test]
    fn hinted_removals_feed_the_safe_sets() {
        let old = DomainModel {
            types: vec![entity("App.Person", "Person"), entity("App.Legacy", "Legacy")],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![StoredType::entity("App.Person", "Person")
                .with_field(StoredField::primitive("Id", "int64").key())],
            generators: vec![],
        };
        let hints = HintSet::new(vec![
            UpgradeHint::RemoveType {
                r#type: "App.Legacy".into(),
            },
            UpgradeHint::RemoveField {
                r#type: "App.Person".into(),
                field: "Payload".into(),
            },
        ]);
        let result = process(&old, &new, &hints, &ReconcileOptions::default()).unwrap();
        assert!(result.safe_table_removals.contains("Tables/Legacy"));
        assert!(result
            .safe_column_removals
            .contains("Tables/Person/Columns/Payload"));
    }
}
