//! Hint validation (pipeline stage 6)
//!
//! Runs after every mapping stage: hints must reference real types and
//! fields, rename/copy hints must not collide, and both sides of a copy
//! must be structurally compatible. All failures are fatal and happen
//! before any statement is produced.

use std::collections::HashMap;

use crate::domain::{DomainModel, StoredField, StoredType};
use crate::error::UpgradeError;
use crate::hints::{HintSet, UpgradeHint};
use crate::model::ColumnType;
use crate::reconcile::Mapping;

pub fn validate(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
    mapping: &Mapping,
) -> Result<(), UpgradeError> {
    check_references(old, new, hints, mapping)?;
    check_collisions(hints)?;
    check_copy_compatibility(old, new, hints)?;
    Ok(())
}

fn require_type<'a>(
    model: &'a DomainModel,
    name: &str,
    side: &'static str,
) -> Result<&'a StoredType, UpgradeError> {
    model.get(name).ok_or(UpgradeError::UnresolvedReference {
        kind: "type",
        name: name.to_string(),
        model: side,
    })
}

fn require_field<'a>(
    stored: &'a StoredType,
    field: &str,
    side: &'static str,
) -> Result<&'a StoredField, UpgradeError> {
    stored
        .field(field)
        .ok_or(UpgradeError::UnresolvedReference {
            kind: "field",
            name: format!("{}.{}", stored.name, field),
            model: side,
        })
}

fn check_references(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
    mapping: &Mapping,
) -> Result<(), UpgradeError> {
    for hint in hints.iter() {
        match hint {
            UpgradeHint::RenameType { old_type, new_type } => {
                require_type(old, old_type, "old")?;
                require_type(new, new_type, "new")?;
            }
            UpgradeHint::RemoveType { r#type } => {
                require_type(old, r#type, "old")?;
            }
            UpgradeHint::RenameField {
                r#type,
                old_field,
                new_field,
            } => {
                let new_type = require_type(new, r#type, "new")?;
                require_field(new_type, new_field, "new")?;
                if let Some(old_name) = mapping.old_type_of(r#type) {
                    let old_type = require_type(old, old_name, "old")?;
                    require_field(old_type, old_field, "old")?;
                }
            }
            UpgradeHint::RemoveField { r#type, field }
            | UpgradeHint::ChangeFieldType { r#type, field } => {
                let stored = require_type(old, r#type, "old")?;
                require_field(stored, field, "old")?;
            }
            UpgradeHint::CopyField {
                source_type,
                source_field,
                target_type,
                target_field,
            } => {
                let source = require_type(old, source_type, "old")?;
                require_field(source, source_field, "old")?;
                let target = require_type(new, target_type, "new")?;
                require_field(target, target_field, "new")?;
            }
            // Rewritten away before validation.
            UpgradeHint::MoveField { source_type, .. } => {
                return Err(UpgradeError::conflict(format!(
                    "unexpanded MoveField hint on '{}'",
                    source_type
                )));
            }
        }
    }
    Ok(())
}

/// Two hints claiming the same source or the same target are a conflict;
/// exact duplicates are tolerated.
fn check_collisions(hints: &HintSet) -> Result<(), UpgradeError> {
    let mut type_sources: HashMap<&str, &str> = HashMap::new();
    let mut type_targets: HashMap<&str, &str> = HashMap::new();
    let mut field_sources: HashMap<(&str, &str), (&str, &str)> = HashMap::new();
    let mut field_targets: HashMap<(&str, &str), (&str, &str)> = HashMap::new();

    for hint in hints.iter() {
        match hint {
            UpgradeHint::RenameType { old_type, new_type } => {
                if let Some(previous) = type_sources.insert(old_type, new_type) {
                    if previous != new_type {
                        return Err(UpgradeError::conflict(format!(
                            "type '{}' is renamed to both '{}' and '{}'",
                            old_type, previous, new_type
                        )));
                    }
                }
                if let Some(previous) = type_targets.insert(new_type, old_type) {
                    if previous != old_type {
                        return Err(UpgradeError::conflict(format!(
                            "type '{}' is the rename target of both '{}' and '{}'",
                            new_type, previous, old_type
                        )));
                    }
                }
            }
            UpgradeHint::RenameField {
                r#type,
                old_field,
                new_field,
            } => {
                let source = (r#type.as_str(), old_field.as_str());
                let target = (r#type.as_str(), new_field.as_str());
                if let Some(previous) = field_sources.insert(source, target) {
                    if previous != target {
                        return Err(UpgradeError::conflict(format!(
                            "field '{}.{}' is renamed twice",
                            r#type, old_field
                        )));
                    }
                }
                if let Some(previous) = field_targets.insert(target, source) {
                    if previous != source {
                        return Err(UpgradeError::conflict(format!(
                            "field '{}.{}' is the rename target of two hints",
                            r#type, new_field
                        )));
                    }
                }
            }
            UpgradeHint::CopyField {
                source_type,
                source_field,
                target_type,
                target_field,
            } => {
                let source = (source_type.as_str(), source_field.as_str());
                let target = (target_type.as_str(), target_field.as_str());
                if let Some(previous) = field_targets.insert(target, source) {
                    if previous != source {
                        return Err(UpgradeError::conflict(format!(
                            "field '{}.{}' is the copy target of two hints",
                            target_type, target_field
                        )));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Key-field sets on both sides of a copy must be structurally
/// compatible: primitive leaves pairable one-to-one by name, with
/// matching underlying base types.
fn check_copy_compatibility(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
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
            continue; // reference check already failed elsewhere
        };

        let source_keys = leaves_of_fields(&old.key_fields(source));
        let target_keys = leaves_of_fields(&new.key_fields(target));
        pair_leaves(&source_keys, &target_keys).map_err(|message| {
            UpgradeError::StructuralIncompatibility {
                source_path: format!("{}.{}", source_type, source_field),
                target: format!("{}.{}", target_type, target_field),
                message: format!("key fields are not compatible: {}", message),
            }
        })?;

        let (Some(sf), Some(tf)) = (source.field(source_field), target.field(target_field))
        else {
            continue;
        };
        let source_leaves = leaves_of_fields(&[sf]);
        let target_leaves = leaves_of_fields(&[tf]);
        if source_leaves.len() != target_leaves.len() {
            return Err(UpgradeError::StructuralIncompatibility {
                source_path: format!("{}.{}", source_type, source_field),
                target: format!("{}.{}", target_type, target_field),
                message: format!(
                    "copied field has {} primitive leaves on the source side and {} on the target",
                    source_leaves.len(),
                    target_leaves.len()
                ),
            });
        }
        for ((_, source_ct), (_, target_ct)) in source_leaves.iter().zip(target_leaves.iter()) {
            if source_ct.base != target_ct.base {
                return Err(UpgradeError::StructuralIncompatibility {
                    source_path: format!("{}.{}", source_type, source_field),
                    target: format!("{}.{}", target_type, target_field),
                    message: format!(
                        "leaf types differ: '{}' vs '{}'",
                        source_ct.base, target_ct.base
                    ),
                });
            }
        }
    }
    Ok(())
}

fn leaves_of_fields<'a>(fields: &[&'a StoredField]) -> Vec<(String, &'a ColumnType)> {
    let mut out = Vec::new();
    for field in fields {
        field.primitive_leaves(&mut out, "");
    }
    out
}

/// Pair leaves one-to-one by leaf name (the original field name, ignoring
/// the structure prefix) with matching base types.
fn pair_leaves(
    source: &[(String, &ColumnType)],
    target: &[(String, &ColumnType)],
) -> Result<(), String> {
    if source.len() != target.len() {
        return Err(format!(
            "{} primitive key leaves vs {}",
            source.len(),
            target.len()
        ));
    }
    for (name, source_ct) in source {
        let leaf = name.rsplit('.').next().unwrap_or(name);
        let Some((_, target_ct)) = target
            .iter()
            .find(|(n, _)| n.rsplit('.').next().unwrap_or(n) == leaf)
        else {
            return Err(format!("no key leaf named '{}' on the target side", leaf));
        };
        if source_ct.base != target_ct.base {
            return Err(format!(
                "key leaf '{}' changes type from '{}' to '{}'",
                leaf, source_ct.base, target_ct.base
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoredType;

    fn simple(name: &str, key_base: &str) -> StoredType {
        StoredType::entity(name, name)
            .with_field(StoredField::primitive("Id", key_base).key())
            .with_field(StoredField::primitive("Payload", "string"))
    }

    #[test]
    fn dangling_hint_is_fatal() {
        let old = DomainModel {
            types: vec![simple("App.A", "int64")],
            generators: vec![],
        };
        let new = old.clone();
        let hints = HintSet::new(vec![UpgradeHint::RemoveType {
            r#type: "App.Ghost".into(),
        }]);
        let err = validate(&old, &new, &hints, &Mapping::default());
        assert!(matches!(err, Err(UpgradeError::UnresolvedReference { .. })));
    }

    #[test]
    fn copy_with_mismatched_keys_is_fatal() {
        let old = DomainModel {
            types: vec![simple("App.A", "int64")],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![simple("App.B", "guid")],
            generators: vec![],
        };
        let hints = HintSet::new(vec![UpgradeHint::CopyField {
            source_type: "App.A".into(),
            source_field: "Payload".into(),
            target_type: "App.B".into(),
            target_field: "Payload".into(),
        }]);
        let err = validate(&old, &new, &hints, &Mapping::default());
        assert!(matches!(
            err,
            Err(UpgradeError::StructuralIncompatibility { .. })
        ));
    }

    #[test]
    fn two_copies_into_one_target_collide() {
        let old = DomainModel {
            types: vec![simple("App.A", "int64")],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![simple("App.B", "int64")],
            generators: vec![],
        };
        let hints = HintSet::new(vec![
            UpgradeHint::CopyField {
                source_type: "App.A".into(),
                source_field: "Id".into(),
                target_type: "App.B".into(),
                target_field: "Payload".into(),
            },
            UpgradeHint::CopyField {
                source_type: "App.A".into(),
                source_field: "Payload".into(),
                target_type: "App.B".into(),
                target_field: "Payload".into(),
            },
        ]);
        let err = validate(&old, &new, &hints, &Mapping::default());
        assert!(matches!(err, Err(UpgradeError::HintConflict { .. })));
    }
}
