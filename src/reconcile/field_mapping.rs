//! Field mapping (pipeline stage 3)

use log::debug;

use crate::domain::{DomainModel, FieldValue, StoredField, StoredType};
use crate::error::UpgradeError;
use crate::hints::HintSet;
use crate::reconcile::{FieldRef, Mapping};

/// Pair the fields of every mapped type pair.
pub fn build(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
    mapping: &mut Mapping,
) -> Result<(), UpgradeError> {
    let pairs: Vec<(String, String)> = mapping
        .type_pairs()
        .map(|(o, n)| (o.to_string(), n.to_string()))
        .collect();
    for (old_name, new_name) in pairs {
        let (Some(old_type), Some(new_type)) = (old.get(&old_name), new.get(&new_name)) else {
            continue;
        };
        map_fields(old, new, old_type, new_type, hints, mapping, "", "")?;
    }
    Ok(())
}

/// Pair `old_type`'s fields with `new_type`'s. `old_prefix`/`new_prefix`
/// carry the dotted path of the enclosing structure fields, empty at the
/// top level.
#[allow(clippy::too_many_arguments)]
fn map_fields(
    old: &DomainModel,
    new: &DomainModel,
    old_type: &StoredType,
    new_type: &StoredType,
    hints: &HintSet,
    mapping: &mut Mapping,
    old_prefix: &str,
    new_prefix: &str,
) -> Result<(), UpgradeError> {
    let old_fields: Vec<&StoredField> = if old_prefix.is_empty() {
        old_type.fields.iter().collect()
    } else {
        fields_at(old_type, old_prefix)
    };
    let new_fields: Vec<&StoredField> = if new_prefix.is_empty() {
        new_type.fields.iter().collect()
    } else {
        fields_at(new_type, new_prefix)
    };

    for old_field in old_fields {
        // Explicit rename hint, declared against the new type.
        let hinted = hints
            .renamed_field_target(&new_type.name, &old_field.name)
            .and_then(|target| new_fields.iter().find(|f| f.name == target).copied());
        // Identical name, then the overridden-property fallback.
        let candidate = hinted
            .or_else(|| new_fields.iter().find(|f| f.name == old_field.name).copied())
            .or_else(|| {
                new_fields
                    .iter()
                    .find(|f| f.original_name.as_deref() == Some(old_field.name.as_str()))
                    .copied()
            });
        let Some(new_field) = candidate else {
            debug!(
                "field {}.{} has no counterpart in {}",
                old_type.name, old_field.name, new_type.name
            );
            continue;
        };

        if !values_compatible(new, old_type, old_field, new_field, hints, mapping) {
            debug!(
                "field {}.{} -> {}.{} skipped: value types are incompatible and not hinted",
                old_type.name, old_field.name, new_type.name, new_field.name
            );
            continue;
        }

        let old_path = join(old_prefix, &old_field.name);
        let new_path = join(new_prefix, &new_field.name);
        mapping.map_field(
            FieldRef::new(&old_type.name, &old_path),
            FieldRef::new(&new_type.name, &new_path),
        )?;

        // Structure fields map eagerly; their nested fields reconcile
        // right after.
        if matches!(old_field.value, FieldValue::Structure { .. })
            && matches!(new_field.value, FieldValue::Structure { .. })
        {
            map_fields(
                old, new, old_type, new_type, hints, mapping, &old_path, &new_path,
            )?;
        }
    }
    Ok(())
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Nested fields of the structure field at a dotted path.
fn fields_at<'a>(stored: &'a StoredType, path: &str) -> Vec<&'a StoredField> {
    let mut current: &[StoredField] = &stored.fields;
    for segment in path.split('.') {
        match current.iter().find(|f| f.name == segment) {
            Some(field) => current = &field.fields,
            None => return Vec::new(),
        }
    }
    current.iter().collect()
}

/// Whether two paired fields' value types are compatible, per the rules:
/// identical primitives, hinted type changes, compatibly-mapped
/// references (including covariant mapping to an ancestor), structures
/// and entity sets of any shape (reconciled recursively / by connector).
fn values_compatible(
    new: &DomainModel,
    old_type: &StoredType,
    old_field: &StoredField,
    new_field: &StoredField,
    hints: &HintSet,
    mapping: &Mapping,
) -> bool {
    if hints.change_field_type(&old_type.name, &old_field.name) {
        return true;
    }
    match (&old_field.value, &new_field.value) {
        (FieldValue::Primitive(a), FieldValue::Primitive(b)) => a.base == b.base,
        (
            FieldValue::Reference { target_type: a },
            FieldValue::Reference { target_type: b },
        ) => {
            let mapped = match mapping.new_type_of(a) {
                Some(m) => m,
                // Same-named reference targets that simply have not been
                // visited yet still count as compatible.
                None => a.as_str(),
            };
            if mapped == b {
                return true;
            }
            // Covariant: the new field may reference an ancestor of the
            // mapped target.
            match (new.get(mapped), new.get(b)) {
                (Some(mapped_type), Some(field_target)) => {
                    new.is_ancestor_of(field_target, mapped_type)
                }
                _ => false,
            }
        }
        (FieldValue::Structure { .. }, FieldValue::Structure { .. }) => true,
        (FieldValue::EntitySet { .. }, FieldValue::EntitySet { .. }) => true,
        _ => false,
    }
}
