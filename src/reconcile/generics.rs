//! Generic-type hint expansion
//!
//! A hint declared against an open generic definition (`App.Pair<,>`)
//! stands for one hint per closed instantiation present in both models,
//! paired by generic-argument identity (after applying type renames to
//! the arguments themselves).

use crate::domain::{DomainModel, StoredType};
use crate::error::UpgradeError;
use crate::hints::{HintSet, UpgradeHint};

/// Whether a type name denotes an open generic definition: an argument
/// list with only empty positions (`Pair<,>`, `Triplet<,,>`).
fn is_open_generic(name: &str) -> bool {
    match (name.find('<'), name.rfind('>')) {
        (Some(open), Some(close)) if open < close => name[open + 1..close]
            .split(',')
            .all(|arg| arg.trim().is_empty()),
        _ => false,
    }
}

fn instantiations<'a>(model: &'a DomainModel, definition: &str) -> Vec<&'a StoredType> {
    model
        .types
        .iter()
        .filter(|t| t.generic_definition.as_deref() == Some(definition))
        .collect()
}

/// Map an old argument list through explicit RenameType hints.
fn rename_args(args: &[String], hints: &HintSet) -> Vec<String> {
    args.iter()
        .map(|arg| {
            hints
                .rename_of_type(arg)
                .map(str::to_string)
                .unwrap_or_else(|| arg.clone())
        })
        .collect()
}

/// Find the closed new-model counterpart of an old instantiation.
fn paired_instantiation<'a>(
    new: &'a DomainModel,
    new_definition: &str,
    old_args: &[String],
    hints: &HintSet,
) -> Option<&'a StoredType> {
    let wanted = rename_args(old_args, hints);
    instantiations(new, new_definition)
        .into_iter()
        .find(|t| t.generic_arguments == wanted)
}

/// Expand every open-generic hint into its closed counterparts; all other
/// hints pass through unchanged.
pub fn expand(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
) -> Result<HintSet, UpgradeError> {
    let mut out = Vec::with_capacity(hints.hints.len());
    for hint in hints.iter() {
        match hint {
            UpgradeHint::RenameType { old_type, new_type }
                if is_open_generic(old_type) && is_open_generic(new_type) =>
            {
                let mut expanded = false;
                for closed in instantiations(old, old_type) {
                    if let Some(counterpart) =
                        paired_instantiation(new, new_type, &closed.generic_arguments, hints)
                    {
                        out.push(UpgradeHint::RenameType {
                            old_type: closed.name.clone(),
                            new_type: counterpart.name.clone(),
                        });
                        expanded = true;
                    }
                }
                if !expanded {
                    return Err(UpgradeError::UnresolvedReference {
                        kind: "generic type",
                        name: old_type.clone(),
                        model: "old",
                    });
                }
            }
            UpgradeHint::RemoveType { r#type } if is_open_generic(r#type) => {
                for closed in instantiations(old, r#type) {
                    out.push(UpgradeHint::RemoveType {
                        r#type: closed.name.clone(),
                    });
                }
            }
            UpgradeHint::RenameField {
                r#type,
                old_field,
                new_field,
            } if is_open_generic(r#type) => {
                // Declared against the new model.
                for closed in instantiations(new, r#type) {
                    out.push(UpgradeHint::RenameField {
                        r#type: closed.name.clone(),
                        old_field: old_field.clone(),
                        new_field: new_field.clone(),
                    });
                }
            }
            UpgradeHint::RemoveField { r#type, field } if is_open_generic(r#type) => {
                for closed in instantiations(old, r#type) {
                    out.push(UpgradeHint::RemoveField {
                        r#type: closed.name.clone(),
                        field: field.clone(),
                    });
                }
            }
            UpgradeHint::ChangeFieldType { r#type, field } if is_open_generic(r#type) => {
                for closed in instantiations(old, r#type) {
                    out.push(UpgradeHint::ChangeFieldType {
                        r#type: closed.name.clone(),
                        field: field.clone(),
                    });
                }
            }
            UpgradeHint::CopyField {
                source_type,
                source_field,
                target_type,
                target_field,
            } if is_open_generic(source_type) && is_open_generic(target_type) => {
                for closed in instantiations(old, source_type) {
                    if let Some(counterpart) =
                        paired_instantiation(new, target_type, &closed.generic_arguments, hints)
                    {
                        out.push(UpgradeHint::CopyField {
                            source_type: closed.name.clone(),
                            source_field: source_field.clone(),
                            target_type: counterpart.name.clone(),
                            target_field: target_field.clone(),
                        });
                    }
                }
            }
            UpgradeHint::MoveField {
                source_type,
                source_field,
                target_type,
            } if is_open_generic(source_type) && is_open_generic(target_type) => {
                for closed in instantiations(old, source_type) {
                    if let Some(counterpart) =
                        paired_instantiation(new, target_type, &closed.generic_arguments, hints)
                    {
                        out.push(UpgradeHint::MoveField {
                            source_type: closed.name.clone(),
                            source_field: source_field.clone(),
                            target_type: counterpart.name.clone(),
                        });
                    }
                }
            }
            other => out.push(other.clone()),
        }
    }
    Ok(HintSet::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoredField;

    fn closed_pair(model_prefix: &str, def: &str, arg: &str) -> StoredType {
        let mut t = StoredType::entity(
            format!("{}<{}>", model_prefix, arg),
            format!("{}-{}", model_prefix, arg),
        )
        .with_field(StoredField::primitive("Id", "int64").key());
        t.generic_definition = Some(def.to_string());
        t.generic_arguments = vec![arg.to_string()];
        t
    }

    #[test]
    fn open_generic_detection() {
        assert!(is_open_generic("App.Pair<,>"));
        assert!(is_open_generic("App.Box<>"));
        assert!(!is_open_generic("App.Pair<Int32,String>"));
        assert!(!is_open_generic("App.Person"));
    }

    #[test]
    fn rename_expands_per_instantiation() {
        let old = DomainModel {
            types: vec![
                closed_pair("App.Pair", "App.Pair<,>", "Int32"),
                closed_pair("App.Pair", "App.Pair<,>", "String"),
            ],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![
                closed_pair("App.Tuple", "App.Tuple<,>", "Int32"),
                closed_pair("App.Tuple", "App.Tuple<,>", "String"),
            ],
            generators: vec![],
        };
        let hints = HintSet::new(vec![UpgradeHint::RenameType {
            old_type: "App.Pair<,>".into(),
            new_type: "App.Tuple<,>".into(),
        }]);
        let expanded = expand(&old, &new, &hints).unwrap();
        assert_eq!(expanded.hints.len(), 2);
        assert!(expanded.hints.contains(&UpgradeHint::RenameType {
            old_type: "App.Pair<Int32>".into(),
            new_type: "App.Tuple<Int32>".into(),
        }));
    }
}
