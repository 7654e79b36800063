//! Type mapping (pipeline stage 2)

use log::debug;

use crate::domain::DomainModel;
use crate::error::UpgradeError;
use crate::hints::HintSet;
use crate::reconcile::{ReconcileOptions, ReconcileResult};

/// Resolve every non-connector old type to its new counterpart.
///
/// Resolution order: RemoveType hint (excluded), RenameType hint,
/// identical name, then — if auto-detection is enabled — a unique
/// mapping-name match ignoring namespace. Unresolved types are recorded
/// as suspicious; without auto-detection they are treated as removed.
pub fn build(
    old: &DomainModel,
    new: &DomainModel,
    hints: &HintSet,
    options: &ReconcileOptions,
    result: &mut ReconcileResult,
) -> Result<(), UpgradeError> {
    for old_type in old.types.iter().filter(|t| !t.is_connector()) {
        if hints.remove_type(&old_type.name) {
            result.removed_types.push(old_type.name.clone());
            continue;
        }

        if let Some(new_name) = hints.rename_of_type(&old_type.name) {
            let Some(new_type) = new.get(new_name) else {
                return Err(UpgradeError::UnresolvedReference {
                    kind: "type",
                    name: new_name.to_string(),
                    model: "new",
                });
            };
            result.mapping.map_type(&old_type.name, &new_type.name)?;
            continue;
        }

        if let Some(new_type) = new.get(&old_type.name) {
            result.mapping.map_type(&old_type.name, &new_type.name)?;
            continue;
        }

        if options.auto_detect_types {
            let mut candidates = new.types.iter().filter(|t| {
                !t.is_connector()
                    && t.mapping_name == old_type.mapping_name
                    && result.mapping.old_type_of(&t.name).is_none()
            });
            match (candidates.next(), candidates.next()) {
                (Some(only), None) => {
                    debug!(
                        "auto-detected type mapping by table name '{}': {} -> {}",
                        old_type.mapping_name, old_type.name, only.name
                    );
                    result.mapping.map_type(&old_type.name, &only.name)?;
                    continue;
                }
                (Some(first), Some(second)) => {
                    return Err(UpgradeError::conflict(format!(
                        "type '{}' matches both '{}' and '{}' by mapping name '{}'; \
                         declare a rename hint",
                        old_type.name, first.name, second.name, old_type.mapping_name
                    )));
                }
                (None, _) => {}
            }
        }

        debug!("type '{}' is unmatched, marking suspicious", old_type.name);
        result.suspicious_types.push(old_type.name.clone());
        if !options.auto_detect_types {
            result.removed_types.push(old_type.name.clone());
        }
    }

    // With auto-detection on, anything still suspicious is also treated
    // as removed; the distinction only matters for conflict reporting.
    if options.auto_detect_types {
        for name in &result.suspicious_types {
            if result.mapping.new_type_of(name).is_none() {
                result.removed_types.push(name.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StoredField, StoredType};
    use crate::hints::UpgradeHint;

    fn model(names: &[(&str, &str)]) -> DomainModel {
        DomainModel {
            types: names
                .iter()
                .map(|(name, table)| {
                    StoredType::entity(*name, *table)
                        .with_field(StoredField::primitive("Id", "int64").key())
                })
                .collect(),
            generators: vec![],
        }
    }

    fn run(
        old: &DomainModel,
        new: &DomainModel,
        hints: HintSet,
        auto: bool,
    ) -> Result<ReconcileResult, UpgradeError> {
        let mut result = ReconcileResult::default();
        build(
            old,
            new,
            &hints,
            &ReconcileOptions {
                auto_detect_types: auto,
            },
            &mut result,
        )?;
        Ok(result)
    }

    #[test]
    fn identical_names_map_without_hints() {
        let old = model(&[("App.Person", "Person")]);
        let new = model(&[("App.Person", "Person")]);
        let result = run(&old, &new, HintSet::default(), true).unwrap();
        assert_eq!(result.mapping.new_type_of("App.Person"), Some("App.Person"));
        assert!(result.suspicious_types.is_empty());
    }

    #[test]
    fn rename_hint_beats_auto_detection() {
        let old = model(&[("App.Person", "Person")]);
        let new = model(&[("App.Human", "Person")]);
        let hints = HintSet::new(vec![UpgradeHint::RenameType {
            old_type: "App.Person".into(),
            new_type: "App.Human".into(),
        }]);
        let result = run(&old, &new, hints, false).unwrap();
        assert_eq!(result.mapping.new_type_of("App.Person"), Some("App.Human"));
    }

    #[test]
    fn auto_detection_pairs_by_mapping_name() {
        let old = model(&[("App.Person", "Person")]);
        let new = model(&[("Core.Person2", "Person")]);
        let result = run(&old, &new, HintSet::default(), true).unwrap();
        assert_eq!(result.mapping.new_type_of("App.Person"), Some("Core.Person2"));
    }

    #[test]
    fn unmatched_types_are_suspicious_and_removed_without_auto_detection() {
        let old = model(&[("App.Legacy", "Legacy")]);
        let new = model(&[]);
        let result = run(&old, &new, HintSet::default(), false).unwrap();
        assert_eq!(result.suspicious_types, vec!["App.Legacy"]);
        assert_eq!(result.removed_types, vec!["App.Legacy"]);
    }

    #[test]
    fn double_mapping_is_a_hint_conflict() {
        let old = model(&[("App.A", "T"), ("App.B", "T2")]);
        let new = model(&[("App.C", "T3")]);
        let hints = HintSet::new(vec![
            UpgradeHint::RenameType {
                old_type: "App.A".into(),
                new_type: "App.C".into(),
            },
            UpgradeHint::RenameType {
                old_type: "App.B".into(),
                new_type: "App.C".into(),
            },
        ]);
        let err = run(&old, &new, hints, false);
        assert!(matches!(err, Err(UpgradeError::HintConflict { .. })));
    }
}
