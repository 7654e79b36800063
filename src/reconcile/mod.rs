//! Hint reconciliation
//!
//! Resolves the old (extracted) and new (current) domain models against
//! each other, consuming user hints and producing injective type/field
//! mappings plus synthesized schema-level data hints. Pipeline stages run
//! strictly in order; each depends on the previous:
//!
//! 1. generic-hint expansion
//! 2. type mapping
//! 3. field mapping
//! 4. connector (junction) type mapping
//! 5. MoveField rewriting into CopyField + RemoveField
//! 6. validation
//!
//! followed by schema-hint synthesis.

mod connectors;
mod data_hints;
mod field_mapping;
mod generics;
mod type_mapping;
mod validation;

use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::domain::DomainModel;
use crate::error::UpgradeError;
use crate::hints::{HintSet, SchemaHintSet, UpgradeHint};

/// A (type, field) reference; nested structure fields use dotted paths
/// (`Address.City`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldRef {
    pub type_name: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        FieldRef {
            type_name: type_name.into(),
            field: field.into(),
        }
    }
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field)
    }
}

/// The partial injection between old and new types/fields.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    type_forward: BTreeMap<String, String>,
    type_backward: BTreeMap<String, String>,
    field_forward: BTreeMap<FieldRef, FieldRef>,
    field_backward: BTreeMap<FieldRef, FieldRef>,
}

impl Mapping {
    /// Record an old->new type pair. Mapping the same pair twice is
    /// harmless; mapping either side to something else is a hint conflict.
    pub fn map_type(&mut self, old: &str, new: &str) -> Result<(), UpgradeError> {
        if let Some(existing) = self.type_forward.get(old) {
            if existing == new {
                return Ok(());
            }
            return Err(UpgradeError::conflict(format!(
                "type '{}' is already mapped to '{}', cannot also map it to '{}'",
                old, existing, new
            )));
        }
        if let Some(existing) = self.type_backward.get(new) {
            return Err(UpgradeError::conflict(format!(
                "type '{}' is already mapped from '{}', cannot also map it from '{}'",
                new, existing, old
            )));
        }
        debug!("type mapping: {} -> {}", old, new);
        self.type_forward.insert(old.to_string(), new.to_string());
        self.type_backward.insert(new.to_string(), old.to_string());
        Ok(())
    }

    pub fn map_field(&mut self, old: FieldRef, new: FieldRef) -> Result<(), UpgradeError> {
        if let Some(existing) = self.field_forward.get(&old) {
            if *existing == new {
                return Ok(());
            }
            return Err(UpgradeError::conflict(format!(
                "field '{}' is already mapped to '{}', cannot also map it to '{}'",
                old, existing, new
            )));
        }
        if let Some(existing) = self.field_backward.get(&new) {
            return Err(UpgradeError::conflict(format!(
                "field '{}' is already mapped from '{}', cannot also map it from '{}'",
                new, existing, old
            )));
        }
        self.field_forward.insert(old.clone(), new.clone());
        self.field_backward.insert(new, old);
        Ok(())
    }

    pub fn new_type_of(&self, old: &str) -> Option<&str> {
        self.type_forward.get(old).map(String::as_str)
    }

    pub fn old_type_of(&self, new: &str) -> Option<&str> {
        self.type_backward.get(new).map(String::as_str)
    }

    pub fn new_field_of(&self, old: &FieldRef) -> Option<&FieldRef> {
        self.field_forward.get(old)
    }

    pub fn old_field_of(&self, new: &FieldRef) -> Option<&FieldRef> {
        self.field_backward.get(new)
    }

    pub fn type_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.type_forward.iter().map(|(o, n)| (o.as_str(), n.as_str()))
    }

    pub fn field_pairs(&self) -> impl Iterator<Item = (&FieldRef, &FieldRef)> {
        self.field_forward.iter()
    }
}

/// Options steering reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Pair unmatched types by mapping name when no hint or name match
    /// resolves them.
    pub auto_detect_types: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            auto_detect_types: true,
        }
    }
}

/// Everything reconciliation produces for the comparer and translator.
#[derive(Debug, Clone, Default)]
pub struct ReconcileResult {
    pub mapping: Mapping,
    /// The hints after generic expansion and MoveField rewriting.
    pub resolved_hints: HintSet,
    pub schema_hints: SchemaHintSet,
    /// Old types with no mapping and no RemoveType hint; candidates for
    /// later table/data conflict detection.
    pub suspicious_types: Vec<String>,
    /// Old types treated as removed (hinted, or suspicious with
    /// auto-detection disabled).
    pub removed_types: Vec<String>,
    /// Source column paths whose removal is sanctioned by a hint.
    pub safe_column_removals: HashSet<String>,
    /// Source table paths whose removal is sanctioned by a hint.
    pub safe_table_removals: HashSet<String>,
    /// Target column paths whose type change is sanctioned by a hint.
    pub enforced_type_changes: HashSet<String>,
}

/// Run the full reconciliation pipeline.
pub fn process(
    old: &DomainModel,
    new: &DomainModel,
    input_hints: &HintSet,
    options: &ReconcileOptions,
) -> Result<ReconcileResult, UpgradeError> {
    let hints = generics::expand(old, new, input_hints)?;

    let mut result = ReconcileResult::default();
    type_mapping::build(old, new, &hints, options, &mut result)?;
    field_mapping::build(old, new, &hints, &mut result.mapping)?;
    connectors::build(old, new, &mut result.mapping)?;

    let hints = rewrite_moves(&hints);
    validation::validate(old, new, &hints, &result.mapping)?;
    data_hints::synthesize(old, new, &hints, &mut result)?;
    result.resolved_hints = hints;
    Ok(result)
}

/// Stage 5: a MoveField hint is exactly a copy followed by a removal.
fn rewrite_moves(hints: &HintSet) -> HintSet {
    let mut out = Vec::with_capacity(hints.hints.len());
    for hint in hints.iter() {
        match hint {
            UpgradeHint::MoveField {
                source_type,
                source_field,
                target_type,
            } => {
                out.push(UpgradeHint::CopyField {
                    source_type: source_type.clone(),
                    source_field: source_field.clone(),
                    target_type: target_type.clone(),
                    target_field: source_field.clone(),
                });
                out.push(UpgradeHint::RemoveField {
                    r#type: source_type.clone(),
                    field: source_field.clone(),
                });
            }
            other => out.push(other.clone()),
        }
    }
    HintSet::new(out)
}
