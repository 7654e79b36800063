//! Upgrade hints
//!
//! User-declared hints resolve ambiguities between the old and the new
//! domain model; the reconciler additionally synthesizes schema-level data
//! hints (rename / copy / delete / update) consumed by the comparer and
//! the translator.

use serde::{Deserialize, Serialize};

/// A user-declared reconciliation hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeHint {
    RenameType {
        old_type: String,
        new_type: String,
    },
    RemoveType {
        r#type: String,
    },
    /// Declared against the new type; the old field is resolved through
    /// the type mapping.
    RenameField {
        r#type: String,
        old_field: String,
        new_field: String,
    },
    /// Declared against the old type.
    RemoveField {
        r#type: String,
        field: String,
    },
    /// Sanctions an otherwise-incompatible value-type change.
    ChangeFieldType {
        r#type: String,
        field: String,
    },
    CopyField {
        source_type: String,
        source_field: String,
        target_type: String,
        target_field: String,
    },
    /// Rewritten by the reconciler into CopyField + RemoveField.
    MoveField {
        source_type: String,
        source_field: String,
        target_type: String,
    },
}

/// The set of hints supplied for one upgrade run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HintSet {
    pub hints: Vec<UpgradeHint>,
}

impl HintSet {
    pub fn new(hints: Vec<UpgradeHint>) -> Self {
        HintSet { hints }
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpgradeHint> {
        self.hints.iter()
    }

    pub fn remove_type(&self, old_type: &str) -> bool {
        self.hints
            .iter()
            .any(|h| matches!(h, UpgradeHint::RemoveType { r#type } if r#type == old_type))
    }

    pub fn rename_of_type(&self, old: &str) -> Option<&str> {
        self.hints.iter().find_map(|h| match h {
            UpgradeHint::RenameType { old_type, new_type } if old_type == old => {
                Some(new_type.as_str())
            }
            _ => None,
        })
    }

    /// The new-field name a RenameField hint assigns to `old_field_name`
    /// of the given new type.
    pub fn renamed_field_target(&self, new_type: &str, old_field_name: &str) -> Option<&str> {
        self.hints.iter().find_map(|h| match h {
            UpgradeHint::RenameField {
                r#type,
                old_field,
                new_field,
            } if r#type == new_type && old_field == old_field_name => Some(new_field.as_str()),
            _ => None,
        })
    }

    pub fn remove_field(&self, old_type: &str, field_name: &str) -> bool {
        self.hints.iter().any(|h| {
            matches!(h, UpgradeHint::RemoveField { r#type, field }
                if r#type == old_type && field == field_name)
        })
    }

    pub fn change_field_type(&self, type_name: &str, field_name: &str) -> bool {
        self.hints.iter().any(|h| {
            matches!(h, UpgradeHint::ChangeFieldType { r#type, field }
                if r#type == type_name && field == field_name)
        })
    }
}

/// One identity predicate of a data hint: a join between two columns or a
/// constant filter against one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityPair {
    /// Join `source` (source-model column path) with `target`
    /// (target-model column path) when copying rows across tables.
    Columns { source: String, target: String },
    /// Filter `column` (a column path) by a constant value.
    Constant { column: String, value: String },
}

/// One copied column of a CopyData hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedColumnPair {
    /// Source-model column path.
    pub source: String,
    /// Target-model column path.
    pub target: String,
}

/// Schema-level rename: a source-model path paired with the target-model
/// path it becomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameHint {
    pub source_path: String,
    pub target_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyDataHint {
    /// Source-model table path rows are copied from.
    pub source_table: String,
    /// Target-model table path rows are copied into.
    pub target_table: String,
    pub identity: Vec<IdentityPair>,
    pub columns: Vec<CopiedColumnPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDataHint {
    /// Source-model table path rows are deleted from.
    pub table: String,
    pub identity: Vec<IdentityPair>,
    /// Deferred until after CopyData when the affected type was moved to
    /// another hierarchy (its rows are copied out first).
    pub post_copy: bool,
    /// Set when the delete exists because the table is reused by a
    /// different new type.
    pub due_to_table_conflict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDataHint {
    pub table: String,
    /// Column path whose values are cleared.
    pub column: String,
    /// New value; `None` clears to NULL.
    pub value: Option<String>,
    pub identity: Vec<IdentityPair>,
    pub post_copy: bool,
}

/// All schema-level hints synthesized (or passed through) for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaHintSet {
    pub renames: Vec<RenameHint>,
    pub copies: Vec<CopyDataHint>,
    pub deletes: Vec<DeleteDataHint>,
    pub updates: Vec<UpdateDataHint>,
}

impl SchemaHintSet {
    /// Total number of hints across all four kinds.
    pub fn len(&self) -> usize {
        self.renames.len() + self.copies.len() + self.deletes.len() + self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Target path a source path is renamed to, if hinted.
    pub fn rename_target(&self, source_path: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|r| r.source_path == source_path)
            .map(|r| r.target_path.as_str())
    }

    /// Source path a target path is renamed from, if hinted.
    pub fn rename_source(&self, target_path: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|r| r.target_path == target_path)
            .map(|r| r.source_path.as_str())
    }
}
