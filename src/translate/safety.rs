//! Safety classification
//!
//! A post-pass over the whole action list, independent of staging. An
//! action is unsafe when it could lose data without an explicit hint
//! sanctioning it: an unprovably-lossless column type change, a column
//! or table removal outside the hint-derived safe sets, a data action
//! whose difference shows a recreation, or a cross-hierarchy deletion
//! deferred to post-copy. Rename tracking rewrites a column's table-path
//! segment through the rename map before the safe-set lookup.

use std::collections::{HashMap, HashSet};

use crate::compare::{ActionKind, ActionSequence};
use crate::model::{rewrite_table, table_of, NodeKind, StorageModel};
use crate::reconcile::ReconcileResult;

pub fn classify(
    actions: &ActionSequence,
    source: &StorageModel,
    target: &StorageModel,
    reconciled: &ReconcileResult,
) -> Vec<String> {
    let renames = table_renames(reconciled);
    let mut unsafe_details = Vec::new();

    for (_, action) in actions.iter() {
        match &action.kind {
            ActionKind::PropertyChange {
                source_path,
                target_path,
            } if action.difference.kind == NodeKind::Column => {
                let from = source
                    .resolve(source_path)
                    .and_then(|id| source.node(id).payload.as_column());
                let to = target
                    .resolve(target_path)
                    .and_then(|id| target.node(id).payload.as_column());
                let (Some(from), Some(to)) = (from, to) else {
                    continue;
                };
                if from.column_type == to.column_type {
                    continue;
                }
                if from.column_type.is_lossless_change_to(&to.column_type) {
                    continue;
                }
                if reconciled.enforced_type_changes.contains(target_path) {
                    continue;
                }
                unsafe_details.push(format!(
                    "column type change {} : {} -> {} cannot be proven lossless",
                    target_path, from.column_type, to.column_type
                ));
            }
            ActionKind::RemoveNode { path } if action.difference.kind == NodeKind::Column => {
                if !covered(&reconciled.safe_column_removals, path, &renames) {
                    unsafe_details.push(format!(
                        "column removal {} is not sanctioned by a remove-field hint",
                        path
                    ));
                }
            }
            ActionKind::RemoveNode { path } if action.difference.kind == NodeKind::Table => {
                if !covered(&reconciled.safe_table_removals, path, &renames) {
                    unsafe_details.push(format!(
                        "table removal {} is not sanctioned by a remove-type hint",
                        path
                    ));
                }
            }
            ActionKind::CopyData(_) | ActionKind::DeleteData(_) | ActionKind::UpdateData(_) => {
                let movement = action.difference.movement;
                if movement.created && movement.removed {
                    unsafe_details.push(format!(
                        "data action '{}' targets a recreated table; its rows do not survive",
                        action
                    ));
                } else if let ActionKind::DeleteData(delete) = &action.kind {
                    if delete.post_copy {
                        unsafe_details.push(format!(
                            "cross-hierarchy deletion from {} runs after the data copy",
                            delete.table
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    unsafe_details
}

/// Both directions of every table-level rename hint.
fn table_renames(reconciled: &ReconcileResult) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for rename in &reconciled.schema_hints.renames {
        if !rename.source_path.contains("/Columns/") {
            map.insert(rename.source_path.clone(), rename.target_path.clone());
            map.insert(rename.target_path.clone(), rename.source_path.clone());
        }
    }
    map
}

/// Safe-set membership, retried with the table segment rewritten through
/// the rename map when the direct lookup misses.
fn covered(safe: &HashSet<String>, path: &str, renames: &HashMap<String, String>) -> bool {
    if safe.contains(path) {
        return true;
    }
    let Some(table) = table_of(path) else {
        return safe.contains(path);
    };
    match renames.get(table) {
        Some(other) => safe.contains(&rewrite_table(path, table, other)),
        None => false,
    }
}
