//! Deferred data actions
//!
//! Data hints are not executed where they appear in the action stream;
//! they are collected per stage, merged per table, and replayed as
//! set-based operations ordered by foreign-key dependency: rows are
//! deleted from referencing tables before the tables they reference, and
//! copied into referenced tables before the tables referencing them.

use std::collections::{HashMap, HashSet};

use crate::hints::{CopyDataHint, DeleteDataHint, UpdateDataHint};
use crate::model::{leaf_name, NodeKind, StorageModel};
use crate::translate::operations::StructuralOperation;

#[derive(Default)]
pub struct DataBucket {
    pub copies: Vec<CopyDataHint>,
    pub deletes: Vec<DeleteDataHint>,
    pub updates: Vec<UpdateDataHint>,
}

impl DataBucket {
    /// Drain the bucket into ordered operations. `working` is the
    /// current schema; its foreign keys drive the ordering.
    pub fn flush(&mut self, working: &StorageModel) -> Vec<StructuralOperation> {
        let mut ops = Vec::new();

        // Updates run first; clearing references unblocks the deletes.
        for update in self.updates.drain(..) {
            ops.push(StructuralOperation::UpdateData {
                table: update.table,
                column: leaf_name(&update.column).to_string(),
                value: update.value,
                identity: update.identity,
            });
        }

        let mut deletes = merge_deletes(std::mem::take(&mut self.deletes));
        let delete_tables: Vec<String> = deletes.iter().map(|d| d.table.clone()).collect();
        let order = dependency_order(working, &delete_tables);
        // Referencing tables first.
        for table in order.iter().rev() {
            if let Some(pos) = deletes.iter().position(|d| &d.table == table) {
                let delete = deletes.remove(pos);
                ops.push(StructuralOperation::DeleteData {
                    table: delete.table,
                    identity: delete.identity,
                });
            }
        }
        for delete in deletes {
            ops.push(StructuralOperation::DeleteData {
                table: delete.table,
                identity: delete.identity,
            });
        }

        let copy_tables: Vec<String> = self.copies.iter().map(|c| c.target_table.clone()).collect();
        let order = dependency_order(working, &copy_tables);
        // Referenced tables first.
        let mut copies = std::mem::take(&mut self.copies);
        for table in &order {
            while let Some(pos) = copies.iter().position(|c| &c.target_table == table) {
                let copy = copies.remove(pos);
                ops.push(StructuralOperation::CopyData {
                    source_table: copy.source_table,
                    target_table: copy.target_table,
                    columns: copy.columns,
                    identity: copy.identity,
                });
            }
        }
        for copy in copies {
            ops.push(StructuralOperation::CopyData {
                source_table: copy.source_table,
                target_table: copy.target_table,
                columns: copy.columns,
                identity: copy.identity,
            });
        }
        ops
    }
}

/// Collapse duplicate deletes against the same table and identity.
fn merge_deletes(deletes: Vec<DeleteDataHint>) -> Vec<DeleteDataHint> {
    let mut out: Vec<DeleteDataHint> = Vec::new();
    for delete in deletes {
        if !out
            .iter()
            .any(|d| d.table == delete.table && d.identity == delete.identity)
        {
            out.push(delete);
        }
    }
    out
}

/// Tables ordered so that every referenced table appears before the
/// tables referencing it; delete callers iterate in reverse. Cycles are
/// broken at the revisit point.
fn dependency_order(working: &StorageModel, tables: &[String]) -> Vec<String> {
    let wanted: HashSet<&str> = tables.iter().map(String::as_str).collect();
    let mut references: HashMap<&str, Vec<String>> = HashMap::new();
    for table in working.tables() {
        let outgoing: Vec<String> = working
            .children_of_kind(table.id, NodeKind::ForeignKey)
            .filter_map(|fk| fk.payload.as_foreign_key())
            .map(|fk| fk.referenced_table.clone())
            .collect();
        references.insert(table.path.as_str(), outgoing);
    }

    let mut order: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    for table in tables {
        visit(table, &references, &wanted, &mut visited, &mut order);
    }
    order
}

fn visit(
    table: &str,
    references: &HashMap<&str, Vec<String>>,
    wanted: &HashSet<&str>,
    visited: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if !visited.insert(table.to_string()) {
        return;
    }
    if let Some(outgoing) = references.get(table) {
        for referenced in outgoing {
            if wanted.contains(referenced.as_str()) {
                visit(referenced, references, wanted, visited, order);
            }
        }
    }
    if wanted.contains(table) {
        order.push(table.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ColumnNode, ColumnType, ForeignKeyNode, NodePayload, ReferentialAction, TableNode,
    };

    fn model_with_fk() -> StorageModel {
        let mut model = StorageModel::new("db");
        let orders = model
            .add_node(None, "Orders".to_string(), NodePayload::Table(TableNode))
            .unwrap();
        let lines = model
            .add_node(None, "Lines".to_string(), NodePayload::Table(TableNode))
            .unwrap();
        for (table, column) in [(orders, "Id"), (lines, "OrderId")] {
            model
                .add_node(
                    Some(table),
                    column.to_string(),
                    NodePayload::Column(ColumnNode {
                        column_type: ColumnType::new("int64"),
                        nullable: false,
                        default_value: None,
                        collation: None,
                    }),
                )
                .unwrap();
        }
        model
            .add_node(
                Some(lines),
                "FK_Lines_Orders".to_string(),
                NodePayload::ForeignKey(ForeignKeyNode {
                    columns: vec!["OrderId".into()],
                    referenced_table: "Tables/Orders".into(),
                    referenced_columns: vec!["Id".into()],
                    on_delete: ReferentialAction::NoAction,
                }),
            )
            .unwrap();
        model
    }

    #[test]
    fn deletes_run_against_referencing_tables_first() {
        let model = model_with_fk();
        let mut bucket = DataBucket::default();
        for table in ["Tables/Orders", "Tables/Lines"] {
            bucket.deletes.push(DeleteDataHint {
                table: table.to_string(),
                identity: vec![],
                post_copy: false,
                due_to_table_conflict: false,
            });
        }
        let ops = bucket.flush(&model);
        let tables: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                StructuralOperation::DeleteData { table, .. } => Some(table.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tables, vec!["Tables/Lines", "Tables/Orders"]);
    }

    #[test]
    fn copies_fill_referenced_tables_first() {
        let model = model_with_fk();
        let mut bucket = DataBucket::default();
        for (source, target) in [
            ("Tables/OldLines", "Tables/Lines"),
            ("Tables/OldOrders", "Tables/Orders"),
        ] {
            bucket.copies.push(CopyDataHint {
                source_table: source.to_string(),
                target_table: target.to_string(),
                identity: vec![],
                columns: vec![],
            });
        }
        let ops = bucket.flush(&model);
        let targets: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                StructuralOperation::CopyData { target_table, .. } => Some(target_table.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec!["Tables/Orders", "Tables/Lines"]);
    }

    #[test]
    fn duplicate_deletes_collapse() {
        let model = model_with_fk();
        let mut bucket = DataBucket::default();
        for _ in 0..2 {
            bucket.deletes.push(DeleteDataHint {
                table: "Tables/Orders".to_string(),
                identity: vec![],
                post_copy: false,
                due_to_table_conflict: false,
            });
        }
        assert_eq!(bucket.flush(&model).len(), 1);
    }
}
