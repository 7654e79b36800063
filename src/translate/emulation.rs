//! Capability emulation
//!
//! Rewrites operations a provider cannot express directly: shadow-table
//! rebuilds for column drops/renames, single-row counter tables for
//! sequences, and collision-free temporary names for rename parking.

use crate::error::UpgradeError;
use crate::hints::{CopiedColumnPair, IdentityPair};
use crate::model::{
    column_path, table_path, ColumnNode, ColumnType, NodeId, NodeKind, NodePayload, StorageModel,
};
use crate::translate::operations::{ColumnSpec, StructuralOperation, TableSpec};

pub fn column_spec(name: &str, column: &ColumnNode) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        column_type: column.column_type.clone(),
        nullable: column.nullable,
        default_value: column.default_value.clone(),
        collation: column.collation.clone(),
    }
}

/// Full creation spec of a table node: its columns plus its primary
/// index, in child order.
pub fn table_spec(model: &StorageModel, table_id: NodeId) -> TableSpec {
    let table = model.node(table_id);
    let columns = model
        .children_of_kind(table_id, NodeKind::Column)
        .filter_map(|n| n.payload.as_column().map(|c| column_spec(&n.name, c)))
        .collect();
    let primary_index = model
        .children_of_kind(table_id, NodeKind::PrimaryIndex)
        .next()
        .and_then(|n| {
            n.payload
                .as_primary_index()
                .map(|p| (n.name.clone(), p.clone()))
        });
    TableSpec {
        name: table.name.clone(),
        columns,
        primary_index,
    }
}

/// A counter table standing in for a native sequence: one autoincrement
/// row seeded so the next drawn value continues the sequence.
pub fn generator_table(name: &str, seed: i64, increment: i64) -> StructuralOperation {
    StructuralOperation::CreateGeneratorTable {
        name: name.to_string(),
        value_type: ColumnType::new("int64"),
        seed,
        increment,
    }
}

/// First `{base}~N` not taken by any root node of the model.
pub fn free_name(model: &StorageModel, base: &str) -> String {
    let mut n = 1;
    loop {
        let candidate = format!("{}~{}", base, n);
        if model.resolve(&table_path(&candidate)).is_none() {
            return candidate;
        }
        n += 1;
    }
}

/// Rebuild a table through a shadow copy, with one column left out or
/// renamed along the way. Emits: create shadow, copy rows, drop the
/// original, rename the shadow back. The working model ends up with the
/// table under its own name minus/with the adjusted column.
fn shadow_rebuild(
    working: &mut StorageModel,
    table_id: NodeId,
    drop_column: Option<&str>,
    rename: Option<(&str, &str)>,
    recreated_columns: &mut Vec<String>,
) -> Result<Vec<StructuralOperation>, UpgradeError> {
    let table_name = working.node(table_id).name.clone();
    let shadow_name = free_name(working, &table_name);

    let mut spec = table_spec(working, table_id);
    spec.name = shadow_name.clone();
    let mut copies = Vec::new();
    spec.columns.retain_mut(|column| {
        if drop_column == Some(column.name.as_str()) {
            return false;
        }
        let target_name = match rename {
            Some((old, new)) if column.name == old => new.to_string(),
            _ => column.name.clone(),
        };
        copies.push(CopiedColumnPair {
            source: column_path(&table_name, &column.name),
            target: column_path(&shadow_name, &target_name),
        });
        column.name = target_name;
        true
    });

    if let Some((old, new)) = rename {
        if let Some((_, pk)) = &mut spec.primary_index {
            for key in &mut pk.key_columns {
                if key == old {
                    *key = new.to_string();
                }
            }
        }
    }
    // Secondary structures die with the original; the caller's later
    // create actions restore the ones the target still wants, so only
    // the primary index is carried by the create itself.
    let ops = vec![
        StructuralOperation::CreateTable { table: spec },
        StructuralOperation::CopyData {
            source_table: table_path(&table_name),
            target_table: table_path(&shadow_name),
            columns: copies,
            identity: Vec::<IdentityPair>::new(),
        },
        StructuralOperation::RemoveTable {
            table: table_name.clone(),
        },
        StructuralOperation::RenameTable {
            old_name: shadow_name,
            new_name: table_name,
        },
    ];

    // Apply to the working model in place.
    let children: Vec<NodeId> = working.node(table_id).children.clone();
    for child in children {
        let node = working.node(child);
        match node.kind() {
            NodeKind::Column => {
                if drop_column == Some(node.name.as_str()) {
                    working.remove_node(child);
                } else if let Some((old, new)) = rename {
                    if node.name == old {
                        working.rename_node(child, new.to_string());
                    }
                }
            }
            NodeKind::SecondaryIndex | NodeKind::FullTextIndex | NodeKind::ForeignKey => {
                working.remove_node(child);
            }
            _ => {}
        }
    }
    for column in working
        .children_of_kind(table_id, NodeKind::Column)
        .map(|n| n.path.clone())
        .collect::<Vec<_>>()
    {
        recreated_columns.push(column);
    }
    Ok(ops)
}

pub fn rebuild_without_column(
    working: &mut StorageModel,
    table_id: NodeId,
    column: &str,
    recreated_columns: &mut Vec<String>,
) -> Result<Vec<StructuralOperation>, UpgradeError> {
    shadow_rebuild(working, table_id, Some(column), None, recreated_columns)
}

pub fn rebuild_with_renamed_column(
    working: &mut StorageModel,
    table_id: NodeId,
    old_name: &str,
    new_name: &str,
    recreated_columns: &mut Vec<String>,
) -> Result<Vec<StructuralOperation>, UpgradeError> {
    shadow_rebuild(
        working,
        table_id,
        None,
        Some((old_name, new_name)),
        recreated_columns,
    )
}

/// Table rename on a provider that cannot rename tables: create the new
/// table, copy everything across, drop the old one. The working node
/// already carries the new name when this is called.
pub fn rebuild_as(
    working: &mut StorageModel,
    table_id: NodeId,
    old_name: &str,
    new_name: &str,
) -> Result<Vec<StructuralOperation>, UpgradeError> {
    let mut spec = table_spec(working, table_id);
    spec.name = new_name.to_string();
    let copies = spec
        .columns
        .iter()
        .map(|c| CopiedColumnPair {
            source: column_path(old_name, &c.name),
            target: column_path(new_name, &c.name),
        })
        .collect();
    Ok(vec![
        StructuralOperation::CreateTable { table: spec },
        StructuralOperation::CopyData {
            source_table: table_path(old_name),
            target_table: table_path(new_name),
            columns: copies,
            identity: Vec::new(),
        },
        StructuralOperation::RemoveTable {
            table: old_name.to_string(),
        },
    ])
}
