//! Model comparison
//!
//! Recursively pairs nodes of the same kind across the source and target
//! storage models, consulting the synthesized schema hints so a hinted
//! old-path/new-path pair is treated as moved rather than removed and
//! re-created. Every structural divergence produces exactly one action,
//! already assigned to its execution stage; within a stage, dependents
//! are created after and removed before the things they depend on.

mod actions;
mod difference;
pub mod report;

pub use actions::{Action, ActionGroup, ActionKind, ActionSequence, UpgradeStage};
pub use difference::{Difference, Movement};

use log::debug;

use crate::error::UpgradeError;
use crate::hints::SchemaHintSet;
use crate::model::{
    leaf_name, ColumnNode, ForeignKeyNode, Node, NodeId, NodeKind, PrimaryIndexNode,
    SecondaryIndexNode, StorageModel,
};

/// Accumulates actions out of order, then flushes them into the fixed
/// stage layout with the dependency-respecting order inside each stage.
#[derive(Default)]
struct Bucket {
    cleanup_data: Vec<(ActionKind, Difference)>,
    remove_foreign_keys: Vec<(ActionKind, Difference)>,
    remove_indexes: Vec<(ActionKind, Difference)>,
    remove_primary: Vec<(ActionKind, Difference)>,
    temporary_renames: Vec<(ActionKind, Difference)>,
    create_tables: Vec<(ActionKind, Difference)>,
    moves: Vec<(ActionKind, Difference)>,
    property_changes: Vec<(ActionKind, Difference)>,
    create_columns: Vec<(ActionKind, Difference)>,
    create_primary: Vec<(ActionKind, Difference)>,
    create_indexes: Vec<(ActionKind, Difference)>,
    create_foreign_keys: Vec<(ActionKind, Difference)>,
    create_sequences: Vec<(ActionKind, Difference)>,
    copy_data: Vec<(ActionKind, Difference)>,
    post_copy_data: Vec<(ActionKind, Difference)>,
    remove_columns: Vec<(ActionKind, Difference)>,
    remove_tables: Vec<(ActionKind, Difference)>,
    remove_sequences: Vec<(ActionKind, Difference)>,
}

impl Bucket {
    fn into_sequence(self) -> ActionSequence {
        let mut seq = ActionSequence::default();
        let stages = [
            (UpgradeStage::CleanupData, self.cleanup_data),
            (UpgradeStage::Prepare, self.remove_foreign_keys),
            (UpgradeStage::Prepare, self.remove_indexes),
            (UpgradeStage::Prepare, self.remove_primary),
            (UpgradeStage::TemporaryRename, self.temporary_renames),
            (UpgradeStage::Upgrade, self.create_tables),
            (UpgradeStage::Upgrade, self.moves),
            (UpgradeStage::Upgrade, self.property_changes),
            (UpgradeStage::Upgrade, self.create_columns),
            (UpgradeStage::Upgrade, self.create_primary),
            (UpgradeStage::Upgrade, self.create_indexes),
            (UpgradeStage::Upgrade, self.create_foreign_keys),
            (UpgradeStage::Upgrade, self.create_sequences),
            (UpgradeStage::CopyData, self.copy_data),
            (UpgradeStage::PostCopyData, self.post_copy_data),
            (UpgradeStage::Cleanup, self.remove_columns),
            (UpgradeStage::Cleanup, self.remove_tables),
            (UpgradeStage::Cleanup, self.remove_sequences),
        ];
        for (stage, items) in stages {
            for (kind, difference) in items {
                seq.push(stage, kind, difference);
            }
        }
        seq
    }
}

/// Diff `source` against `target` under the given schema hints.
pub fn compare(
    source: &StorageModel,
    target: &StorageModel,
    hints: &SchemaHintSet,
) -> Result<ActionSequence, UpgradeError> {
    let mut bucket = Bucket::default();

    compare_tables(source, target, hints, &mut bucket)?;
    compare_sequences(source, target, &mut bucket);
    schedule_data_hints(hints, &mut bucket);

    Ok(bucket.into_sequence())
}

fn compare_tables(
    source: &StorageModel,
    target: &StorageModel,
    hints: &SchemaHintSet,
    bucket: &mut Bucket,
) -> Result<(), UpgradeError> {
    for src_table in source.tables() {
        let target_path = hints
            .rename_target(&src_table.path)
            .unwrap_or(&src_table.path);
        match target.resolve(target_path) {
            Some(tgt_id) => {
                if target_path != src_table.path {
                    let difference = Difference::paired(
                        NodeKind::Table,
                        &src_table.path,
                        target_path,
                        Movement::renamed(),
                    );
                    let kind = ActionKind::MoveNode {
                        source_path: src_table.path.clone(),
                        target_path: target_path.to_string(),
                    };
                    // The new name is still taken by another source table:
                    // park this one under a temporary name first.
                    if source.resolve(target_path).is_some() {
                        debug!(
                            "rename {} -> {} collides, scheduling a temporary rename",
                            src_table.path, target_path
                        );
                        bucket
                            .temporary_renames
                            .push((kind.clone(), difference.clone()));
                    }
                    bucket.moves.push((kind, difference));
                }
                compare_table_pair(source, src_table, target, tgt_id, hints, bucket)?;
            }
            None => remove_table(source, src_table, bucket),
        }
    }

    for tgt_table in target.tables() {
        let source_path = hints
            .rename_source(&tgt_table.path)
            .unwrap_or(&tgt_table.path);
        if source.resolve(source_path).is_some() {
            continue;
        }
        // Brand-new table: the create carries its columns and primary
        // index; indexes and foreign keys follow as their own actions so
        // they land after every table exists.
        bucket.create_tables.push((
            ActionKind::CreateNode {
                path: tgt_table.path.clone(),
            },
            Difference::created(NodeKind::Table, &tgt_table.path),
        ));
        for index in target.children_of_kind(tgt_table.id, NodeKind::SecondaryIndex) {
            bucket.create_indexes.push((
                ActionKind::CreateNode {
                    path: index.path.clone(),
                },
                Difference::created(NodeKind::SecondaryIndex, &index.path),
            ));
        }
        for fti in target.children_of_kind(tgt_table.id, NodeKind::FullTextIndex) {
            bucket.create_indexes.push((
                ActionKind::CreateNode {
                    path: fti.path.clone(),
                },
                Difference::created(NodeKind::FullTextIndex, &fti.path),
            ));
        }
        for fk in target.children_of_kind(tgt_table.id, NodeKind::ForeignKey) {
            bucket.create_foreign_keys.push((
                ActionKind::CreateNode {
                    path: fk.path.clone(),
                },
                Difference::created(NodeKind::ForeignKey, &fk.path),
            ));
        }
    }
    Ok(())
}

/// Schedule the removal of a source-only table: its foreign keys drop in
/// the prepare stage, the table itself in cleanup. Columns and indexes go
/// down with the table.
fn remove_table(source: &StorageModel, table: &Node, bucket: &mut Bucket) {
    for fk in source.children_of_kind(table.id, NodeKind::ForeignKey) {
        bucket.remove_foreign_keys.push((
            ActionKind::RemoveNode {
                path: fk.path.clone(),
            },
            Difference::removed(NodeKind::ForeignKey, &fk.path),
        ));
    }
    bucket.remove_tables.push((
        ActionKind::RemoveNode {
            path: table.path.clone(),
        },
        Difference::removed(NodeKind::Table, &table.path),
    ));
}

/// The target-side column name a source column pairs with, through an
/// explicit column rename hint.
fn renamed_column<'a>(hints: &'a SchemaHintSet, source_column_path: &str) -> Option<&'a str> {
    hints.rename_target(source_column_path).map(leaf_name)
}

fn compare_table_pair(
    source: &StorageModel,
    src_table: &Node,
    target: &StorageModel,
    tgt_id: NodeId,
    hints: &SchemaHintSet,
    bucket: &mut Bucket,
) -> Result<(), UpgradeError> {
    let mut paired_target_columns: Vec<&str> = Vec::new();

    for src_column in source.children_of_kind(src_table.id, NodeKind::Column) {
        let wanted = renamed_column(hints, &src_column.path).unwrap_or(&src_column.name);
        let Some(tgt_column) = target.child_named(tgt_id, NodeKind::Column, wanted) else {
            bucket.remove_columns.push((
                ActionKind::RemoveNode {
                    path: src_column.path.clone(),
                },
                Difference::removed(NodeKind::Column, &src_column.path),
            ));
            continue;
        };
        paired_target_columns.push(&tgt_column.name);

        if tgt_column.name != src_column.name {
            bucket.moves.push((
                ActionKind::MoveNode {
                    source_path: src_column.path.clone(),
                    target_path: tgt_column.path.clone(),
                },
                Difference::paired(
                    NodeKind::Column,
                    &src_column.path,
                    &tgt_column.path,
                    Movement::renamed(),
                ),
            ));
        }
        if let (Some(a), Some(b)) = (src_column.payload.as_column(), tgt_column.payload.as_column())
        {
            if column_properties_differ(a, b) {
                bucket.property_changes.push((
                    ActionKind::PropertyChange {
                        source_path: src_column.path.clone(),
                        target_path: tgt_column.path.clone(),
                    },
                    Difference::paired(
                        NodeKind::Column,
                        &src_column.path,
                        &tgt_column.path,
                        Movement::changed(),
                    ),
                ));
            }
        }
    }
    for tgt_column in target.children_of_kind(tgt_id, NodeKind::Column) {
        if !paired_target_columns.contains(&tgt_column.name.as_str()) {
            bucket.create_columns.push((
                ActionKind::CreateNode {
                    path: tgt_column.path.clone(),
                },
                Difference::created(NodeKind::Column, &tgt_column.path),
            ));
        }
    }

    compare_primary_index(source, src_table, target, tgt_id, hints, bucket);
    compare_secondary_indexes(source, src_table, target, tgt_id, hints, bucket);
    compare_full_text(source, src_table, target, tgt_id, bucket);
    compare_foreign_keys(source, src_table, target, tgt_id, hints, bucket);
    Ok(())
}

fn column_properties_differ(a: &ColumnNode, b: &ColumnNode) -> bool {
    a.column_type != b.column_type
        || a.nullable != b.nullable
        || a.default_value != b.default_value
        || a.collation != b.collation
}

/// Source-side column names rewritten through the column rename hints of
/// one table, for comparing index/key column lists.
fn rewrite_columns(hints: &SchemaHintSet, table_path: &str, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| {
            let path = format!("{}/Columns/{}", table_path, c);
            renamed_column(hints, &path)
                .map(str::to_string)
                .unwrap_or_else(|| c.clone())
        })
        .collect()
}

fn compare_primary_index(
    source: &StorageModel,
    src_table: &Node,
    target: &StorageModel,
    tgt_id: NodeId,
    hints: &SchemaHintSet,
    bucket: &mut Bucket,
) {
    let src_pk = source
        .children_of_kind(src_table.id, NodeKind::PrimaryIndex)
        .next();
    let tgt_pk = target
        .children_of_kind(tgt_id, NodeKind::PrimaryIndex)
        .next();
    match (src_pk, tgt_pk) {
        (Some(a), Some(b)) => {
            let equivalent = a.name == b.name
                && match (a.payload.as_primary_index(), b.payload.as_primary_index()) {
                    (Some(pa), Some(pb)) => {
                        primary_equivalent(pa, pb, hints, &src_table.path)
                    }
                    _ => false,
                };
            if !equivalent {
                bucket.remove_primary.push((
                    ActionKind::RemoveNode {
                        path: a.path.clone(),
                    },
                    Difference::removed(NodeKind::PrimaryIndex, &a.path),
                ));
                bucket.create_primary.push((
                    ActionKind::CreateNode {
                        path: b.path.clone(),
                    },
                    Difference::created(NodeKind::PrimaryIndex, &b.path),
                ));
            }
        }
        (Some(a), None) => bucket.remove_primary.push((
            ActionKind::RemoveNode {
                path: a.path.clone(),
            },
            Difference::removed(NodeKind::PrimaryIndex, &a.path),
        )),
        (None, Some(b)) => bucket.create_primary.push((
            ActionKind::CreateNode {
                path: b.path.clone(),
            },
            Difference::created(NodeKind::PrimaryIndex, &b.path),
        )),
        (None, None) => {}
    }
}

fn primary_equivalent(
    a: &PrimaryIndexNode,
    b: &PrimaryIndexNode,
    hints: &SchemaHintSet,
    src_table_path: &str,
) -> bool {
    rewrite_columns(hints, src_table_path, &a.key_columns) == b.key_columns
        && a.clustered == b.clustered
}

fn compare_secondary_indexes(
    source: &StorageModel,
    src_table: &Node,
    target: &StorageModel,
    tgt_id: NodeId,
    hints: &SchemaHintSet,
    bucket: &mut Bucket,
) {
    for src_index in source.children_of_kind(src_table.id, NodeKind::SecondaryIndex) {
        match target.child_named(tgt_id, NodeKind::SecondaryIndex, &src_index.name) {
            Some(tgt_index) => {
                let equivalent = match (&src_index.payload, &tgt_index.payload) {
                    (
                        crate::model::NodePayload::SecondaryIndex(a),
                        crate::model::NodePayload::SecondaryIndex(b),
                    ) => secondary_equivalent(a, b, hints, &src_table.path),
                    _ => false,
                };
                if !equivalent {
                    bucket.remove_indexes.push((
                        ActionKind::RemoveNode {
                            path: src_index.path.clone(),
                        },
                        Difference::removed(NodeKind::SecondaryIndex, &src_index.path),
                    ));
                    bucket.create_indexes.push((
                        ActionKind::CreateNode {
                            path: tgt_index.path.clone(),
                        },
                        Difference::created(NodeKind::SecondaryIndex, &tgt_index.path),
                    ));
                }
            }
            None => bucket.remove_indexes.push((
                ActionKind::RemoveNode {
                    path: src_index.path.clone(),
                },
                Difference::removed(NodeKind::SecondaryIndex, &src_index.path),
            )),
        }
    }
    for tgt_index in target.children_of_kind(tgt_id, NodeKind::SecondaryIndex) {
        if source
            .child_named(src_table.id, NodeKind::SecondaryIndex, &tgt_index.name)
            .is_none()
        {
            bucket.create_indexes.push((
                ActionKind::CreateNode {
                    path: tgt_index.path.clone(),
                },
                Difference::created(NodeKind::SecondaryIndex, &tgt_index.path),
            ));
        }
    }
}

fn secondary_equivalent(
    a: &SecondaryIndexNode,
    b: &SecondaryIndexNode,
    hints: &SchemaHintSet,
    src_table_path: &str,
) -> bool {
    rewrite_columns(hints, src_table_path, &a.key_columns) == b.key_columns
        && rewrite_columns(hints, src_table_path, &a.include_columns) == b.include_columns
        && a.unique == b.unique
        && a.filter == b.filter
}

fn compare_full_text(
    source: &StorageModel,
    src_table: &Node,
    target: &StorageModel,
    tgt_id: NodeId,
    bucket: &mut Bucket,
) {
    let src = source
        .children_of_kind(src_table.id, NodeKind::FullTextIndex)
        .next();
    let tgt = target
        .children_of_kind(tgt_id, NodeKind::FullTextIndex)
        .next();
    match (src, tgt) {
        (Some(a), Some(b)) => {
            if a.name != b.name || a.payload != b.payload {
                bucket.remove_indexes.push((
                    ActionKind::RemoveNode {
                        path: a.path.clone(),
                    },
                    Difference::removed(NodeKind::FullTextIndex, &a.path),
                ));
                bucket.create_indexes.push((
                    ActionKind::CreateNode {
                        path: b.path.clone(),
                    },
                    Difference::created(NodeKind::FullTextIndex, &b.path),
                ));
            }
        }
        (Some(a), None) => bucket.remove_indexes.push((
            ActionKind::RemoveNode {
                path: a.path.clone(),
            },
            Difference::removed(NodeKind::FullTextIndex, &a.path),
        )),
        (None, Some(b)) => bucket.create_indexes.push((
            ActionKind::CreateNode {
                path: b.path.clone(),
            },
            Difference::created(NodeKind::FullTextIndex, &b.path),
        )),
        (None, None) => {}
    }
}

fn compare_foreign_keys(
    source: &StorageModel,
    src_table: &Node,
    target: &StorageModel,
    tgt_id: NodeId,
    hints: &SchemaHintSet,
    bucket: &mut Bucket,
) {
    for src_fk in source.children_of_kind(src_table.id, NodeKind::ForeignKey) {
        match target.child_named(tgt_id, NodeKind::ForeignKey, &src_fk.name) {
            Some(tgt_fk) => {
                let equivalent =
                    match (src_fk.payload.as_foreign_key(), tgt_fk.payload.as_foreign_key()) {
                        (Some(a), Some(b)) => foreign_key_equivalent(a, b, hints, &src_table.path),
                        _ => false,
                    };
                if !equivalent {
                    bucket.remove_foreign_keys.push((
                        ActionKind::RemoveNode {
                            path: src_fk.path.clone(),
                        },
                        Difference::removed(NodeKind::ForeignKey, &src_fk.path),
                    ));
                    bucket.create_foreign_keys.push((
                        ActionKind::CreateNode {
                            path: tgt_fk.path.clone(),
                        },
                        Difference::created(NodeKind::ForeignKey, &tgt_fk.path),
                    ));
                }
            }
            None => bucket.remove_foreign_keys.push((
                ActionKind::RemoveNode {
                    path: src_fk.path.clone(),
                },
                Difference::removed(NodeKind::ForeignKey, &src_fk.path),
            )),
        }
    }
    for tgt_fk in target.children_of_kind(tgt_id, NodeKind::ForeignKey) {
        if source
            .child_named(src_table.id, NodeKind::ForeignKey, &tgt_fk.name)
            .is_none()
        {
            bucket.create_foreign_keys.push((
                ActionKind::CreateNode {
                    path: tgt_fk.path.clone(),
                },
                Difference::created(NodeKind::ForeignKey, &tgt_fk.path),
            ));
        }
    }
}

fn foreign_key_equivalent(
    a: &ForeignKeyNode,
    b: &ForeignKeyNode,
    hints: &SchemaHintSet,
    src_table_path: &str,
) -> bool {
    let referenced = hints
        .rename_target(&a.referenced_table)
        .unwrap_or(&a.referenced_table);
    rewrite_columns(hints, src_table_path, &a.columns) == b.columns
        && referenced == b.referenced_table
        && a.referenced_columns == b.referenced_columns
        && a.on_delete == b.on_delete
}

fn compare_sequences(source: &StorageModel, target: &StorageModel, bucket: &mut Bucket) {
    for src in source.sequences() {
        match target.resolve(&src.path) {
            Some(tgt_id) => {
                let tgt = target.node(tgt_id);
                let differ = match (src.payload.as_sequence(), tgt.payload.as_sequence()) {
                    // The live last value is runtime state, not schema.
                    (Some(a), Some(b)) => a.start != b.start || a.increment != b.increment,
                    _ => true,
                };
                if differ {
                    bucket.property_changes.push((
                        ActionKind::PropertyChange {
                            source_path: src.path.clone(),
                            target_path: tgt.path.clone(),
                        },
                        Difference::paired(
                            NodeKind::Sequence,
                            &src.path,
                            &tgt.path,
                            Movement::changed(),
                        ),
                    ));
                }
            }
            None => bucket.remove_sequences.push((
                ActionKind::RemoveNode {
                    path: src.path.clone(),
                },
                Difference::removed(NodeKind::Sequence, &src.path),
            )),
        }
    }
    for tgt in target.sequences() {
        if source.resolve(&tgt.path).is_none() {
            bucket.create_sequences.push((
                ActionKind::CreateNode {
                    path: tgt.path.clone(),
                },
                Difference::created(NodeKind::Sequence, &tgt.path),
            ));
        }
    }
}

/// Queue the synthesized data hints into their stages. A delete caused by
/// a table being reused by a different type carries a recreation
/// movement, which safety classification treats as data loss.
fn schedule_data_hints(hints: &SchemaHintSet, bucket: &mut Bucket) {
    for copy in &hints.copies {
        bucket.copy_data.push((
            ActionKind::CopyData(copy.clone()),
            Difference::paired(
                NodeKind::Table,
                &copy.source_table,
                &copy.target_table,
                Movement::default(),
            ),
        ));
    }
    for delete in &hints.deletes {
        let movement = if delete.due_to_table_conflict {
            Movement::recreated()
        } else {
            Movement::removed()
        };
        let difference = Difference {
            kind: NodeKind::Table,
            source_path: Some(delete.table.clone()),
            target_path: None,
            movement,
        };
        let slot = if delete.post_copy {
            &mut bucket.post_copy_data
        } else {
            &mut bucket.cleanup_data
        };
        slot.push((ActionKind::DeleteData(delete.clone()), difference));
    }
    for update in &hints.updates {
        let difference = Difference {
            kind: NodeKind::Column,
            source_path: Some(update.column.clone()),
            target_path: None,
            movement: Movement::changed(),
        };
        let slot = if update.post_copy {
            &mut bucket.post_copy_data
        } else {
            &mut bucket.cleanup_data
        };
        slot.push((ActionKind::UpdateData(update.clone()), difference));
    }
}
