//! Action translation
//!
//! Walks the staged action sequence and turns every action into abstract
//! structural operations, mutating a working copy of the source model as
//! operations are conceptually applied. Capability-sensitive branching
//! happens here: shadow-table rebuilds where columns cannot be dropped or
//! renamed, generator tables where sequences are missing, constraint
//! toggling where the provider supports deferring, and non-transactional
//! routing for full-text DDL.

mod data_actions;
mod emulation;
mod operations;
mod safety;

pub use operations::{ColumnSpec, StructuralOperation, TableSpec};

use std::collections::HashMap;

use log::{debug, warn};

use crate::compare::{Action, ActionKind, ActionSequence, UpgradeStage};
use crate::error::UpgradeError;
use crate::hints::{CopyDataHint, DeleteDataHint, UpdateDataHint};
use crate::model::{
    leaf_name, rewrite_table, table_of, ColumnNode, NodeId, NodeKind, NodePayload, SequenceNode,
    StorageModel,
};
use crate::provider::ProviderCapabilities;
use crate::reconcile::ReconcileResult;

/// Whether unsafe operations abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpgradeMode {
    /// Any operation classified unsafe fails the whole run before
    /// execution.
    #[default]
    RejectUnsafe,
    /// Unsafe operations are reported but kept in the plan.
    AllowUnsafe,
}

/// The translator's output: per-stage operation lists in the fixed stage
/// order, plus the buckets for DDL that cannot run inside a transaction.
#[derive(Debug, Clone, Default)]
pub struct UpgradeActionSequence {
    pub non_transactional_prologue: Vec<StructuralOperation>,
    stage_operations: Vec<(UpgradeStage, Vec<StructuralOperation>)>,
    pub non_transactional_epilogue: Vec<StructuralOperation>,
    /// Details of the operations classified unsafe, empty for a clean run.
    pub unsafe_operations: Vec<String>,
}

impl UpgradeActionSequence {
    fn new() -> Self {
        UpgradeActionSequence {
            stage_operations: UpgradeStage::ALL.iter().map(|&s| (s, Vec::new())).collect(),
            ..Default::default()
        }
    }

    fn push(&mut self, stage: UpgradeStage, op: StructuralOperation) {
        match self.stage_operations.iter_mut().find(|(s, _)| *s == stage) {
            Some((_, ops)) => ops.push(op),
            None => self.stage_operations.push((stage, vec![op])),
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = (UpgradeStage, &[StructuralOperation])> {
        self.stage_operations
            .iter()
            .map(|(s, ops)| (*s, ops.as_slice()))
    }

    pub fn stage(&self, stage: UpgradeStage) -> &[StructuralOperation] {
        self.stage_operations
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, ops)| ops.as_slice())
            .unwrap_or(&[])
    }

    pub fn operation_count(&self) -> usize {
        self.non_transactional_prologue.len()
            + self.non_transactional_epilogue.len()
            + self.stage_operations.iter().map(|(_, ops)| ops.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }
}

/// Translate the compared actions into staged structural operations.
///
/// Fatal conditions (locked objects, rejected unsafe operations) surface
/// here, strictly before anything could be executed.
pub fn translate(
    source: &StorageModel,
    target: &StorageModel,
    actions: &ActionSequence,
    reconciled: &ReconcileResult,
    caps: &ProviderCapabilities,
    mode: UpgradeMode,
) -> Result<UpgradeActionSequence, UpgradeError> {
    let unsafe_operations = safety::classify(actions, source, target, reconciled);
    if mode == UpgradeMode::RejectUnsafe && !unsafe_operations.is_empty() {
        return Err(UpgradeError::UnsafeActionsRejected {
            count: unsafe_operations.len(),
            details: unsafe_operations,
        });
    }

    let mut translator = Translator {
        target,
        working: source.clone(),
        caps,
        renamed_tables: HashMap::new(),
        temporary_names: HashMap::new(),
        created_tables: Vec::new(),
        created_sequences: Vec::new(),
        recreated_columns: Vec::new(),
        removed_generators: HashMap::new(),
        output: UpgradeActionSequence::new(),
    };
    translator.output.unsafe_operations = unsafe_operations;

    for stage in UpgradeStage::ALL {
        let mut data = data_actions::DataBucket::default();
        for action in actions.stage(stage) {
            translator.apply(stage, action, &mut data)?;
        }
        for op in data.flush(&translator.working) {
            translator.output.push(stage, op);
        }
    }

    if caps.deferrable_constraints && !translator.output.is_empty() {
        let first = UpgradeStage::ALL[0];
        let last = UpgradeStage::ALL[UpgradeStage::ALL.len() - 1];
        if let Some((_, ops)) = translator
            .output
            .stage_operations
            .iter_mut()
            .find(|(s, _)| *s == first)
        {
            ops.insert(0, StructuralOperation::DisableConstraints);
        }
        translator.output.push(last, StructuralOperation::EnableConstraints);
    }

    Ok(translator.output)
}

struct Translator<'a> {
    target: &'a StorageModel,
    /// The evolving physical schema; every operation is applied here as
    /// it is emitted, so later decisions see the schema as it will be.
    working: StorageModel,
    caps: &'a ProviderCapabilities,
    /// Source table path -> target table path, filled as renames apply.
    renamed_tables: HashMap<String, String>,
    /// Source path -> current parking name, for rename-cycle breaking.
    temporary_names: HashMap<String, String>,
    created_tables: Vec<String>,
    created_sequences: Vec<String>,
    recreated_columns: Vec<String>,
    /// Descriptors of dropped emulated generators, for value preservation
    /// when the same generator is re-created within the run.
    removed_generators: HashMap<String, SequenceNode>,
    output: UpgradeActionSequence,
}

impl Translator<'_> {
    /// Current working-model path of a source-model path, rewritten
    /// through applied table renames and temporary names.
    fn current_path(&self, source_path: &str) -> String {
        if let Some(parked) = self.temporary_names.get(source_path) {
            return parked.clone();
        }
        if let Some(table) = table_of(source_path) {
            if let Some(parked) = self.temporary_names.get(table) {
                return rewrite_table(source_path, table, parked);
            }
            if let Some(renamed) = self.renamed_tables.get(table) {
                return rewrite_table(source_path, table, renamed);
            }
        }
        source_path.to_string()
    }

    fn require_working(&self, source_path: &str) -> Result<NodeId, UpgradeError> {
        self.working.require(&self.current_path(source_path), "working")
    }

    fn apply(
        &mut self,
        stage: UpgradeStage,
        action: &Action,
        data: &mut data_actions::DataBucket,
    ) -> Result<(), UpgradeError> {
        match &action.kind {
            ActionKind::CreateNode { path } => self.create_node(stage, path),
            ActionKind::RemoveNode { path } => self.remove_node(stage, path),
            ActionKind::MoveNode {
                source_path,
                target_path,
            } => self.move_node(stage, source_path, target_path),
            ActionKind::PropertyChange {
                source_path,
                target_path,
            } => self.change_properties(stage, source_path, target_path),
            ActionKind::CopyData(copy) => {
                data.copies.push(self.rewrite_copy(copy));
                Ok(())
            }
            ActionKind::DeleteData(delete) => {
                data.deletes.push(self.rewrite_delete(delete));
                Ok(())
            }
            ActionKind::UpdateData(update) => {
                data.updates.push(self.rewrite_update(update));
                Ok(())
            }
        }
    }

    /// Data hints carry model paths; by the time their stage runs, some
    /// tables may already sit under new names.
    fn rewrite_copy(&self, copy: &CopyDataHint) -> CopyDataHint {
        let mut out = copy.clone();
        out.source_table = self.current_path(&copy.source_table);
        for pair in &mut out.identity {
            if let crate::hints::IdentityPair::Columns { source, .. } = pair {
                *source = self.current_path(source);
            }
        }
        for pair in &mut out.columns {
            pair.source = self.current_path(&pair.source);
        }
        out
    }

    fn rewrite_delete(&self, delete: &DeleteDataHint) -> DeleteDataHint {
        let mut out = delete.clone();
        out.table = self.current_path(&delete.table);
        for pair in &mut out.identity {
            match pair {
                crate::hints::IdentityPair::Columns { source, target } => {
                    *source = self.current_path(source);
                    *target = self.current_path(target);
                }
                crate::hints::IdentityPair::Constant { column, .. } => {
                    *column = self.current_path(column);
                }
            }
        }
        out
    }

    fn rewrite_update(&self, update: &UpdateDataHint) -> UpdateDataHint {
        let mut out = update.clone();
        out.table = self.current_path(&update.table);
        out.column = self.current_path(&update.column);
        out
    }

    fn create_node(&mut self, stage: UpgradeStage, path: &str) -> Result<(), UpgradeError> {
        let target_id = self.target.require(path, "target")?;
        let node = self.target.node(target_id);
        match &node.payload {
            NodePayload::Table(_) => {
                let spec = emulation::table_spec(self.target, target_id);
                let table_id = self
                    .working
                    .add_node(None, node.name.clone(), node.payload.clone())?;
                for child in &node.children {
                    let child_node = self.target.node(*child);
                    if matches!(
                        child_node.kind(),
                        NodeKind::Column | NodeKind::PrimaryIndex
                    ) {
                        self.working.add_node(
                            Some(table_id),
                            child_node.name.clone(),
                            child_node.payload.clone(),
                        )?;
                    }
                }
                self.created_tables.push(path.to_string());
                self.output
                    .push(stage, StructuralOperation::CreateTable { table: spec });
                Ok(())
            }
            NodePayload::Column(column) => {
                let table_path = table_of(path).unwrap_or(path);
                let table_id = self.working.require(table_path, "working")?;
                self.working
                    .add_node(Some(table_id), node.name.clone(), node.payload.clone())?;
                self.output.push(
                    stage,
                    StructuralOperation::CreateColumn {
                        table: leaf_name(table_path).to_string(),
                        column: emulation::column_spec(&node.name, column),
                    },
                );
                Ok(())
            }
            NodePayload::PrimaryIndex(index) => {
                let table_path = table_of(path).unwrap_or(path);
                let table_id = self.working.require(table_path, "working")?;
                self.working
                    .add_node(Some(table_id), node.name.clone(), node.payload.clone())?;
                let mut index = index.clone();
                if index.clustered && !self.caps.clustered_indexes {
                    index.clustered = false;
                }
                self.output.push(
                    stage,
                    StructuralOperation::CreatePrimaryIndex {
                        table: leaf_name(table_path).to_string(),
                        name: node.name.clone(),
                        index,
                    },
                );
                Ok(())
            }
            NodePayload::SecondaryIndex(index) => {
                let table_path = table_of(path).unwrap_or(path);
                let table_id = self.working.require(table_path, "working")?;
                let mut index = index.clone();
                if index.filter.is_some() && !self.caps.partial_indexes {
                    warn!(
                        "index {} has a filter the provider cannot express, creating unfiltered",
                        node.name
                    );
                    index.filter = None;
                }
                self.working.add_node(
                    Some(table_id),
                    node.name.clone(),
                    NodePayload::SecondaryIndex(index.clone()),
                )?;
                self.output.push(
                    stage,
                    StructuralOperation::CreateSecondaryIndex {
                        table: leaf_name(table_path).to_string(),
                        name: node.name.clone(),
                        index,
                    },
                );
                Ok(())
            }
            NodePayload::ForeignKey(key) => {
                let table_path = table_of(path).unwrap_or(path);
                let table_id = self.working.require(table_path, "working")?;
                self.working
                    .add_node(Some(table_id), node.name.clone(), node.payload.clone())?;
                self.output.push(
                    stage,
                    StructuralOperation::CreateForeignKey {
                        table: leaf_name(table_path).to_string(),
                        name: node.name.clone(),
                        key: key.clone(),
                    },
                );
                Ok(())
            }
            NodePayload::FullTextIndex(index) => {
                if !self.caps.full_text {
                    warn!("provider has no full-text support, skipping index {}", node.name);
                    return Ok(());
                }
                let table_path = table_of(path).unwrap_or(path);
                let table_id = self.working.require(table_path, "working")?;
                self.working
                    .add_node(Some(table_id), node.name.clone(), node.payload.clone())?;
                let op = StructuralOperation::CreateFullTextIndex {
                    table: leaf_name(table_path).to_string(),
                    name: node.name.clone(),
                    index: index.clone(),
                };
                if self.caps.transactional_full_text_ddl {
                    self.output.push(stage, op);
                } else {
                    self.output.non_transactional_epilogue.push(op);
                }
                Ok(())
            }
            NodePayload::Sequence(sequence) => {
                self.working
                    .add_node(None, node.name.clone(), node.payload.clone())?;
                self.created_sequences.push(path.to_string());
                let op = if self.caps.sequences {
                    StructuralOperation::CreateSequence {
                        name: node.name.clone(),
                        start: sequence.start,
                        increment: sequence.increment,
                    }
                } else {
                    // A removed generator with the same name keeps its
                    // counter value across the recreation.
                    let seed = self
                        .removed_generators
                        .get(&node.name)
                        .and_then(|g| g.last_value)
                        .map(|v| v + sequence.increment)
                        .unwrap_or(sequence.start);
                    emulation::generator_table(&node.name, seed, sequence.increment)
                };
                self.output.push(stage, op);
                Ok(())
            }
        }
    }

    fn remove_node(&mut self, stage: UpgradeStage, path: &str) -> Result<(), UpgradeError> {
        let id = self.require_working(path)?;
        let node = self.working.node(id);
        if let Some(reason) = &node.locked {
            return Err(UpgradeError::LockedObject {
                path: path.to_string(),
                reason: reason.clone(),
            });
        }
        let name = node.name.clone();
        let kind = node.kind();
        let parent = node.parent;
        let parent_table = parent
            .map(|p| self.working.node(p).name.clone())
            .unwrap_or_default();

        match kind {
            NodeKind::Table => {
                self.working.remove_node(id);
                self.output
                    .push(stage, StructuralOperation::RemoveTable { table: name });
            }
            NodeKind::Column => {
                if self.caps.column_drop {
                    self.working.remove_node(id);
                    self.output.push(
                        stage,
                        StructuralOperation::RemoveColumn {
                            table: parent_table,
                            column: name,
                        },
                    );
                } else if let Some(table_id) = parent {
                    debug!(
                        "provider cannot drop columns, rebuilding {} without {}",
                        parent_table, name
                    );
                    let ops = emulation::rebuild_without_column(
                        &mut self.working,
                        table_id,
                        &name,
                        &mut self.recreated_columns,
                    )?;
                    for op in ops {
                        self.output.push(stage, op);
                    }
                }
            }
            NodeKind::PrimaryIndex => {
                self.working.remove_node(id);
                self.output.push(
                    stage,
                    StructuralOperation::RemovePrimaryIndex {
                        table: parent_table,
                        name,
                    },
                );
            }
            NodeKind::SecondaryIndex => {
                self.working.remove_node(id);
                self.output.push(
                    stage,
                    StructuralOperation::RemoveSecondaryIndex {
                        table: parent_table,
                        name,
                    },
                );
            }
            NodeKind::ForeignKey => {
                self.working.remove_node(id);
                self.output.push(
                    stage,
                    StructuralOperation::RemoveForeignKey {
                        table: parent_table,
                        name,
                    },
                );
            }
            NodeKind::FullTextIndex => {
                self.working.remove_node(id);
                let op = StructuralOperation::RemoveFullTextIndex {
                    table: parent_table,
                    name,
                };
                if self.caps.transactional_full_text_ddl {
                    self.output.push(stage, op);
                } else {
                    self.output.non_transactional_prologue.push(op);
                }
            }
            NodeKind::Sequence => {
                let descriptor = self.working.node(id).payload.as_sequence().cloned();
                self.working.remove_node(id);
                if self.caps.sequences {
                    self.output
                        .push(stage, StructuralOperation::RemoveSequence { name });
                } else {
                    if let Some(descriptor) = descriptor {
                        self.removed_generators.insert(name.clone(), descriptor);
                    }
                    self.output
                        .push(stage, StructuralOperation::DropGeneratorTable { name });
                }
            }
            NodeKind::Catalog | NodeKind::Schema => {}
        }
        Ok(())
    }

    fn move_node(
        &mut self,
        stage: UpgradeStage,
        source_path: &str,
        target_path: &str,
    ) -> Result<(), UpgradeError> {
        let id = self.require_working(source_path)?;
        let node = self.working.node(id);
        let kind = node.kind();
        let current_name = node.name.clone();
        let parent_table = node
            .parent
            .map(|p| self.working.node(p).name.clone())
            .unwrap_or_default();

        if stage == UpgradeStage::TemporaryRename {
            // Park under a collision-free name; the upgrade stage finishes
            // the move.
            let parked = emulation::free_name(&self.working, leaf_name(target_path));
            self.working.rename_node(id, parked.clone());
            let parked_path = self.working.node(id).path.clone();
            self.temporary_names
                .insert(source_path.to_string(), parked_path);
            self.emit_rename(stage, kind, &parent_table, &current_name, &parked)?;
            return Ok(());
        }

        let new_name = leaf_name(target_path).to_string();
        if current_name != new_name {
            self.working.rename_node(id, new_name.clone());
            self.emit_rename(stage, kind, &parent_table, &current_name, &new_name)?;
        }
        self.temporary_names.remove(source_path);
        if kind == NodeKind::Table {
            self.renamed_tables
                .insert(source_path.to_string(), target_path.to_string());
        }
        Ok(())
    }

    fn emit_rename(
        &mut self,
        stage: UpgradeStage,
        kind: NodeKind,
        table: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), UpgradeError> {
        match kind {
            NodeKind::Table => {
                if self.caps.table_rename {
                    self.output.push(
                        stage,
                        StructuralOperation::RenameTable {
                            old_name: old_name.to_string(),
                            new_name: new_name.to_string(),
                        },
                    );
                } else {
                    // The working node already carries the new name.
                    let id = self.working.require(
                        &crate::model::table_path(new_name),
                        "working",
                    )?;
                    let ops = emulation::rebuild_as(&mut self.working, id, old_name, new_name)?;
                    for op in ops {
                        self.output.push(stage, op);
                    }
                }
            }
            NodeKind::Column => {
                if self.caps.column_rename {
                    self.output.push(
                        stage,
                        StructuralOperation::RenameColumn {
                            table: table.to_string(),
                            old_name: old_name.to_string(),
                            new_name: new_name.to_string(),
                        },
                    );
                } else {
                    let table_id = self
                        .working
                        .require(&crate::model::table_path(table), "working")?;
                    debug!(
                        "provider cannot rename columns, rebuilding {} for {} -> {}",
                        table, old_name, new_name
                    );
                    let ops = emulation::rebuild_with_renamed_column(
                        &mut self.working,
                        table_id,
                        old_name,
                        new_name,
                        &mut self.recreated_columns,
                    )?;
                    for op in ops {
                        self.output.push(stage, op);
                    }
                }
            }
            // Index and key renames do not occur; divergence recreates.
            _ => {}
        }
        Ok(())
    }

    fn change_properties(
        &mut self,
        stage: UpgradeStage,
        source_path: &str,
        target_path: &str,
    ) -> Result<(), UpgradeError> {
        let working_id = self.require_working(source_path)?;
        let target_id = self.target.require(target_path, "target")?;
        let target_node = self.target.node(target_id);
        let working_payload = self.working.node(working_id).payload.clone();
        match (&working_payload, &target_node.payload) {
            (NodePayload::Column(from), NodePayload::Column(to)) => {
                let table = self
                    .working
                    .node(working_id)
                    .parent
                    .map(|p| self.working.node(p).name.clone())
                    .unwrap_or_default();
                let column = target_node.name.clone();
                let mut ops = Vec::new();
                if from.column_type != to.column_type || from.nullable != to.nullable {
                    ops.push(StructuralOperation::AlterColumnType {
                        table: table.clone(),
                        column: column.clone(),
                        new_type: to.column_type.clone(),
                        nullable: to.nullable,
                    });
                }
                if from.default_value != to.default_value {
                    ops.push(StructuralOperation::AlterColumnDefault {
                        table,
                        column,
                        default_value: to.default_value.clone(),
                    });
                }
                let updated: ColumnNode = to.clone();
                *self.working.payload_mut(working_id) = NodePayload::Column(updated);
                for op in ops {
                    self.output.push(stage, op);
                }
                Ok(())
            }
            (NodePayload::Sequence(from), NodePayload::Sequence(to)) => {
                let name = target_node.name.clone();
                if self.caps.sequences {
                    self.output.push(
                        stage,
                        StructuralOperation::AlterSequence {
                            name: name.clone(),
                            start: to.start,
                            increment: to.increment,
                        },
                    );
                } else {
                    // Rebuild the generator table, carrying the live
                    // counter value across.
                    let seed = from.last_value.map(|v| v + to.increment).unwrap_or(to.start);
                    self.output
                        .push(stage, StructuralOperation::DropGeneratorTable { name: name.clone() });
                    self.output
                        .push(stage, emulation::generator_table(&name, seed, to.increment));
                }
                *self.working.payload_mut(working_id) = NodePayload::Sequence(to.clone());
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
