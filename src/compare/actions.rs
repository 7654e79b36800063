//! Actions and the stage-partitioned action sequence

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compare::Difference;
use crate::hints::{CopyDataHint, DeleteDataHint, UpdateDataHint};

/// Execution stages, visited strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UpgradeStage {
    CleanupData,
    Prepare,
    TemporaryRename,
    Upgrade,
    CopyData,
    PostCopyData,
    Cleanup,
}

impl UpgradeStage {
    pub const ALL: [UpgradeStage; 7] = [
        UpgradeStage::CleanupData,
        UpgradeStage::Prepare,
        UpgradeStage::TemporaryRename,
        UpgradeStage::Upgrade,
        UpgradeStage::CopyData,
        UpgradeStage::PostCopyData,
        UpgradeStage::Cleanup,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            UpgradeStage::CleanupData => "cleanup data",
            UpgradeStage::Prepare => "prepare",
            UpgradeStage::TemporaryRename => "temporary rename",
            UpgradeStage::Upgrade => "upgrade",
            UpgradeStage::CopyData => "copy data",
            UpgradeStage::PostCopyData => "post-copy data",
            UpgradeStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for UpgradeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What an action does; paths resolve in the target model for creations
/// and the source model for removals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    CreateNode {
        path: String,
    },
    RemoveNode {
        path: String,
    },
    /// Rename (and, for columns, potential reparent). In the temporary
    /// rename stage the translator parks the node under a collision-free
    /// name; in the upgrade stage it completes the move.
    MoveNode {
        source_path: String,
        target_path: String,
    },
    /// A type, default, nullability or sequence-parameter change on a
    /// paired node.
    PropertyChange {
        source_path: String,
        target_path: String,
    },
    CopyData(CopyDataHint),
    DeleteData(DeleteDataHint),
    UpdateData(UpdateDataHint),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub difference: Difference,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::CreateNode { path } => {
                write!(f, "create {:?} {}", self.difference.kind, path)
            }
            ActionKind::RemoveNode { path } => {
                write!(f, "remove {:?} {}", self.difference.kind, path)
            }
            ActionKind::MoveNode {
                source_path,
                target_path,
            } => write!(f, "move {} -> {}", source_path, target_path),
            ActionKind::PropertyChange { target_path, .. } => {
                write!(f, "change properties of {}", target_path)
            }
            ActionKind::CopyData(copy) => {
                write!(f, "copy rows {} -> {}", copy.source_table, copy.target_table)
            }
            ActionKind::DeleteData(delete) => write!(f, "delete rows of {}", delete.table),
            ActionKind::UpdateData(update) => {
                write!(f, "clear {} in {}", update.column, update.table)
            }
        }
    }
}

/// A named bag of actions belonging to one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionGroup {
    pub stage: UpgradeStage,
    pub actions: Vec<Action>,
}

/// The stage-partitioned comparison output: always seven groups, in the
/// fixed stage order, some possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSequence {
    pub groups: Vec<ActionGroup>,
}

impl Default for ActionSequence {
    fn default() -> Self {
        ActionSequence {
            groups: UpgradeStage::ALL
                .iter()
                .map(|&stage| ActionGroup {
                    stage,
                    actions: Vec::new(),
                })
                .collect(),
        }
    }
}

impl ActionSequence {
    pub fn push(&mut self, stage: UpgradeStage, kind: ActionKind, difference: Difference) {
        match self.groups.iter_mut().find(|g| g.stage == stage) {
            Some(group) => group.actions.push(Action { kind, difference }),
            None => self.groups.push(ActionGroup {
                stage,
                actions: vec![Action { kind, difference }],
            }),
        }
    }

    pub fn stage(&self, stage: UpgradeStage) -> &[Action] {
        self.groups
            .iter()
            .find(|g| g.stage == stage)
            .map(|g| g.actions.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.actions.is_empty())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.actions.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UpgradeStage, &Action)> {
        self.groups
            .iter()
            .flat_map(|g| g.actions.iter().map(move |a| (g.stage, a)))
    }
}
