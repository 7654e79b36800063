//! Arena-backed storage model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::UpgradeError;
use crate::model::nodes::{NodeKind, NodePayload};

/// Stable handle of a node within one [`StorageModel`].
///
/// Handles are never reused within a model; removing a node only detaches
/// it from the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single node: name, tree links, payload and an optional lock reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub name: String,
    pub path: String,
    pub children: Vec<NodeId>,
    pub payload: NodePayload,
    /// Set when an extraction rule forbids removing this object; carries
    /// the blocking reason.
    pub locked: Option<String>,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }
}

/// A forest of tables and sequences addressed by path.
///
/// Built once per comparison cycle; only the translator mutates its
/// working copy while operations are conceptually applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageModel {
    name: String,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    by_path: HashMap<String, NodeId>,
}

impl StorageModel {
    pub fn new(name: impl Into<String>) -> Self {
        StorageModel {
            name: name.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a node under `parent` (or at the root for tables/sequences).
    /// Fails when the computed path is already taken.
    pub fn add_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        payload: NodePayload,
    ) -> Result<NodeId, UpgradeError> {
        let name = name.into();
        let path = self.compute_path(parent, payload.kind(), &name);
        if self.by_path.contains_key(&path) {
            return Err(UpgradeError::DuplicatePath {
                path,
                model: self.name.clone(),
            });
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            parent,
            name,
            path: path.clone(),
            children: Vec::new(),
            payload,
            locked: None,
        });
        match parent {
            Some(p) => self.nodes[p.index()].children.push(id),
            None => self.roots.push(id),
        }
        self.by_path.insert(path, id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn payload_mut(&mut self, id: NodeId) -> &mut NodePayload {
        &mut self.nodes[id.index()].payload
    }

    pub fn set_locked(&mut self, id: NodeId, reason: impl Into<String>) {
        self.nodes[id.index()].locked = Some(reason.into());
    }

    /// Resolve a path; used only when crossing a model boundary.
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn require(&self, path: &str, model: &'static str) -> Result<NodeId, UpgradeError> {
        self.resolve(path).ok_or_else(|| UpgradeError::PathNotFound {
            path: path.to_string(),
            model,
        })
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.iter().map(move |id| self.node(*id))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Node> {
        self.roots().filter(|n| n.kind() == NodeKind::Table)
    }

    pub fn sequences(&self) -> impl Iterator<Item = &Node> {
        self.roots().filter(|n| n.kind() == NodeKind::Sequence)
    }

    pub fn children_of_kind<'a>(
        &'a self,
        id: NodeId,
        kind: NodeKind,
    ) -> impl Iterator<Item = &'a Node> {
        self.node(id)
            .children
            .iter()
            .map(move |c| self.node(*c))
            .filter(move |n| n.kind() == kind)
    }

    pub fn child_named(&self, id: NodeId, kind: NodeKind, name: &str) -> Option<&Node> {
        self.children_of_kind(id, kind).find(|n| n.name == name)
    }

    /// Rename a node in place, recomputing the paths of its whole subtree.
    pub fn rename_node(&mut self, id: NodeId, new_name: impl Into<String>) {
        self.nodes[id.index()].name = new_name.into();
        self.reindex_subtree(id);
    }

    /// Detach a node (and its subtree) from the model. The arena slot stays
    /// allocated so outstanding handles remain valid for diagnostics.
    pub fn remove_node(&mut self, id: NodeId) {
        self.unmap_subtree(id);
        let parent = self.nodes[id.index()].parent;
        match parent {
            Some(p) => self.nodes[p.index()].children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }
        self.nodes[id.index()].parent = None;
    }

    fn compute_path(&self, parent: Option<NodeId>, kind: NodeKind, name: &str) -> String {
        match parent {
            Some(p) => format!(
                "{}/{}/{}",
                self.node(p).path,
                kind.collection_segment(),
                name
            ),
            None => format!("{}/{}", kind.collection_segment(), name),
        }
    }

    fn reindex_subtree(&mut self, id: NodeId) {
        self.unmap_subtree(id);
        self.remap_subtree(id);
    }

    fn unmap_subtree(&mut self, id: NodeId) {
        let path = self.nodes[id.index()].path.clone();
        self.by_path.remove(&path);
        let children = self.nodes[id.index()].children.clone();
        for child in children {
            self.unmap_subtree(child);
        }
    }

    fn remap_subtree(&mut self, id: NodeId) {
        let (parent, kind, name) = {
            let n = &self.nodes[id.index()];
            (n.parent, n.kind(), n.name.clone())
        };
        let path = self.compute_path(parent, kind, &name);
        self.nodes[id.index()].path = path.clone();
        self.by_path.insert(path, id);
        let children = self.nodes[id.index()].children.clone();
        for child in children {
            self.remap_subtree(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::nodes::{ColumnNode, ColumnType, TableNode};

    fn column() -> NodePayload {
        NodePayload::Column(ColumnNode {
            column_type: ColumnType::new("int64"),
            nullable: false,
            default_value: None,
            collation: None,
        })
    }

    #[test]
    fn paths_follow_the_tree() {
        let mut m = StorageModel::new("test");
        let t = m.add_node(None, "T", NodePayload::Table(TableNode)).unwrap();
        let c = m.add_node(Some(t), "Id", column()).unwrap();
        assert_eq!(m.node(c).path, "Tables/T/Columns/Id");
        assert_eq!(m.resolve("Tables/T/Columns/Id"), Some(c));
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut m = StorageModel::new("test");
        m.add_node(None, "T", NodePayload::Table(TableNode)).unwrap();
        let err = m.add_node(None, "T", NodePayload::Table(TableNode));
        assert!(matches!(err, Err(UpgradeError::DuplicatePath { .. })));
    }

    #[test]
    fn rename_reindexes_the_subtree() {
        let mut m = StorageModel::new("test");
        let t = m.add_node(None, "T", NodePayload::Table(TableNode)).unwrap();
        let c = m.add_node(Some(t), "Id", column()).unwrap();
        m.rename_node(t, "U");
        assert_eq!(m.resolve("Tables/T/Columns/Id"), None);
        assert_eq!(m.resolve("Tables/U/Columns/Id"), Some(c));
        assert_eq!(m.node(c).path, "Tables/U/Columns/Id");
    }

    #[test]
    fn remove_detaches_and_unmaps() {
        let mut m = StorageModel::new("test");
        let t = m.add_node(None, "T", NodePayload::Table(TableNode)).unwrap();
        m.add_node(Some(t), "Id", column()).unwrap();
        m.remove_node(t);
        assert_eq!(m.resolve("Tables/T"), None);
        assert_eq!(m.resolve("Tables/T/Columns/Id"), None);
        assert_eq!(m.tables().count(), 0);
    }
}
