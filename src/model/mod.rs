//! Storage model: the typed, path-addressed graph describing a physical
//! (or physically-intended) database schema.
//!
//! Nodes live in an arena and are addressed by [`NodeId`] handles; the
//! slash-separated path map (`Tables/T/Columns/C`) is consulted only when
//! crossing a model boundary, e.g. when a hint or a source-model reference
//! has to be resolved against the target model.

mod nodes;
mod path;
mod storage;

pub use nodes::{
    ColumnNode, ColumnType, ForeignKeyNode, FullTextColumn, FullTextIndexNode, NodeKind,
    NodePayload, PrimaryIndexNode, ReferentialAction, SecondaryIndexNode, SequenceNode, TableNode,
};
pub use path::{column_path, leaf_name, rewrite_table, sequence_path, table_of, table_path};
pub use storage::{Node, NodeId, StorageModel};
