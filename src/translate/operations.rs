//! Abstract structural operations
//!
//! The translator's output units. Each operation is an opaque "compile to
//! statement text" step for the per-dialect statement compiler; the engine
//! never inspects the generated text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hints::{CopiedColumnPair, IdentityPair};
use crate::model::{
    ColumnType, ForeignKeyNode, FullTextIndexNode, PrimaryIndexNode, SecondaryIndexNode,
};

/// Full definition of a column inside a CreateTable/CreateColumn operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub collation: Option<String>,
}

/// Full definition of a table being created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_index: Option<(String, PrimaryIndexNode)>,
}

/// The closed set of structural operations an upgrade plan can contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructuralOperation {
    CreateTable {
        table: TableSpec,
    },
    RemoveTable {
        table: String,
    },
    RenameTable {
        old_name: String,
        new_name: String,
    },
    CreateColumn {
        table: String,
        column: ColumnSpec,
    },
    RemoveColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        old_name: String,
        new_name: String,
    },
    AlterColumnType {
        table: String,
        column: String,
        new_type: ColumnType,
        nullable: bool,
    },
    AlterColumnDefault {
        table: String,
        column: String,
        default_value: Option<String>,
    },
    CreatePrimaryIndex {
        table: String,
        name: String,
        index: PrimaryIndexNode,
    },
    RemovePrimaryIndex {
        table: String,
        name: String,
    },
    CreateSecondaryIndex {
        table: String,
        name: String,
        index: SecondaryIndexNode,
    },
    RemoveSecondaryIndex {
        table: String,
        name: String,
    },
    CreateForeignKey {
        table: String,
        name: String,
        key: ForeignKeyNode,
    },
    RemoveForeignKey {
        table: String,
        name: String,
    },
    CreateSequence {
        name: String,
        start: i64,
        increment: i64,
    },
    RemoveSequence {
        name: String,
    },
    AlterSequence {
        name: String,
        start: i64,
        increment: i64,
    },
    /// Single-row counter table emulating a sequence on providers without
    /// native sequence support.
    CreateGeneratorTable {
        name: String,
        value_type: ColumnType,
        seed: i64,
        increment: i64,
    },
    DropGeneratorTable {
        name: String,
    },
    CreateFullTextIndex {
        table: String,
        name: String,
        index: FullTextIndexNode,
    },
    RemoveFullTextIndex {
        table: String,
        name: String,
    },
    DisableConstraints,
    EnableConstraints,
    /// Set-based row copy between two tables.
    CopyData {
        source_table: String,
        target_table: String,
        columns: Vec<CopiedColumnPair>,
        identity: Vec<IdentityPair>,
    },
    DeleteData {
        table: String,
        identity: Vec<IdentityPair>,
    },
    UpdateData {
        table: String,
        column: String,
        value: Option<String>,
        identity: Vec<IdentityPair>,
    },
}

impl StructuralOperation {
    /// Short label used in reports and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            StructuralOperation::CreateTable { .. } => "create table",
            StructuralOperation::RemoveTable { .. } => "remove table",
            StructuralOperation::RenameTable { .. } => "rename table",
            StructuralOperation::CreateColumn { .. } => "create column",
            StructuralOperation::RemoveColumn { .. } => "remove column",
            StructuralOperation::RenameColumn { .. } => "rename column",
            StructuralOperation::AlterColumnType { .. } => "alter column type",
            StructuralOperation::AlterColumnDefault { .. } => "alter column default",
            StructuralOperation::CreatePrimaryIndex { .. } => "create primary index",
            StructuralOperation::RemovePrimaryIndex { .. } => "remove primary index",
            StructuralOperation::CreateSecondaryIndex { .. } => "create index",
            StructuralOperation::RemoveSecondaryIndex { .. } => "remove index",
            StructuralOperation::CreateForeignKey { .. } => "create foreign key",
            StructuralOperation::RemoveForeignKey { .. } => "remove foreign key",
            StructuralOperation::CreateSequence { .. } => "create sequence",
            StructuralOperation::RemoveSequence { .. } => "remove sequence",
            StructuralOperation::AlterSequence { .. } => "alter sequence",
            StructuralOperation::CreateGeneratorTable { .. } => "create generator table",
            StructuralOperation::DropGeneratorTable { .. } => "drop generator table",
            StructuralOperation::CreateFullTextIndex { .. } => "create full-text index",
            StructuralOperation::RemoveFullTextIndex { .. } => "remove full-text index",
            StructuralOperation::DisableConstraints => "disable constraints",
            StructuralOperation::EnableConstraints => "enable constraints",
            StructuralOperation::CopyData { .. } => "copy data",
            StructuralOperation::DeleteData { .. } => "delete data",
            StructuralOperation::UpdateData { .. } => "update data",
        }
    }
}

impl fmt::Display for StructuralOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralOperation::CreateTable { table } => {
                write!(f, "create table {} ({} columns)", table.name, table.columns.len())
            }
            StructuralOperation::RemoveTable { table } => write!(f, "remove table {}", table),
            StructuralOperation::RenameTable { old_name, new_name } => {
                write!(f, "rename table {} -> {}", old_name, new_name)
            }
            StructuralOperation::CreateColumn { table, column } => {
                write!(f, "create column {}.{} {}", table, column.name, column.column_type)
            }
            StructuralOperation::RemoveColumn { table, column } => {
                write!(f, "remove column {}.{}", table, column)
            }
            StructuralOperation::RenameColumn {
                table,
                old_name,
                new_name,
            } => write!(f, "rename column {}.{} -> {}", table, old_name, new_name),
            StructuralOperation::AlterColumnType {
                table,
                column,
                new_type,
                ..
            } => write!(f, "alter column {}.{} : {}", table, column, new_type),
            StructuralOperation::AlterColumnDefault { table, column, .. } => {
                write!(f, "alter column default {}.{}", table, column)
            }
            StructuralOperation::CreatePrimaryIndex { table, name, .. } => {
                write!(f, "create primary index {} on {}", name, table)
            }
            StructuralOperation::RemovePrimaryIndex { table, name } => {
                write!(f, "remove primary index {} on {}", name, table)
            }
            StructuralOperation::CreateSecondaryIndex { table, name, .. } => {
                write!(f, "create index {} on {}", name, table)
            }
            StructuralOperation::RemoveSecondaryIndex { table, name } => {
                write!(f, "remove index {} on {}", name, table)
            }
            StructuralOperation::CreateForeignKey { table, name, key } => {
                write!(f, "create foreign key {} on {} -> {}", name, table, key.referenced_table)
            }
            StructuralOperation::RemoveForeignKey { table, name } => {
                write!(f, "remove foreign key {} on {}", name, table)
            }
            StructuralOperation::CreateSequence { name, .. } => {
                write!(f, "create sequence {}", name)
            }
            StructuralOperation::RemoveSequence { name } => write!(f, "remove sequence {}", name),
            StructuralOperation::AlterSequence { name, start, .. } => {
                write!(f, "alter sequence {} restart with {}", name, start)
            }
            StructuralOperation::CreateGeneratorTable { name, seed, .. } => {
                write!(f, "create generator table {} (seed {})", name, seed)
            }
            StructuralOperation::DropGeneratorTable { name } => {
                write!(f, "drop generator table {}", name)
            }
            StructuralOperation::CreateFullTextIndex { table, name, .. } => {
                write!(f, "create full-text index {} on {}", name, table)
            }
            StructuralOperation::RemoveFullTextIndex { table, name } => {
                write!(f, "remove full-text index {} on {}", name, table)
            }
            StructuralOperation::DisableConstraints => write!(f, "disable constraints"),
            StructuralOperation::EnableConstraints => write!(f, "enable constraints"),
            StructuralOperation::CopyData {
                source_table,
                target_table,
                columns,
                ..
            } => write!(
                f,
                "copy data {} -> {} ({} columns)",
                source_table,
                target_table,
                columns.len()
            ),
            StructuralOperation::DeleteData { table, identity } => {
                write!(f, "delete data from {} ({} predicates)", table, identity.len())
            }
            StructuralOperation::UpdateData { table, column, .. } => {
                write!(f, "update data {}.{}", table, column)
            }
        }
    }
}
