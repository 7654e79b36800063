//! Storage model node kinds and payloads

use serde::{Deserialize, Serialize};

/// The closed set of node kinds a storage model can contain.
///
/// `Catalog` and `Schema` only occur in the extracted physical graph; the
/// builders collapse them through the node name mapping, so a built model
/// starts at `Tables/...` and `Sequences/...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Catalog,
    Schema,
    Table,
    Column,
    PrimaryIndex,
    SecondaryIndex,
    ForeignKey,
    Sequence,
    FullTextIndex,
}

impl NodeKind {
    /// Path segment of the collection holding nodes of this kind.
    pub fn collection_segment(self) -> &'static str {
        match self {
            NodeKind::Catalog => "Catalogs",
            NodeKind::Schema => "Schemas",
            NodeKind::Table => "Tables",
            NodeKind::Column => "Columns",
            NodeKind::PrimaryIndex => "PrimaryIndex",
            NodeKind::SecondaryIndex => "Indexes",
            NodeKind::ForeignKey => "ForeignKeys",
            NodeKind::Sequence => "Sequences",
            NodeKind::FullTextIndex => "FullTextIndexes",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Catalog => "catalog",
            NodeKind::Schema => "schema",
            NodeKind::Table => "table",
            NodeKind::Column => "column",
            NodeKind::PrimaryIndex => "primary index",
            NodeKind::SecondaryIndex => "index",
            NodeKind::ForeignKey => "foreign key",
            NodeKind::Sequence => "sequence",
            NodeKind::FullTextIndex => "full-text index",
        };
        write!(f, "{}", name)
    }
}

/// Abstract column type: a base type name plus optional size facets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    pub base: String,
    pub length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
}

impl ColumnType {
    pub fn new(base: impl Into<String>) -> Self {
        ColumnType {
            base: base.into(),
            length: None,
            precision: None,
            scale: None,
        }
    }

    pub fn with_length(base: impl Into<String>, length: u32) -> Self {
        ColumnType {
            base: base.into(),
            length: Some(length),
            precision: None,
            scale: None,
        }
    }

    /// Whether changing a column from `self` to `to` is provably lossless:
    /// same base type with no shrinking facet. Anything else (including a
    /// base-type change) cannot be proven and is classified unsafe unless
    /// hinted.
    pub fn is_lossless_change_to(&self, to: &ColumnType) -> bool {
        if self.base != to.base {
            return false;
        }
        let widens = |from: Option<u32>, to: Option<u32>| match (from, to) {
            (Some(a), Some(b)) => b >= a,
            (None, None) => true,
            // Gaining or losing a facet is a representation change.
            _ => false,
        };
        widens(self.length, to.length)
            && widens(self.precision.map(u32::from), to.precision.map(u32::from))
            && widens(self.scale.map(u32::from), to.scale.map(u32::from))
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)?;
        if let Some(len) = self.length {
            write!(f, "({})", len)?;
        } else if let Some(p) = self.precision {
            match self.scale {
                Some(s) => write!(f, "({},{})", p, s)?,
                None => write!(f, "({})", p)?,
            }
        }
        Ok(())
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableNode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNode {
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryIndexNode {
    /// Key column names, in key order. All must exist in the parent table.
    pub key_columns: Vec<String>,
    pub clustered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexNode {
    pub key_columns: Vec<String>,
    pub include_columns: Vec<String>,
    pub unique: bool,
    /// Partial-index filter, already rendered for the target dialect.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyNode {
    pub columns: Vec<String>,
    /// Path of the referenced table (`Tables/X`), resolved within the same
    /// model.
    pub referenced_table: String,
    /// Referenced columns; must be the referenced table's primary key.
    pub referenced_columns: Vec<String>,
    pub on_delete: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceNode {
    pub start: i64,
    pub increment: i64,
    /// Current value as extracted, if known. Needed when a sequence has to
    /// be recreated (natively or as a generator table).
    pub last_value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextColumn {
    pub name: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextIndexNode {
    pub columns: Vec<FullTextColumn>,
}

/// Typed payload of a storage model node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodePayload {
    Table(TableNode),
    Column(ColumnNode),
    PrimaryIndex(PrimaryIndexNode),
    SecondaryIndex(SecondaryIndexNode),
    ForeignKey(ForeignKeyNode),
    Sequence(SequenceNode),
    FullTextIndex(FullTextIndexNode),
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Table(_) => NodeKind::Table,
            NodePayload::Column(_) => NodeKind::Column,
            NodePayload::PrimaryIndex(_) => NodeKind::PrimaryIndex,
            NodePayload::SecondaryIndex(_) => NodeKind::SecondaryIndex,
            NodePayload::ForeignKey(_) => NodeKind::ForeignKey,
            NodePayload::Sequence(_) => NodeKind::Sequence,
            NodePayload::FullTextIndex(_) => NodeKind::FullTextIndex,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnNode> {
        match self {
            NodePayload::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceNode> {
        match self {
            NodePayload::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_foreign_key(&self) -> Option<&ForeignKeyNode> {
        match self {
            NodePayload::ForeignKey(fk) => Some(fk),
            _ => None,
        }
    }

    pub fn as_primary_index(&self) -> Option<&PrimaryIndexNode> {
        match self {
            NodePayload::PrimaryIndex(p) => Some(p),
            _ => None,
        }
    }
}
