//! Extracted physical schema graph and its storage-model conversion

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::UpgradeError;
use crate::model::{
    table_path, ColumnNode, ColumnType, ForeignKeyNode, FullTextColumn, FullTextIndexNode,
    NodePayload, PrimaryIndexNode, ReferentialAction, SecondaryIndexNode, SequenceNode,
    StorageModel, TableNode,
};
use crate::provider::WildcardMatcher;

/// A catalog as read from the live store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalCatalog {
    pub name: String,
    #[serde(default)]
    pub collation: Option<String>,
    #[serde(default)]
    pub partition_functions: Vec<PartitionFunction>,
    #[serde(default)]
    pub partition_schemes: Vec<PartitionScheme>,
    pub schemas: Vec<PhysicalSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionFunction {
    pub name: String,
    pub boundary_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionScheme {
    pub name: String,
    pub function: String,
    pub filegroups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSchema {
    pub name: String,
    #[serde(default)]
    pub domains: Vec<PhysicalDomain>,
    #[serde(default)]
    pub sequences: Vec<PhysicalSequence>,
    #[serde(default)]
    pub tables: Vec<PhysicalTable>,
    #[serde(default)]
    pub views: Vec<PhysicalView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDomain {
    pub name: String,
    pub base_type: ColumnType,
    #[serde(default)]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSequence {
    pub name: String,
    pub start: i64,
    pub increment: i64,
    #[serde(default)]
    pub last_value: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalTable {
    pub name: String,
    pub columns: Vec<PhysicalColumn>,
    #[serde(default)]
    pub primary_key: Option<PhysicalPrimaryKey>,
    #[serde(default)]
    pub indexes: Vec<PhysicalIndex>,
    #[serde(default)]
    pub full_text_index: Option<PhysicalFullTextIndex>,
    #[serde(default)]
    pub foreign_keys: Vec<PhysicalForeignKey>,
    #[serde(default)]
    pub partition_scheme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalColumn {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub collation: Option<String>,
    /// Domain (user-defined type) the column's type comes from, if any.
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub clustered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalIndex {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub include_columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub spatial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalFullTextIndex {
    pub name: String,
    pub columns: Vec<FullTextColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub referenced_schema: Option<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalView {
    pub name: String,
    pub definition: String,
}

impl PhysicalCatalog {
    pub fn schema(&self, name: &str) -> Option<&PhysicalSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }
}

/// Catalog/schema name remapping for multi-tenant "node" deployments:
/// several logical nodes share one physical database under different
/// schema names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMapping {
    /// Physical catalog name -> logical name.
    #[serde(default)]
    pub catalogs: HashMap<String, String>,
    /// Physical schema name -> logical name.
    #[serde(default)]
    pub schemas: HashMap<String, String>,
    /// Logical schema treated as the default; its tables keep bare names.
    #[serde(default)]
    pub default_schema: Option<String>,
    /// Wildcard patterns of tables to leave out of the model entirely.
    #[serde(default)]
    pub ignored_tables: Vec<String>,
}

impl NodeMapping {
    pub fn logical_schema<'a>(&'a self, physical: &'a str) -> &'a str {
        self.schemas.get(physical).map(String::as_str).unwrap_or(physical)
    }

    pub fn logical_catalog<'a>(&'a self, physical: &'a str) -> &'a str {
        self.catalogs.get(physical).map(String::as_str).unwrap_or(physical)
    }

    fn is_default_schema(&self, logical: &str) -> bool {
        match &self.default_schema {
            Some(default) => default == logical,
            None => true,
        }
    }

    /// Model-level node name of a table in the given schema.
    fn table_node_name(&self, logical_schema: &str, table: &str) -> String {
        if self.is_default_schema(logical_schema) {
            table.to_string()
        } else {
            format!("{}.{}", logical_schema, table)
        }
    }
}

/// Convert an extracted physical catalog into a storage model.
///
/// Ignored tables are dropped from the model; any table referenced by a
/// foreign key of an ignored table is kept but locked, so a later attempt
/// to remove it fails with the blocking reason.
pub fn build_extracted_model(
    catalog: &PhysicalCatalog,
    mapping: &NodeMapping,
    matcher: &mut WildcardMatcher,
) -> Result<StorageModel, UpgradeError> {
    let logical_catalog = mapping.logical_catalog(&catalog.name);
    let mut model = StorageModel::new(logical_catalog.to_string());

    // First pass: which tables are ignored, and which are locked by a
    // foreign key from an ignored table.
    let mut ignored: Vec<(&str, &PhysicalTable)> = Vec::new();
    let mut lock_reasons: HashMap<String, String> = HashMap::new();
    for schema in &catalog.schemas {
        let logical = mapping.logical_schema(&schema.name);
        for table in &schema.tables {
            let is_ignored = mapping
                .ignored_tables
                .iter()
                .any(|pattern| matcher.matches(pattern, &table.name));
            if is_ignored {
                debug!("ignoring table {}.{}", schema.name, table.name);
                ignored.push((logical, table));
            }
        }
    }
    for (logical, table) in &ignored {
        for fk in &table.foreign_keys {
            let referenced_schema = fk
                .referenced_schema
                .as_deref()
                .map(|s| mapping.logical_schema(s))
                .unwrap_or(logical);
            let referenced = mapping.table_node_name(referenced_schema, &fk.referenced_table);
            lock_reasons.insert(
                referenced,
                format!(
                    "required by foreign key '{}' of ignored table '{}'",
                    fk.name, table.name
                ),
            );
        }
    }

    for schema in &catalog.schemas {
        let logical = mapping.logical_schema(&schema.name);
        for sequence in &schema.sequences {
            model.add_node(
                None,
                sequence.name.clone(),
                NodePayload::Sequence(SequenceNode {
                    start: sequence.start,
                    increment: sequence.increment,
                    last_value: sequence.last_value,
                }),
            )?;
        }
        for table in &schema.tables {
            let node_name = mapping.table_node_name(logical, &table.name);
            let is_ignored = mapping
                .ignored_tables
                .iter()
                .any(|pattern| matcher.matches(pattern, &table.name));
            if is_ignored {
                continue;
            }
            let table_id = model.add_node(None, node_name.clone(), NodePayload::Table(TableNode))?;
            if let Some(reason) = lock_reasons.get(&node_name) {
                model.set_locked(table_id, reason.clone());
            }

            for column in &table.columns {
                // Domain-typed columns carry the domain's base type.
                let column_type = match &column.domain {
                    Some(domain) => schema
                        .domains
                        .iter()
                        .find(|d| &d.name == domain)
                        .map(|d| d.base_type.clone())
                        .unwrap_or_else(|| column.column_type.clone()),
                    None => column.column_type.clone(),
                };
                model.add_node(
                    Some(table_id),
                    column.name.clone(),
                    NodePayload::Column(ColumnNode {
                        column_type,
                        nullable: column.nullable,
                        default_value: column.default_value.clone(),
                        collation: column.collation.clone(),
                    }),
                )?;
            }
            if let Some(pk) = &table.primary_key {
                model.add_node(
                    Some(table_id),
                    pk.name.clone(),
                    NodePayload::PrimaryIndex(PrimaryIndexNode {
                        key_columns: pk.columns.clone(),
                        clustered: pk.clustered,
                    }),
                )?;
            }
            for index in &table.indexes {
                model.add_node(
                    Some(table_id),
                    index.name.clone(),
                    NodePayload::SecondaryIndex(SecondaryIndexNode {
                        key_columns: index.columns.clone(),
                        include_columns: index.include_columns.clone(),
                        unique: index.unique,
                        filter: index.filter.clone(),
                    }),
                )?;
            }
            if let Some(fti) = &table.full_text_index {
                model.add_node(
                    Some(table_id),
                    fti.name.clone(),
                    NodePayload::FullTextIndex(FullTextIndexNode {
                        columns: fti.columns.clone(),
                    }),
                )?;
            }
            for fk in &table.foreign_keys {
                let referenced_schema = fk
                    .referenced_schema
                    .as_deref()
                    .map(|s| mapping.logical_schema(s))
                    .unwrap_or(logical);
                let referenced = mapping.table_node_name(referenced_schema, &fk.referenced_table);
                model.add_node(
                    Some(table_id),
                    fk.name.clone(),
                    NodePayload::ForeignKey(ForeignKeyNode {
                        columns: fk.columns.clone(),
                        referenced_table: table_path(&referenced),
                        referenced_columns: fk.referenced_columns.clone(),
                        on_delete: fk.on_delete,
                    }),
                )?;
            }
        }
    }

    Ok(model)
}
