//! Domain model -> storage model conversion
//!
//! Builds the "target" storage model the comparer diffs against: tables
//! per inheritance schema, flattened structure fields, reference columns
//! with foreign keys, primary/secondary/full-text indexes, key-generator
//! sequences. Default values and partial-index filters are parsed and
//! re-rendered for the target dialect here.

use std::collections::HashMap;

use log::{debug, warn};
use sqlparser::ast::{Expr, Ident};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::domain::{DomainModel, FieldValue, InheritanceSchema, StoredField, StoredType};
use crate::error::UpgradeError;
use crate::model::{
    table_path, ColumnNode, ColumnType, ForeignKeyNode, FullTextColumn, FullTextIndexNode,
    NodePayload, PrimaryIndexNode, ReferentialAction, SecondaryIndexNode, SequenceNode,
    StorageModel, TableNode,
};
use crate::provider::{ProviderCapabilities, QuoteStyle};

/// Discriminator column added to single-table and class-table hierarchy
/// roots.
pub const TYPE_ID_COLUMN: &str = "TypeId";

struct ColumnDef {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    default_value: Option<String>,
    collation: Option<String>,
}

struct ForeignKeyDef {
    name: String,
    columns: Vec<String>,
    referenced_table: String,
    referenced_columns: Vec<String>,
}

/// Build the target storage model from the current domain model.
pub fn build_domain_model(
    domain: &DomainModel,
    caps: &ProviderCapabilities,
) -> Result<StorageModel, UpgradeError> {
    let mut model = StorageModel::new("domain");

    for generator in &domain.generators {
        model.add_node(
            None,
            generator.name.clone(),
            NodePayload::Sequence(SequenceNode {
                start: generator.start,
                increment: generator.increment,
                last_value: None,
            }),
        )?;
    }

    for stored in &domain.types {
        if !owns_table(domain, stored) {
            continue;
        }
        let table_name = stored_table_name(domain, stored);
        let table_id = model.add_node(None, table_name.clone(), NodePayload::Table(TableNode))?;

        let mut columns = Vec::new();
        let mut foreign_keys = Vec::new();
        collect_columns(domain, stored, &mut columns, &mut foreign_keys)?;

        let mut key_columns = Vec::new();
        for field in domain.key_fields(stored) {
            key_columns.push(field.mapping_name.clone());
        }

        for column in &columns {
            model.add_node(
                Some(table_id),
                column.name.clone(),
                NodePayload::Column(ColumnNode {
                    column_type: column.column_type.clone(),
                    nullable: column.nullable,
                    default_value: column.default_value.clone(),
                    collation: column.collation.clone().or_else(|| stored.collation.clone()),
                }),
            )?;
        }

        if !key_columns.is_empty() {
            model.add_node(
                Some(table_id),
                format!("PK_{}", table_name),
                NodePayload::PrimaryIndex(PrimaryIndexNode {
                    key_columns,
                    clustered: caps.clustered_indexes,
                }),
            )?;
        }

        for fk in foreign_keys {
            model.add_node(
                Some(table_id),
                fk.name,
                NodePayload::ForeignKey(ForeignKeyNode {
                    columns: fk.columns,
                    referenced_table: table_path(&fk.referenced_table),
                    referenced_columns: fk.referenced_columns,
                    on_delete: ReferentialAction::NoAction,
                }),
            )?;
        }

        let field_columns: HashMap<String, String> = stored
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.mapping_name.clone()))
            .collect();
        for index in &stored.indexes {
            if index.full_text {
                if !caps.full_text {
                    debug!("provider lacks full text, skipping index {}", index.name);
                    continue;
                }
                let columns = index
                    .key_fields
                    .iter()
                    .zip(index.languages.iter().chain(std::iter::repeat(&None)))
                    .map(|(field, language)| FullTextColumn {
                        name: field_columns.get(field).cloned().unwrap_or_else(|| field.clone()),
                        language: language.clone(),
                    })
                    .collect();
                model.add_node(
                    Some(table_id),
                    index.name.clone(),
                    NodePayload::FullTextIndex(FullTextIndexNode { columns }),
                )?;
                continue;
            }

            let filter = match &index.filter {
                Some(expr) if caps.partial_indexes => {
                    Some(translate_filter(expr, &field_columns, caps)?)
                }
                Some(_) => {
                    warn!(
                        "provider lacks partial indexes; index {} loses its filter",
                        index.name
                    );
                    None
                }
                None => None,
            };
            let resolve = |field: &String| {
                field_columns.get(field).cloned().unwrap_or_else(|| field.clone())
            };
            model.add_node(
                Some(table_id),
                index.name.clone(),
                NodePayload::SecondaryIndex(SecondaryIndexNode {
                    key_columns: index.key_fields.iter().map(resolve).collect(),
                    include_columns: index.include_fields.iter().map(resolve).collect(),
                    unique: index.unique,
                    filter,
                }),
            )?;
        }
    }

    Ok(model)
}

/// Whether a stored type maps to a table of its own.
fn owns_table(domain: &DomainModel, stored: &StoredType) -> bool {
    if stored.is_structure() {
        return false;
    }
    match stored.hierarchy.as_ref().map(|h| h.schema) {
        Some(InheritanceSchema::SingleTable) => {
            domain.hierarchy_root(stored).name == stored.name
        }
        _ => true,
    }
}

fn stored_table_name(domain: &DomainModel, stored: &StoredType) -> String {
    domain
        .mapped_table(stored)
        .unwrap_or(stored.mapping_name.as_str())
        .to_string()
}

fn collect_columns(
    domain: &DomainModel,
    stored: &StoredType,
    columns: &mut Vec<ColumnDef>,
    foreign_keys: &mut Vec<ForeignKeyDef>,
) -> Result<(), UpgradeError> {
    let table = stored_table_name(domain, stored);
    let schema = stored.hierarchy.as_ref().map(|h| h.schema);

    // Key columns come first; they belong to the hierarchy root.
    for field in domain.key_fields(stored) {
        push_field(domain, &table, field, false, columns, foreign_keys)?;
    }

    let is_root = domain.hierarchy_root(stored).name == stored.name;
    if is_root
        && matches!(
            schema,
            Some(InheritanceSchema::SingleTable) | Some(InheritanceSchema::ClassTable)
        )
    {
        columns.push(ColumnDef {
            name: TYPE_ID_COLUMN.to_string(),
            column_type: ColumnType::new("int32"),
            nullable: false,
            default_value: None,
            collation: None,
        });
    }

    // Inherited fields for concrete-table layouts.
    if matches!(schema, Some(InheritanceSchema::ConcreteTable)) {
        let mut ancestors = domain.ancestors(stored);
        ancestors.reverse();
        for ancestor in ancestors {
            for field in ancestor.fields.iter().filter(|f| !f.is_primary_key) {
                push_field(domain, &table, field, false, columns, foreign_keys)?;
            }
        }
    }

    for field in stored.fields.iter().filter(|f| !f.is_primary_key) {
        push_field(domain, &table, field, false, columns, foreign_keys)?;
    }

    // Single-table layouts pull every descendant's fields into the root
    // table, forced nullable because the rows of other types leave them
    // empty.
    if is_root && matches!(schema, Some(InheritanceSchema::SingleTable)) {
        for descendant in domain.types.iter().filter(|t| {
            t.name != stored.name
                && t.hierarchy.as_ref().map(|h| h.root.as_str()) == Some(stored.name.as_str())
        }) {
            for field in descendant.fields.iter().filter(|f| !f.is_primary_key) {
                push_field(domain, &table, field, true, columns, foreign_keys)?;
            }
        }
    }

    Ok(())
}

fn push_field(
    domain: &DomainModel,
    table: &str,
    field: &StoredField,
    force_nullable: bool,
    columns: &mut Vec<ColumnDef>,
    foreign_keys: &mut Vec<ForeignKeyDef>,
) -> Result<(), UpgradeError> {
    match &field.value {
        FieldValue::Primitive(column_type) => {
            let default_value = field
                .default_value
                .as_deref()
                .map(resolve_default_expression)
                .transpose()?;
            columns.push(ColumnDef {
                name: field.mapping_name.clone(),
                column_type: column_type.clone(),
                nullable: field.nullable || force_nullable,
                default_value,
                collation: None,
            });
        }
        FieldValue::Reference { target_type } => {
            let Some(target) = domain.get(target_type) else {
                return Err(UpgradeError::UnresolvedReference {
                    kind: "type",
                    name: target_type.clone(),
                    model: "new",
                });
            };
            let target_keys = domain.key_fields(target);
            let Some(key) = target_keys.first() else {
                debug!("reference {} targets keyless type {}", field.name, target_type);
                return Ok(());
            };
            let key_type = match &key.value {
                FieldValue::Primitive(ct) => ct.clone(),
                _ => ColumnType::new("int64"),
            };
            columns.push(ColumnDef {
                name: field.mapping_name.clone(),
                column_type: key_type,
                nullable: field.nullable || force_nullable,
                default_value: None,
                collation: None,
            });
            let target_schema = target.hierarchy.as_ref().map(|h| h.schema);
            if matches!(target_schema, Some(InheritanceSchema::ConcreteTable)) {
                // No single table to point at; the reference stays
                // unconstrained.
                debug!(
                    "skipping foreign key for {}.{}: target uses concrete-table inheritance",
                    table, field.name
                );
            } else if let Some(referenced_table) = domain.mapped_table(target) {
                foreign_keys.push(ForeignKeyDef {
                    name: format!("FK_{}_{}", table, field.mapping_name),
                    columns: vec![field.mapping_name.clone()],
                    referenced_table: referenced_table.to_string(),
                    referenced_columns: vec![key.mapping_name.clone()],
                });
            }
        }
        FieldValue::Structure { .. } => {
            for nested in &field.fields {
                let mut prefixed = nested.clone();
                prefixed.mapping_name =
                    format!("{}.{}", field.mapping_name, nested.mapping_name);
                push_field(
                    domain,
                    table,
                    &prefixed,
                    field.nullable || force_nullable,
                    columns,
                    foreign_keys,
                )?;
            }
        }
        // The connector type owns the association table.
        FieldValue::EntitySet { .. } => {}
    }
    Ok(())
}

/// Parse and normalize a default-value expression.
fn resolve_default_expression(expr: &str) -> Result<String, UpgradeError> {
    let dialect = GenericDialect {};
    let parsed = Parser::new(&dialect)
        .try_with_sql(expr)
        .and_then(|mut parser| parser.parse_expr())
        .map_err(|source| UpgradeError::ExpressionParse {
            expression: expr.to_string(),
            source,
        })?;
    Ok(parsed.to_string())
}

/// Translate a dialect-neutral filter over field names into the target
/// dialect's column expression.
fn translate_filter(
    filter: &str,
    field_columns: &HashMap<String, String>,
    caps: &ProviderCapabilities,
) -> Result<String, UpgradeError> {
    let dialect = GenericDialect {};
    let mut parsed = Parser::new(&dialect)
        .try_with_sql(filter)
        .and_then(|mut parser| parser.parse_expr())
        .map_err(|source| UpgradeError::ExpressionParse {
            expression: filter.to_string(),
            source,
        })?;
    let quote = match caps.quote_style {
        QuoteStyle::DoubleQuote => '"',
        QuoteStyle::Bracket => '[',
        QuoteStyle::Backtick => '`',
    };
    rewrite_identifiers(&mut parsed, field_columns, quote);
    Ok(parsed.to_string())
}

fn rewrite_identifiers(expr: &mut Expr, field_columns: &HashMap<String, String>, quote: char) {
    match expr {
        Expr::Identifier(ident) => {
            if let Some(column) = field_columns.get(&ident.value) {
                *ident = Ident::with_quote(quote, column.clone());
            }
        }
        Expr::CompoundIdentifier(parts) => {
            if let Some(last) = parts.last_mut() {
                if let Some(column) = field_columns.get(&last.value) {
                    *last = Ident::with_quote(quote, column.clone());
                }
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            rewrite_identifiers(left, field_columns, quote);
            rewrite_identifiers(right, field_columns, quote);
        }
        Expr::UnaryOp { expr: inner, .. }
        | Expr::Nested(inner)
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::IsTrue(inner)
        | Expr::IsFalse(inner) => rewrite_identifiers(inner, field_columns, quote),
        Expr::InList { expr: inner, list, .. } => {
            rewrite_identifiers(inner, field_columns, quote);
            for item in list {
                rewrite_identifiers(item, field_columns, quote);
            }
        }
        Expr::Between {
            expr: inner,
            low,
            high,
            ..
        } => {
            rewrite_identifiers(inner, field_columns, quote);
            rewrite_identifiers(low, field_columns, quote);
            rewrite_identifiers(high, field_columns, quote);
        }
        _ => {}
    }
}
