//! Catalog cloning for multi-tenant node deployments
//!
//! Deep-copies a physical catalog while remapping schema names, so a new
//! node's schemas can be stamped out of an existing node's inside the
//! same database. Pure: the input catalog is never touched, and every
//! cross-link in the copy resolves against cloned objects.

use std::collections::HashMap;

use log::debug;

use crate::builder::physical::{PhysicalCatalog, PhysicalSchema, PhysicalTable};

/// Clone `catalog`, renaming each schema per `schema_names` (old name ->
/// new name). Schemas without an entry keep their name. Foreign keys
/// whose referenced schema is renamed are re-pointed at the clone.
/// Partition functions and schemes are catalog-level and copied as-is.
pub fn clone_catalog(catalog: &PhysicalCatalog, schema_names: &HashMap<String, String>) -> PhysicalCatalog {
    let mut cloned = PhysicalCatalog {
        name: catalog.name.clone(),
        collation: catalog.collation.clone(),
        partition_functions: catalog.partition_functions.clone(),
        partition_schemes: catalog.partition_schemes.clone(),
        schemas: Vec::with_capacity(catalog.schemas.len()),
    };
    for schema in &catalog.schemas {
        cloned.schemas.push(clone_schema(schema, schema_names));
    }
    cloned
}

fn clone_schema(schema: &PhysicalSchema, schema_names: &HashMap<String, String>) -> PhysicalSchema {
    let new_name = schema_names
        .get(&schema.name)
        .cloned()
        .unwrap_or_else(|| schema.name.clone());
    if new_name != schema.name {
        debug!("cloning schema {} as {}", schema.name, new_name);
    }
    PhysicalSchema {
        name: new_name,
        domains: schema.domains.clone(),
        sequences: schema.sequences.clone(),
        tables: schema
            .tables
            .iter()
            .map(|t| clone_table(t, &schema.name, schema_names))
            .collect(),
        views: schema.views.clone(),
    }
}

fn clone_table(
    table: &PhysicalTable,
    own_schema: &str,
    schema_names: &HashMap<String, String>,
) -> PhysicalTable {
    let mut cloned = table.clone();
    for fk in &mut cloned.foreign_keys {
        // A bare reference is schema-local; it stays bare and follows the
        // enclosing schema's rename implicitly.
        let referenced = fk.referenced_schema.as_deref().unwrap_or(own_schema);
        if let Some(renamed) = schema_names.get(referenced) {
            if fk.referenced_schema.is_some() {
                fk.referenced_schema = Some(renamed.clone());
            }
        }
    }
    cloned
}
