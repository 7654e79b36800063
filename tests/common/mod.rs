//! Common test utilities for rust-schemaupgrade tests

use rust_schemaupgrade::builder::{
    PhysicalCatalog, PhysicalColumn, PhysicalPrimaryKey, PhysicalSchema, PhysicalSequence,
    PhysicalTable,
};
use rust_schemaupgrade::domain::DomainModel;
use rust_schemaupgrade::error::UpgradeError;
use rust_schemaupgrade::hints::HintSet;
use rust_schemaupgrade::model::ColumnType;
use rust_schemaupgrade::provider::ProviderCapabilities;
use rust_schemaupgrade::translate::UpgradeMode;
use rust_schemaupgrade::{plan_upgrade, UpgradeOptions, UpgradePlan};

/// A single-schema catalog named "app", as most fixtures extract it.
pub fn catalog(tables: Vec<PhysicalTable>) -> PhysicalCatalog {
    PhysicalCatalog {
        name: "app".to_string(),
        collation: None,
        partition_functions: vec![],
        partition_schemes: vec![],
        schemas: vec![PhysicalSchema {
            name: "public".to_string(),
            domains: vec![],
            sequences: vec![],
            tables,
            views: vec![],
        }],
    }
}

pub fn catalog_with_sequences(
    tables: Vec<PhysicalTable>,
    sequences: Vec<PhysicalSequence>,
) -> PhysicalCatalog {
    let mut cat = catalog(tables);
    cat.schemas[0].sequences = sequences;
    cat
}

/// A physical table with the given `(name, base type, nullable)` columns
/// and a `PK_{table}` primary key over `key_columns`.
pub fn table(name: &str, columns: &[(&str, &str, bool)], key_columns: &[&str]) -> PhysicalTable {
    PhysicalTable {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(column, base, nullable)| PhysicalColumn {
                name: column.to_string(),
                column_type: ColumnType::new(*base),
                nullable: *nullable,
                default_value: None,
                collation: None,
                domain: None,
            })
            .collect(),
        primary_key: if key_columns.is_empty() {
            None
        } else {
            Some(PhysicalPrimaryKey {
                name: format!("PK_{}", name),
                columns: key_columns.iter().map(|c| c.to_string()).collect(),
                clustered: true,
            })
        },
        indexes: vec![],
        full_text_index: None,
        foreign_keys: vec![],
        partition_scheme: None,
    }
}

pub fn sequence(name: &str, start: i64, increment: i64, last_value: Option<i64>) -> PhysicalSequence {
    PhysicalSequence {
        name: name.to_string(),
        start,
        increment,
        last_value,
    }
}

/// Plan with a fully capable provider, rejecting unsafe actions.
pub fn plan(
    catalog: &PhysicalCatalog,
    old: &DomainModel,
    new: &DomainModel,
    hints: HintSet,
) -> Result<UpgradePlan, UpgradeError> {
    plan_with(catalog, old, new, hints, UpgradeOptions::default())
}

pub fn plan_unsafe(
    catalog: &PhysicalCatalog,
    old: &DomainModel,
    new: &DomainModel,
    hints: HintSet,
) -> Result<UpgradePlan, UpgradeError> {
    plan_with(
        catalog,
        old,
        new,
        hints,
        UpgradeOptions {
            mode: UpgradeMode::AllowUnsafe,
            ..UpgradeOptions::default()
        },
    )
}

pub fn plan_with(
    catalog: &PhysicalCatalog,
    old: &DomainModel,
    new: &DomainModel,
    hints: HintSet,
    options: UpgradeOptions,
) -> Result<UpgradePlan, UpgradeError> {
    plan_upgrade(catalog, old, new, &hints, &options)
}

/// A fully capable provider, except for native sequences.
pub fn no_sequence_caps() -> ProviderCapabilities {
    ProviderCapabilities {
        sequences: false,
        ..ProviderCapabilities::full()
    }
}
