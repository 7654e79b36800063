//! Emulation paths on capability-poor providers

use rust_schemaupgrade::compare::UpgradeStage;
use rust_schemaupgrade::domain::{DomainModel, IndexDef, StoredField, StoredType};
use rust_schemaupgrade::hints::{HintSet, UpgradeHint};
use rust_schemaupgrade::provider::ProviderCapabilities;
use rust_schemaupgrade::translate::StructuralOperation;
use rust_schemaupgrade::UpgradeOptions;

use crate::common;

fn minimal_options() -> UpgradeOptions {
    UpgradeOptions {
        capabilities: ProviderCapabilities::minimal(),
        ..UpgradeOptions::default()
    }
}

/// A provider without column drop rebuilds the table through a shadow
/// copy: create, copy rows, drop the original, rename back.
#[test]
fn column_drop_is_emulated_through_a_shadow_table() {
    let mut person = common::table(
        "Person",
        &[
            ("Id", "int64", false),
            ("Name", "string", false),
            ("Legacy", "string", true),
        ],
        &["Id"],
    );
    // The minimal provider has no clustered indexes; keep the extracted
    // primary key in the shape the target model will want.
    if let Some(pk) = person.primary_key.as_mut() {
        pk.clustered = false;
    }
    let catalog = common::catalog(vec![person]);
    let old = DomainModel {
        types: vec![StoredType::entity("App.Person", "Person")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("Name", "string"))
            .with_field(StoredField::primitive("Legacy", "string").nullable())],
        generators: vec![],
    };
    let new = DomainModel {
        types: vec![StoredType::entity("App.Person", "Person")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("Name", "string"))],
        generators: vec![],
    };
    let hints = HintSet::new(vec![UpgradeHint::RemoveField {
        r#type: "App.Person".into(),
        field: "Legacy".into(),
    }]);

    let plan = common::plan_with(&catalog, &old, &new, hints, minimal_options()).unwrap();
    let cleanup = plan.operations.stage(UpgradeStage::Cleanup);

    let create = cleanup.iter().position(|op| {
        matches!(op, StructuralOperation::CreateTable { table }
            if table.name == "Person~1" && table.columns.len() == 2)
    });
    let copy = cleanup.iter().position(|op| {
        matches!(op, StructuralOperation::CopyData { target_table, .. }
            if target_table == "Tables/Person~1")
    });
    let remove = cleanup.iter().position(
        |op| matches!(op, StructuralOperation::RemoveTable { table } if table == "Person"),
    );
    let rename = cleanup.iter().position(|op| {
        matches!(op, StructuralOperation::RenameTable { old_name, new_name }
            if old_name == "Person~1" && new_name == "Person")
    });
    assert!(create.unwrap() < copy.unwrap());
    assert!(copy.unwrap() < remove.unwrap());
    assert!(remove.unwrap() < rename.unwrap());

    // No direct column drop slipped through.
    assert!(!cleanup
        .iter()
        .any(|op| matches!(op, StructuralOperation::RemoveColumn { .. })));
}

/// Full-text DDL runs outside the transaction when the provider cannot
/// run it inside one.
#[test]
fn full_text_creation_lands_in_the_non_transactional_epilogue() {
    let catalog = common::catalog(vec![common::table(
        "Article",
        &[("Id", "int64", false), ("Body", "string", false)],
        &["Id"],
    )]);
    let old = DomainModel {
        types: vec![StoredType::entity("App.Article", "Article")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("Body", "string"))],
        generators: vec![],
    };
    let mut article = StoredType::entity("App.Article", "Article")
        .with_field(StoredField::primitive("Id", "int64").key())
        .with_field(StoredField::primitive("Body", "string"));
    article.indexes.push(IndexDef {
        name: "FT_Article".into(),
        key_fields: vec!["Body".into()],
        include_fields: vec![],
        unique: false,
        filter: None,
        full_text: true,
        languages: vec![Some("english".into())],
    });
    let new = DomainModel {
        types: vec![article],
        generators: vec![],
    };

    // full() providers support full text but not transactionally.
    let plan = common::plan(&catalog, &old, &new, HintSet::default()).unwrap();

    assert!(plan
        .operations
        .non_transactional_epilogue
        .iter()
        .any(|op| matches!(op, StructuralOperation::CreateFullTextIndex { name, .. }
            if name == "FT_Article")));
    assert!(!plan
        .operations
        .stages()
        .any(|(_, ops)| ops
            .iter()
            .any(|op| matches!(op, StructuralOperation::CreateFullTextIndex { .. }))));
}

/// Deferrable-constraint providers bracket the whole run.
#[test]
fn constraint_bracketing_wraps_a_non_empty_plan() {
    let catalog = common::catalog(vec![common::table(
        "Person",
        &[("Id", "int64", false)],
        &["Id"],
    )]);
    let old = DomainModel {
        types: vec![StoredType::entity("App.Person", "Person")
            .with_field(StoredField::primitive("Id", "int64").key())],
        generators: vec![],
    };
    let new = DomainModel {
        types: vec![StoredType::entity("App.Person", "Person")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("Nick", "string").nullable())],
        generators: vec![],
    };

    let plan = common::plan(&catalog, &old, &new, HintSet::default()).unwrap();

    let first_stage = plan.operations.stage(UpgradeStage::ALL[0]);
    assert!(matches!(
        first_stage.first(),
        Some(StructuralOperation::DisableConstraints)
    ));
    let last_stage = plan
        .operations
        .stage(UpgradeStage::ALL[UpgradeStage::ALL.len() - 1]);
    assert!(matches!(
        last_stage.last(),
        Some(StructuralOperation::EnableConstraints)
    ));
}

/// An ignored table's foreign-key target is locked; removing it is
/// rejected with the blocking reason.
#[test]
fn locked_tables_cannot_be_removed() {
    let mut audit = common::table("TempAudit", &[("PersonId", "int64", false)], &[]);
    audit
        .foreign_keys
        .push(rust_schemaupgrade::builder::PhysicalForeignKey {
            name: "FK_TempAudit_Person".into(),
            columns: vec!["PersonId".into()],
            referenced_schema: None,
            referenced_table: "Person".into(),
            referenced_columns: vec!["Id".into()],
            on_delete: rust_schemaupgrade::model::ReferentialAction::NoAction,
        });
    let catalog = common::catalog(vec![
        common::table("Person", &[("Id", "int64", false)], &["Id"]),
        audit,
    ]);
    let old = DomainModel {
        types: vec![StoredType::entity("App.Person", "Person")
            .with_field(StoredField::primitive("Id", "int64").key())],
        generators: vec![],
    };
    let new = DomainModel::default();
    let hints = HintSet::new(vec![UpgradeHint::RemoveType {
        r#type: "App.Person".into(),
    }]);

    let options = UpgradeOptions {
        mapping: rust_schemaupgrade::builder::NodeMapping {
            ignored_tables: vec!["Temp*".into()],
            ..Default::default()
        },
        ..UpgradeOptions::default()
    };
    let result = common::plan_with(&catalog, &old, &new, hints, options);
    assert!(matches!(
        result,
        Err(rust_schemaupgrade::error::UpgradeError::LockedObject { .. })
    ));
}
