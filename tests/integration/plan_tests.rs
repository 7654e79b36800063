//! Pipeline-level properties of the upgrade planner

use pretty_assertions::assert_eq;

use rust_schemaupgrade::builder::PhysicalForeignKey;
use rust_schemaupgrade::compare::UpgradeStage;
use rust_schemaupgrade::domain::{DomainModel, StoredField, StoredType};
use rust_schemaupgrade::error::UpgradeError;
use rust_schemaupgrade::hints::{HintSet, UpgradeHint};
use rust_schemaupgrade::model::ReferentialAction;
use rust_schemaupgrade::translate::StructuralOperation;

use crate::common;

fn person_domain() -> DomainModel {
    DomainModel {
        types: vec![StoredType::entity("App.Person", "Person")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("Name", "string"))],
        generators: vec![],
    }
}

/// Comparing a catalog against the model it already matches plans nothing.
#[test]
fn matching_models_plan_nothing() {
    let catalog = common::catalog(vec![common::table(
        "Person",
        &[("Id", "int64", false), ("Name", "string", false)],
        &["Id"],
    )]);
    let domain = person_domain();

    let plan = common::plan(&catalog, &domain, &domain, HintSet::default()).unwrap();

    assert_eq!(plan.actions.len(), 0);
    assert!(plan.operations.is_empty());
    assert!(plan.operations.unsafe_operations.is_empty());
}

/// Two hints claiming the same target type abort before anything is
/// planned.
#[test]
fn conflicting_type_hints_are_fatal() {
    let catalog = common::catalog(vec![common::table(
        "Person",
        &[("Id", "int64", false), ("Name", "string", false)],
        &["Id"],
    )]);
    let old = DomainModel {
        types: vec![
            StoredType::entity("App.Person", "Person")
                .with_field(StoredField::primitive("Id", "int64").key()),
            StoredType::entity("App.Employee", "Employee")
                .with_field(StoredField::primitive("Id", "int64").key()),
        ],
        generators: vec![],
    };
    let new = DomainModel {
        types: vec![StoredType::entity("App.Member", "Member")
            .with_field(StoredField::primitive("Id", "int64").key())],
        generators: vec![],
    };
    let hints = HintSet::new(vec![
        UpgradeHint::RenameType {
            old_type: "App.Person".into(),
            new_type: "App.Member".into(),
        },
        UpgradeHint::RenameType {
            old_type: "App.Employee".into(),
            new_type: "App.Member".into(),
        },
    ]);

    let result = common::plan(&catalog, &old, &new, hints);
    assert!(matches!(result, Err(UpgradeError::HintConflict { .. })));
}

/// A remove-field hint is exactly what flips a column removal from
/// unsafe to sanctioned, and nothing else does.
#[test]
fn remove_field_hint_sanctions_the_column_removal() {
    let catalog = common::catalog(vec![common::table(
        "Person",
        &[
            ("Id", "int64", false),
            ("Name", "string", false),
            ("Legacy", "string", true),
        ],
        &["Id"],
    )]);
    let old = DomainModel {
        types: vec![StoredType::entity("App.Person", "Person")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("Name", "string"))
            .with_field(StoredField::primitive("Legacy", "string").nullable())],
        generators: vec![],
    };
    let new = person_domain();

    let unhinted = common::plan(&catalog, &old, &new, HintSet::default());
    assert!(matches!(
        unhinted,
        Err(UpgradeError::UnsafeActionsRejected { .. })
    ));

    let hints = HintSet::new(vec![UpgradeHint::RemoveField {
        r#type: "App.Person".into(),
        field: "Legacy".into(),
    }]);
    let plan = common::plan(&catalog, &old, &new, hints).unwrap();
    assert!(plan.operations.unsafe_operations.is_empty());
    assert!(plan
        .operations
        .stage(UpgradeStage::Cleanup)
        .iter()
        .any(|op| matches!(op, StructuralOperation::RemoveColumn { table, column }
            if table == "Person" && column == "Legacy")));
}

/// Dropping a referenced table detaches the foreign key during Prepare,
/// before the Cleanup-stage table removal.
#[test]
fn foreign_keys_are_detached_before_their_table_is_dropped() {
    let mut orders = common::table(
        "Orders",
        &[("Id", "int64", false), ("CustomerId", "int64", false)],
        &["Id"],
    );
    orders.foreign_keys.push(PhysicalForeignKey {
        name: "FK_Orders_Customer".to_string(),
        columns: vec!["CustomerId".to_string()],
        referenced_schema: None,
        referenced_table: "Customers".to_string(),
        referenced_columns: vec!["Id".to_string()],
        on_delete: ReferentialAction::NoAction,
    });
    let catalog = common::catalog(vec![
        orders,
        common::table("Customers", &[("Id", "int64", false)], &["Id"]),
    ]);

    let old = DomainModel {
        types: vec![
            StoredType::entity("App.Order", "Orders")
                .with_field(StoredField::primitive("Id", "int64").key())
                .with_field(StoredField::reference("CustomerId", "App.Customer")),
            StoredType::entity("App.Customer", "Customers")
                .with_field(StoredField::primitive("Id", "int64").key()),
        ],
        generators: vec![],
    };
    let new = DomainModel {
        types: vec![StoredType::entity("App.Order", "Orders")
            .with_field(StoredField::primitive("Id", "int64").key())],
        generators: vec![],
    };
    let hints = HintSet::new(vec![UpgradeHint::RemoveType {
        r#type: "App.Customer".into(),
    }]);

    let plan = common::plan_unsafe(&catalog, &old, &new, hints).unwrap();

    assert!(plan
        .operations
        .stage(UpgradeStage::Prepare)
        .iter()
        .any(|op| matches!(op, StructuralOperation::RemoveForeignKey { name, .. }
            if name == "FK_Orders_Customer")));
    assert!(plan
        .operations
        .stage(UpgradeStage::Cleanup)
        .iter()
        .any(|op| matches!(op, StructuralOperation::RemoveTable { table }
            if table == "Customers")));
}
