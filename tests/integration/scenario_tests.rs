//! End-to-end planning scenarios through the public pipeline

use rust_schemaupgrade::compare::{ActionKind, UpgradeStage};
use rust_schemaupgrade::domain::{DomainModel, InheritanceSchema, StoredField, StoredType};
use rust_schemaupgrade::error::UpgradeError;
use rust_schemaupgrade::hints::{HintSet, IdentityPair, UpgradeHint};
use rust_schemaupgrade::model::NodeKind;
use rust_schemaupgrade::translate::StructuralOperation;
use rust_schemaupgrade::{reconcile, UpgradeOptions};

use crate::common;

/// A renamed field produces exactly one column move, never a
/// remove-plus-create pair.
#[test]
fn renamed_field_becomes_a_single_column_move() {
    let catalog = common::catalog(vec![common::table(
        "T",
        &[("Id", "int64", false), ("A", "string", false)],
        &["Id"],
    )]);
    let old = DomainModel {
        types: vec![StoredType::entity("App.T", "T")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("A", "string"))],
        generators: vec![],
    };
    let new = DomainModel {
        types: vec![StoredType::entity("App.T", "T")
            .with_field(StoredField::primitive("Id", "int64").key())
            .with_field(StoredField::primitive("B", "string"))],
        generators: vec![],
    };
    let hints = HintSet::new(vec![UpgradeHint::RenameField {
        r#type: "App.T".into(),
        old_field: "A".into(),
        new_field: "B".into(),
    }]);

    let plan = common::plan(&catalog, &old, &new, hints).unwrap();

    assert!(plan
        .reconciled
        .schema_hints
        .renames
        .iter()
        .any(|r| r.source_path == "Tables/T/Columns/A" && r.target_path == "Tables/T/Columns/B"));

    let column_actions: Vec<_> = plan
        .actions
        .iter()
        .filter(|(_, a)| a.difference.kind == NodeKind::Column)
        .collect();
    assert_eq!(column_actions.len(), 1);
    assert!(matches!(
        &column_actions[0].1.kind,
        ActionKind::MoveNode { .. }
    ));

    let renames: Vec<_> = plan
        .operations
        .stage(UpgradeStage::Upgrade)
        .iter()
        .filter(|op| {
            matches!(op, StructuralOperation::RenameColumn { table, old_name, new_name }
                if table == "T" && old_name == "A" && new_name == "B")
        })
        .collect();
    assert_eq!(renames.len(), 1);
}

/// An old type with no counterpart and no hint is suspicious; its table
/// removal is rejected unless unsafe actions are allowed.
#[test]
fn unmatched_type_is_suspicious_and_its_removal_unsafe() {
    let catalog = common::catalog(vec![
        common::table("Kept", &[("Id", "int64", false)], &["Id"]),
        common::table("Gone", &[("Id", "int64", false)], &["Id"]),
    ]);
    let old = DomainModel {
        types: vec![
            StoredType::entity("App.Kept", "Kept")
                .with_field(StoredField::primitive("Id", "int64").key()),
            StoredType::entity("App.Gone", "Gone")
                .with_field(StoredField::primitive("Id", "int64").key()),
        ],
        generators: vec![],
    };
    let new = DomainModel {
        types: vec![StoredType::entity("App.Kept", "Kept")
            .with_field(StoredField::primitive("Id", "int64").key())],
        generators: vec![],
    };

    let reconciled = reconcile::process(
        &old,
        &new,
        &HintSet::default(),
        &reconcile::ReconcileOptions {
            auto_detect_types: false,
        },
    )
    .unwrap();
    assert_eq!(reconciled.suspicious_types, vec!["App.Gone"]);
    assert_eq!(reconciled.removed_types, vec!["App.Gone"]);

    let rejected = common::plan(&catalog, &old, &new, HintSet::default());
    assert!(matches!(
        rejected,
        Err(UpgradeError::UnsafeActionsRejected { .. })
    ));

    let plan = common::plan_unsafe(&catalog, &old, &new, HintSet::default()).unwrap();
    assert!(plan
        .operations
        .unsafe_operations
        .iter()
        .any(|d| d.contains("Tables/Gone")));
    assert!(plan
        .operations
        .stage(UpgradeStage::Cleanup)
        .iter()
        .any(|op| matches!(op, StructuralOperation::RemoveTable { table } if table == "Gone")));
}

fn cross_hierarchy_models() -> (DomainModel, DomainModel) {
    let old = DomainModel {
        types: vec![
            StoredType::entity("App.Base1", "T1")
                .with_hierarchy("App.Base1", InheritanceSchema::SingleTable)
                .with_type_id(1)
                .with_field(StoredField::primitive("Id", "int64").key())
                .with_field(StoredField::primitive("Name", "string")),
            StoredType::entity("App.Moved", "T1")
                .with_hierarchy("App.Base1", InheritanceSchema::SingleTable)
                .with_ancestor("App.Base1")
                .with_type_id(2)
                .with_field(StoredField::primitive("Petals", "string")),
        ],
        generators: vec![],
    };
    let new = DomainModel {
        types: vec![
            StoredType::entity("App.Base1", "T1")
                .with_hierarchy("App.Base1", InheritanceSchema::SingleTable)
                .with_type_id(1)
                .with_field(StoredField::primitive("Id", "int64").key())
                .with_field(StoredField::primitive("Name", "string")),
            StoredType::entity("App.Base2", "T2")
                .with_hierarchy("App.Base2", InheritanceSchema::SingleTable)
                .with_type_id(1)
                .with_field(StoredField::primitive("Id", "int64").key()),
            StoredType::entity("App.Moved", "T2")
                .with_hierarchy("App.Base2", InheritanceSchema::SingleTable)
                .with_ancestor("App.Base2")
                .with_type_id(2)
                .with_field(StoredField::primitive("Petals", "string")),
        ],
        generators: vec![],
    };
    (old, new)
}

/// A type moving between single-table hierarchies copies its rows out
/// first and deletes the originals only after the copy stage.
#[test]
fn cross_hierarchy_move_deletes_after_the_copy_stage() {
    let catalog = common::catalog(vec![common::table(
        "T1",
        &[
            ("Id", "int64", false),
            ("TypeId", "int32", false),
            ("Name", "string", false),
            ("Petals", "string", true),
        ],
        &["Id"],
    )]);
    let (old, new) = cross_hierarchy_models();
    let hints = HintSet::new(vec![UpgradeHint::CopyField {
        source_type: "App.Moved".into(),
        source_field: "Petals".into(),
        target_type: "App.Moved".into(),
        target_field: "Petals".into(),
    }]);

    let plan = common::plan_unsafe(&catalog, &old, &new, hints).unwrap();

    // The reconciler scoped the deletion to the moved type's rows and
    // deferred it past the copy.
    let delete = plan
        .reconciled
        .schema_hints
        .deletes
        .iter()
        .find(|d| d.table == "Tables/T1")
        .unwrap();
    assert!(delete.post_copy);
    assert!(delete.identity.iter().any(|p| matches!(
        p,
        IdentityPair::Constant { column, value } if column.ends_with("TypeId") && value == "2"
    )));

    assert!(plan
        .operations
        .stage(UpgradeStage::CopyData)
        .iter()
        .any(|op| matches!(op, StructuralOperation::CopyData { target_table, .. }
            if target_table == "Tables/T2")));
    assert!(plan
        .operations
        .stage(UpgradeStage::PostCopyData)
        .iter()
        .any(|op| matches!(op, StructuralOperation::DeleteData { table, .. }
            if table == "Tables/T1")));

    // Stage layout puts the copy strictly before the deferred delete.
    let stage_order: Vec<UpgradeStage> = plan.operations.stages().map(|(s, _)| s).collect();
    let copy_at = stage_order
        .iter()
        .position(|s| *s == UpgradeStage::CopyData)
        .unwrap();
    let delete_at = stage_order
        .iter()
        .position(|s| *s == UpgradeStage::PostCopyData)
        .unwrap();
    assert!(copy_at < delete_at);
}

/// Without native sequences, creations become generator tables and
/// alterations rebuild them around the live counter value.
#[test]
fn sequence_emulation_preserves_the_counter_value() {
    let catalog = common::catalog_with_sequences(
        vec![],
        vec![common::sequence("OrderGen", 1, 1, Some(41))],
    );
    let old = DomainModel::default();
    let mut new = DomainModel::default();
    new.generators.push(rust_schemaupgrade::domain::SequenceDef {
        name: "OrderGen".into(),
        start: 1,
        increment: 5,
    });
    new.generators.push(rust_schemaupgrade::domain::SequenceDef {
        name: "FreshGen".into(),
        start: 100,
        increment: 1,
    });

    let plan = common::plan_with(
        &catalog,
        &old,
        &new,
        HintSet::default(),
        UpgradeOptions {
            capabilities: common::no_sequence_caps(),
            ..UpgradeOptions::default()
        },
    )
    .unwrap();

    let upgrade = plan.operations.stage(UpgradeStage::Upgrade);

    // A brand-new generator starts at its declared start value.
    assert!(upgrade.iter().any(|op| matches!(
        op,
        StructuralOperation::CreateGeneratorTable { name, seed, .. }
            if name == "FreshGen" && *seed == 100
    )));

    // The altered one is rebuilt; its next value continues where the
    // extracted counter left off.
    let drop_at = upgrade.iter().position(|op| {
        matches!(op, StructuralOperation::DropGeneratorTable { name } if name == "OrderGen")
    });
    let create_at = upgrade.iter().position(|op| {
        matches!(
            op,
            StructuralOperation::CreateGeneratorTable { name, seed, increment, .. }
                if name == "OrderGen" && *seed == 46 && *increment == 5
        )
    });
    assert!(drop_at.unwrap() < create_at.unwrap());
}
