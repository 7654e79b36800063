//! Tests for the JSON hint format the CLI consumes

use pretty_assertions::assert_eq;

use rust_schemaupgrade::hints::{HintSet, SchemaHintSet, RenameHint, UpgradeHint};

#[test]
fn hint_file_deserializes_every_variant() {
    let json = r#"{
        "hints": [
            { "RenameType": { "old_type": "App.Person", "new_type": "App.Member" } },
            { "RemoveType": { "type": "App.Legacy" } },
            { "RenameField": { "type": "App.Member", "old_field": "Name", "new_field": "FullName" } },
            { "RemoveField": { "type": "App.Person", "field": "Fax" } },
            { "ChangeFieldType": { "type": "App.Member", "field": "Zip" } },
            { "CopyField": { "source_type": "App.Person", "source_field": "Nick",
                             "target_type": "App.Member", "target_field": "Alias" } },
            { "MoveField": { "source_type": "App.Person", "source_field": "Phone",
                             "target_type": "App.Contact" } }
        ]
    }"#;
    let set: HintSet = serde_json::from_str(json).unwrap();
    assert_eq!(set.hints.len(), 7);
    assert!(matches!(
        &set.hints[0],
        UpgradeHint::RenameType { old_type, .. } if old_type == "App.Person"
    ));
    assert!(matches!(
        &set.hints[1],
        UpgradeHint::RemoveType { r#type } if r#type == "App.Legacy"
    ));
    assert!(matches!(&set.hints[6], UpgradeHint::MoveField { .. }));
}

#[test]
fn hint_sets_round_trip_through_json() {
    let set = HintSet::new(vec![UpgradeHint::CopyField {
        source_type: "App.A".into(),
        source_field: "X".into(),
        target_type: "App.B".into(),
        target_field: "Y".into(),
    }]);
    let text = serde_json::to_string(&set).unwrap();
    let back: HintSet = serde_json::from_str(&text).unwrap();
    assert_eq!(set.hints, back.hints);
}

// The CLI reads hint files from disk; make sure a file written the way a
// user would write it loads cleanly.
#[test]
fn hint_file_on_disk_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hints.json");
    std::fs::write(
        &path,
        r#"{ "hints": [ { "RemoveType": { "type": "App.Legacy" } } ] }"#,
    )
    .unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let set: HintSet = serde_json::from_str(&text).unwrap();
    assert!(set.remove_type("App.Legacy"));
}

#[test]
fn rename_lookup_works_in_both_directions() {
    let mut set = SchemaHintSet::default();
    set.renames.push(RenameHint {
        source_path: "Tables/Old".into(),
        target_path: "Tables/New".into(),
    });
    assert_eq!(set.rename_target("Tables/Old"), Some("Tables/New"));
    assert_eq!(set.rename_source("Tables/New"), Some("Tables/Old"));
    assert_eq!(set.rename_target("Tables/New"), None);
    assert_eq!(set.len(), 1);
}
