//! Connector (junction) type mapping (pipeline stage 4)
//!
//! Many-to-many association tables are paired by following their owning
//! field's mapping, never by name.

use log::debug;

use crate::domain::{DomainModel, TypeKind};
use crate::error::UpgradeError;
use crate::reconcile::{FieldRef, Mapping};

pub fn build(
    old: &DomainModel,
    new: &DomainModel,
    mapping: &mut Mapping,
) -> Result<(), UpgradeError> {
    let connectors: Vec<_> = old.connectors().map(|t| t.name.clone()).collect();
    for name in connectors {
        let Some(old_connector) = old.get(&name) else {
            continue;
        };
        let TypeKind::Connector {
            owner_type,
            owner_field,
        } = &old_connector.kind
        else {
            continue;
        };

        let Some(new_owner) = mapping.new_type_of(owner_type).map(str::to_string) else {
            debug!("connector {}: owner {} is unmapped", name, owner_type);
            continue;
        };
        let owner_ref = FieldRef::new(owner_type.clone(), owner_field.clone());
        let new_owner_field = mapping
            .new_field_of(&owner_ref)
            .map(|f| f.field.clone())
            // An unhinted same-named entity-set field still pairs.
            .unwrap_or_else(|| owner_field.clone());

        let Some(new_connector) = new.connectors().find(|t| {
            matches!(&t.kind, TypeKind::Connector { owner_type: ot, owner_field: of }
                if *ot == new_owner && *of == new_owner_field)
        }) else {
            debug!(
                "connector {}: no counterpart owned by {}.{}",
                name, new_owner, new_owner_field
            );
            continue;
        };

        mapping.map_type(&old_connector.name, &new_connector.name)?;

        // Master/slave key fields pair by name.
        for old_field in old_connector.fields.iter().filter(|f| f.is_primary_key) {
            if let Some(new_field) = new_connector
                .fields
                .iter()
                .find(|f| f.is_primary_key && f.name == old_field.name)
            {
                mapping.map_field(
                    FieldRef::new(&old_connector.name, &old_field.name),
                    FieldRef::new(&new_connector.name, &new_field.name),
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldValue, StoredField, StoredType};

    fn connector(name: &str, table: &str, owner_type: &str, owner_field: &str) -> StoredType {
        let mut t = StoredType::entity(name, table)
            .with_field(StoredField::primitive("Master", "int64").key())
            .with_field(StoredField::primitive("Slave", "int64").key());
        t.kind = TypeKind::Connector {
            owner_type: owner_type.to_string(),
            owner_field: owner_field.to_string(),
        };
        t
    }

    fn owner(name: &str, set_field: &str, connector_name: &str) -> StoredType {
        StoredType::entity(name, "Person").with_field(StoredField {
            name: set_field.into(),
            mapping_name: set_field.into(),
            original_name: None,
            value: FieldValue::EntitySet {
                connector_type: connector_name.into(),
            },
            is_primary_key: false,
            nullable: false,
            default_value: None,
            fields: vec![],
        })
    }

    #[test]
    fn connectors_follow_their_owning_field() {
        let old = DomainModel {
            types: vec![
                owner("App.Person", "Friends", "App.Person-Friends"),
                connector("App.Person-Friends", "Person-Friends", "App.Person", "Friends"),
            ],
            generators: vec![],
        };
        let new = DomainModel {
            types: vec![
                owner("App.Person", "Friends", "Person-Friends-Renamed"),
                connector("Person-Friends-Renamed", "FriendPairs", "App.Person", "Friends"),
            ],
            generators: vec![],
        };
        let mut mapping = Mapping::default();
        mapping.map_type("App.Person", "App.Person").unwrap();
        build(&old, &new, &mut mapping).unwrap();

        assert_eq!(
            mapping.new_type_of("App.Person-Friends"),
            Some("Person-Friends-Renamed")
        );
        assert!(mapping
            .new_field_of(&FieldRef::new("App.Person-Friends", "Master"))
            .is_some());
    }
}
