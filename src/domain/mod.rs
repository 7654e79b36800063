//! Domain model descriptors
//!
//! The reconciler works on opaque "stored type"/"stored field" descriptors
//! supplied by the persistent-entity mapping layer: enough structure to
//! resolve mappings and synthesize data hints, nothing more.

use serde::{Deserialize, Serialize};

use crate::model::ColumnType;

/// How a hierarchy lays its types out over physical tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InheritanceSchema {
    /// All types of the hierarchy share the root's table.
    SingleTable,
    /// Each type owns a table with its declared fields; rows are split
    /// across the ancestor chain.
    ClassTable,
    /// Each concrete type owns a table with all inherited fields.
    ConcreteTable,
}

/// Hierarchy membership of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyInfo {
    /// Name of the hierarchy root type.
    pub root: String,
    pub schema: InheritanceSchema,
}

/// What kind of thing a stored type is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Entity,
    /// Value type embedded into its owners; has no table of its own.
    Structure,
    /// Auxiliary many-to-many association type. Mapped by following its
    /// owning field, never by name.
    Connector {
        owner_type: String,
        owner_field: String,
    },
}

/// Resolved value of a stored field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Primitive(ColumnType),
    /// Reference to another entity; stored as the target's key column(s).
    Reference { target_type: String },
    /// Embedded structure; its fields are flattened into the owner table.
    Structure { structure_type: String },
    /// Many-to-many collection realized through a connector type.
    EntitySet { connector_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredField {
    pub name: String,
    /// Mapped column name (for primitive/reference leaves).
    pub mapping_name: String,
    /// Name of the property this field overrides, used as a pairing
    /// fallback when neither hint nor name matches.
    #[serde(default)]
    pub original_name: Option<String>,
    pub value: FieldValue,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    /// Nested fields of a structure-typed field.
    #[serde(default)]
    pub fields: Vec<StoredField>,
}

impl StoredField {
    pub fn primitive(name: impl Into<String>, base: impl Into<String>) -> Self {
        let name = name.into();
        StoredField {
            mapping_name: name.clone(),
            name,
            original_name: None,
            value: FieldValue::Primitive(ColumnType::new(base)),
            is_primary_key: false,
            nullable: false,
            default_value: None,
            fields: vec![],
        }
    }

    pub fn reference(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        let name = name.into();
        StoredField {
            mapping_name: name.clone(),
            name,
            original_name: None,
            value: FieldValue::Reference {
                target_type: target_type.into(),
            },
            is_primary_key: false,
            nullable: true,
            default_value: None,
            fields: vec![],
        }
    }

    pub fn key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn mapped_to(mut self, column: impl Into<String>) -> Self {
        self.mapping_name = column.into();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn overriding(mut self, original: impl Into<String>) -> Self {
        self.original_name = Some(original.into());
        self
    }

    /// Primitive leaves of this field, flattened depth-first. For a
    /// primitive or reference field that is the field itself.
    pub fn primitive_leaves<'a>(&'a self, out: &mut Vec<(String, &'a ColumnType)>, prefix: &str) {
        let qualified = if prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", prefix, self.name)
        };
        match &self.value {
            FieldValue::Primitive(ct) => out.push((qualified, ct)),
            FieldValue::Structure { .. } => {
                for nested in &self.fields {
                    nested.primitive_leaves(out, &qualified);
                }
            }
            FieldValue::Reference { .. } | FieldValue::EntitySet { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub include_fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Partial-index filter as a dialect-neutral boolean expression over
    /// this type's fields.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub full_text: bool,
    /// Full-text language configuration per key field, when `full_text`.
    #[serde(default)]
    pub languages: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredType {
    /// Namespace-qualified name, including closed generic arguments
    /// (`App.Pair<Int32,String>`).
    pub name: String,
    /// Mapped table name.
    pub mapping_name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub hierarchy: Option<HierarchyInfo>,
    /// Direct ancestor type, if any.
    #[serde(default)]
    pub ancestor: Option<String>,
    /// Open generic definition this type instantiates (`App.Pair<,>`).
    #[serde(default)]
    pub generic_definition: Option<String>,
    #[serde(default)]
    pub generic_arguments: Vec<String>,
    /// Discriminator value stored in the type-id column.
    #[serde(default)]
    pub type_id: Option<i64>,
    pub fields: Vec<StoredField>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    /// Collation applied to this type's string columns, if configured.
    #[serde(default)]
    pub collation: Option<String>,
}

impl StoredType {
    pub fn entity(name: impl Into<String>, mapping_name: impl Into<String>) -> Self {
        StoredType {
            name: name.into(),
            mapping_name: mapping_name.into(),
            kind: TypeKind::Entity,
            hierarchy: None,
            ancestor: None,
            generic_definition: None,
            generic_arguments: vec![],
            type_id: None,
            fields: vec![],
            indexes: vec![],
            collation: None,
        }
    }

    pub fn with_hierarchy(mut self, root: impl Into<String>, schema: InheritanceSchema) -> Self {
        self.hierarchy = Some(HierarchyInfo {
            root: root.into(),
            schema,
        });
        self
    }

    pub fn with_ancestor(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestor = Some(ancestor.into());
        self
    }

    pub fn with_field(mut self, field: StoredField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_type_id(mut self, id: i64) -> Self {
        self.type_id = Some(id);
        self
    }

    pub fn is_connector(&self) -> bool {
        matches!(self.kind, TypeKind::Connector { .. })
    }

    pub fn is_structure(&self) -> bool {
        matches!(self.kind, TypeKind::Structure)
    }

    pub fn field(&self, name: &str) -> Option<&StoredField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Simple name without namespace, still carrying generic arguments.
    pub fn short_name(&self) -> &str {
        let head_end = self.name.find('<').unwrap_or(self.name.len());
        match self.name[..head_end].rfind('.') {
            Some(dot) => &self.name[dot + 1..],
            None => &self.name,
        }
    }
}

/// A key generator backing a hierarchy, realized as a sequence (or a
/// generator table on providers without sequences).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDef {
    pub name: String,
    pub start: i64,
    pub increment: i64,
}

/// A full domain model: the flat set of stored types plus key generators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainModel {
    pub types: Vec<StoredType>,
    #[serde(default)]
    pub generators: Vec<SequenceDef>,
}

impl DomainModel {
    pub fn get(&self, name: &str) -> Option<&StoredType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &StoredType> {
        self.types
            .iter()
            .filter(|t| matches!(t.kind, TypeKind::Entity))
    }

    pub fn connectors(&self) -> impl Iterator<Item = &StoredType> {
        self.types.iter().filter(|t| t.is_connector())
    }

    /// Hierarchy root of a type; the type itself when it has no hierarchy.
    pub fn hierarchy_root<'a>(&'a self, t: &'a StoredType) -> &'a StoredType {
        t.hierarchy
            .as_ref()
            .and_then(|h| self.get(&h.root))
            .unwrap_or(t)
    }

    /// Ancestor chain of `t`, nearest first, not including `t`.
    pub fn ancestors<'a>(&'a self, t: &'a StoredType) -> Vec<&'a StoredType> {
        let mut out = Vec::new();
        let mut current = t;
        while let Some(ancestor) = current.ancestor.as_ref().and_then(|a| self.get(a)) {
            out.push(ancestor);
            current = ancestor;
        }
        out
    }

    pub fn is_ancestor_of(&self, ancestor: &StoredType, descendant: &StoredType) -> bool {
        self.ancestors(descendant)
            .iter()
            .any(|a| a.name == ancestor.name)
    }

    /// Key fields of a type: the hierarchy root's primary-key fields.
    pub fn key_fields<'a>(&'a self, t: &'a StoredType) -> Vec<&'a StoredField> {
        let root = self.hierarchy_root(t);
        root.fields.iter().filter(|f| f.is_primary_key).collect()
    }

    /// Name of the physical table the type's own rows map to, if any.
    pub fn mapped_table<'a>(&'a self, t: &'a StoredType) -> Option<&'a str> {
        if t.is_structure() {
            return None;
        }
        match t.hierarchy.as_ref().map(|h| h.schema) {
            Some(InheritanceSchema::SingleTable) => {
                Some(self.hierarchy_root(t).mapping_name.as_str())
            }
            _ => Some(t.mapping_name.as_str()),
        }
    }

    /// Physical tables that hold (parts of) this type's rows.
    pub fn tables_holding<'a>(&'a self, t: &'a StoredType) -> Vec<&'a str> {
        match t.hierarchy.as_ref().map(|h| h.schema) {
            Some(InheritanceSchema::SingleTable) => {
                vec![self.hierarchy_root(t).mapping_name.as_str()]
            }
            Some(InheritanceSchema::ClassTable) => {
                let mut tables = vec![t.mapping_name.as_str()];
                for ancestor in self.ancestors(t) {
                    tables.push(ancestor.mapping_name.as_str());
                }
                tables
            }
            Some(InheritanceSchema::ConcreteTable) | None => vec![t.mapping_name.as_str()],
        }
    }
}
