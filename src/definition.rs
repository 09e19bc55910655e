//! Declarative description of a graph schema: property keys, vertex and edge
//! labels, and composite indexes.
//!
//! A [`SchemaDefinition`] is only a value; [`crate::schema_manager::SchemaManager`]
//! is what applies it to a live graph.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EntityGraphError;

/// Identity property carried by every vertex and edge written through this crate.
pub const UUID_PROPERTY: &str = "uuid";

/// Index name convention, `"<Label>.<property>"`.
pub fn index_name(label: &str, property: &str) -> String {
    format!("{label}.{property}")
}

/// Edge label convention for a plain relation, `"<SourceLabel>#<TargetLabel>"`.
pub fn edge_label_name(source: &str, target: &str) -> String {
    format!("{source}#{target}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Long,
    Double,
    Boolean,
    /// RFC 3339 timestamp stored as text.
    Date,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "String",
            DataType::Long => "Long",
            DataType::Double => "Double",
            DataType::Boolean => "Boolean",
            DataType::Date => "Date",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "String" => Some(DataType::String),
            "Long" => Some(DataType::Long),
            "Double" => Some(DataType::Double),
            "Boolean" => Some(DataType::Boolean),
            "Date" => Some(DataType::Date),
            _ => None,
        }
    }

    /// Whether a single JSON value is a valid instance of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            DataType::String => value.is_string(),
            DataType::Long => value.is_i64() || value.is_u64(),
            DataType::Double => value.is_number(),
            DataType::Boolean => value.is_boolean(),
            DataType::Date => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[default]
    Single,
    Set,
    List,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Single => "SINGLE",
            Cardinality::Set => "SET",
            Cardinality::List => "LIST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SINGLE" => Some(Cardinality::Single),
            "SET" => Some(Cardinality::Set),
            "LIST" => Some(Cardinality::List),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    One2One,
    One2Many,
    Many2One,
    #[default]
    Many2Many,
}

impl Multiplicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Multiplicity::One2One => "ONE2ONE",
            Multiplicity::One2Many => "ONE2MANY",
            Multiplicity::Many2One => "MANY2ONE",
            Multiplicity::Many2Many => "MANY2MANY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ONE2ONE" => Some(Multiplicity::One2One),
            "ONE2MANY" => Some(Multiplicity::One2Many),
            "MANY2ONE" => Some(Multiplicity::Many2One),
            "MANY2MANY" => Some(Multiplicity::Many2Many),
            _ => None,
        }
    }

    /// An out-vertex may hold at most one edge of this label.
    pub fn single_out(&self) -> bool {
        matches!(self, Multiplicity::One2One | Multiplicity::Many2One)
    }

    /// An in-vertex may receive at most one edge of this label.
    pub fn single_in(&self) -> bool {
        matches!(self, Multiplicity::One2One | Multiplicity::One2Many)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Vertex,
    Edge,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "vertex" => Some(ElementKind::Vertex),
            "edge" => Some(ElementKind::Edge),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyKeyDef {
    pub name: String,
    pub data_type: DataType,
    pub cardinality: Cardinality,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexLabelDef {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLabelDef {
    pub name: String,
    pub multiplicity: Multiplicity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub element_kind: ElementKind,
    /// Property key names, in index key order.
    pub keys: Vec<String>,
    pub scope_label: Option<String>,
}

/// A validated schema, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub property_keys: Vec<PropertyKeyDef>,
    pub vertex_labels: Vec<VertexLabelDef>,
    pub edge_labels: Vec<EdgeLabelDef>,
    pub indexes: Vec<IndexDef>,
}

impl SchemaDefinition {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn property_key(&self, name: &str) -> Option<&PropertyKeyDef> {
        self.property_keys.iter().find(|key| key.name == name)
    }

    pub fn has_vertex_label(&self, name: &str) -> bool {
        self.vertex_labels.iter().any(|label| label.name == name)
    }

    pub fn has_edge_label(&self, name: &str) -> bool {
        self.edge_labels.iter().any(|label| label.name == name)
    }
}

/// Collects definitions and checks them as a whole in [`SchemaBuilder::build`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: SchemaDefinition,
}

impl SchemaBuilder {
    pub fn property_key(self, name: &str, data_type: DataType) -> Self {
        self.property_key_with(name, data_type, Cardinality::Single)
    }

    pub fn property_key_with(
        mut self,
        name: &str,
        data_type: DataType,
        cardinality: Cardinality,
    ) -> Self {
        self.schema.property_keys.push(PropertyKeyDef {
            name: name.to_string(),
            data_type,
            cardinality,
        });
        self
    }

    pub fn vertex_label(mut self, name: &str) -> Self {
        self.schema.vertex_labels.push(VertexLabelDef {
            name: name.to_string(),
        });
        self
    }

    pub fn edge_label(mut self, name: &str, multiplicity: Multiplicity) -> Self {
        self.schema.edge_labels.push(EdgeLabelDef {
            name: name.to_string(),
            multiplicity,
        });
        self
    }

    /// Single-key vertex index named `"<label>.<property>"`, scoped to `label`.
    pub fn vertex_index(self, label: &str, property: &str) -> Self {
        self.index(IndexDef {
            name: index_name(label, property),
            element_kind: ElementKind::Vertex,
            keys: vec![property.to_string()],
            scope_label: Some(label.to_string()),
        })
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.schema.indexes.push(index);
        self
    }

    pub fn build(self) -> Result<SchemaDefinition, EntityGraphError> {
        let schema = self.schema;
        let mut names = AHashSet::new();
        let all_names = schema
            .property_keys
            .iter()
            .map(|k| k.name.as_str())
            .chain(schema.vertex_labels.iter().map(|l| l.name.as_str()))
            .chain(schema.edge_labels.iter().map(|l| l.name.as_str()))
            .chain(schema.indexes.iter().map(|i| i.name.as_str()));
        for name in all_names {
            if name.trim().is_empty() {
                return Err(EntityGraphError::schema_definition(
                    "schema names must not be empty",
                ));
            }
            if !names.insert(name) {
                return Err(EntityGraphError::schema_definition(format!(
                    "duplicate schema name {name}"
                )));
            }
        }
        for index in &schema.indexes {
            validate_index(&schema, index)?;
        }
        Ok(schema)
    }
}

fn validate_index(schema: &SchemaDefinition, index: &IndexDef) -> Result<(), EntityGraphError> {
    if index.keys.is_empty() {
        return Err(EntityGraphError::schema_definition(format!(
            "index {} has no keys",
            index.name
        )));
    }
    for key in &index.keys {
        match schema.property_key(key) {
            Some(def) if def.cardinality == Cardinality::Single => {}
            Some(_) => {
                return Err(EntityGraphError::schema_definition(format!(
                    "index {} key {key} must have SINGLE cardinality",
                    index.name
                )));
            }
            None => {
                return Err(EntityGraphError::schema_definition(format!(
                    "index {} references undeclared key {key}",
                    index.name
                )));
            }
        }
    }
    if let Some(label) = &index.scope_label {
        let declared = match index.element_kind {
            ElementKind::Vertex => schema.has_vertex_label(label),
            ElementKind::Edge => schema.has_edge_label(label),
        };
        if !declared {
            return Err(EntityGraphError::schema_definition(format!(
                "index {} is scoped to undeclared {} label {label}",
                index.name,
                index.element_kind.as_str()
            )));
        }
    }
    Ok(())
}
