//! Registered entity metadata.
//!
//! An [`EntityMeta`] is built once per entity when the session factory is
//! (re)built. Descriptor problems surface there, not at query time.

use crate::entity::{EntityDescriptor, PropertyDef, PropertyValues};
use crate::error::{CoreError, CoreResult};
use scopedb_engine::{ColumnDef, ColumnType, EngineError, EngineResult, Row, TableSchema, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Converts a predicate literal to the representation its column stores.
pub type Coercion = fn(&str, Value) -> EngineResult<Value>;

fn identity(_column: &str, value: Value) -> EngineResult<Value> {
    Ok(value)
}

/// Parses textual identifiers; other values pass through for the engine to
/// type-check.
fn parse_uuid(column: &str, value: Value) -> EngineResult<Value> {
    match value {
        Value::Text(text) => Uuid::parse_str(&text)
            .map(Value::Uuid)
            .map_err(|e| EngineError::invalid_literal(column, e.to_string())),
        other => Ok(other),
    }
}

fn coercion_for(ty: ColumnType) -> Coercion {
    match ty {
        ColumnType::Uuid => parse_uuid,
        _ => identity,
    }
}

/// Metadata of one mapped property.
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    /// The declared property.
    pub def: PropertyDef,
    coercion: Coercion,
}

impl PropertyMeta {
    /// Coerces a literal compared against this property.
    pub fn coerce(&self, value: Value) -> EngineResult<Value> {
        (self.coercion)(&self.def.column, value)
    }
}

/// Validated metadata of a registered entity.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    name: String,
    table: String,
    id: usize,
    properties: Vec<PropertyMeta>,
}

impl EntityMeta {
    /// Validates a descriptor and derives the metadata.
    ///
    /// # Errors
    ///
    /// `InvalidEntity` unless there is exactly one id property and property
    /// and column names are unique.
    pub fn from_descriptor(descriptor: &EntityDescriptor) -> CoreResult<Self> {
        let name = &descriptor.name;
        if descriptor.table.is_empty() {
            return Err(CoreError::invalid_entity(name, "table name is empty"));
        }
        if descriptor.properties.is_empty() {
            return Err(CoreError::invalid_entity(name, "no properties"));
        }

        let ids: Vec<usize> = descriptor
            .properties
            .iter()
            .enumerate()
            .filter(|(_, p)| p.id)
            .map(|(i, _)| i)
            .collect();
        let id = match ids.as_slice() {
            [id] => *id,
            [] => return Err(CoreError::invalid_entity(name, "no id property")),
            _ => return Err(CoreError::invalid_entity(name, "more than one id property")),
        };

        let mut properties = HashSet::new();
        let mut columns = HashSet::new();
        for p in &descriptor.properties {
            if !properties.insert(p.property.as_str()) {
                return Err(CoreError::invalid_entity(
                    name,
                    format!("duplicate property {}", p.property),
                ));
            }
            if !columns.insert(p.column.as_str()) {
                return Err(CoreError::invalid_entity(
                    name,
                    format!("duplicate column {}", p.column),
                ));
            }
        }

        let meta = Self {
            name: name.clone(),
            table: descriptor.table.clone(),
            id,
            properties: descriptor
                .properties
                .iter()
                .map(|def| PropertyMeta {
                    coercion: coercion_for(def.ty),
                    def: def.clone(),
                })
                .collect(),
        };
        meta.table_schema()
            .validate()
            .map_err(|e| CoreError::invalid_entity(name, e.to_string()))?;
        Ok(meta)
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the identifier property.
    #[must_use]
    pub fn id(&self) -> &PropertyMeta {
        &self.properties[self.id]
    }

    /// Returns all properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyMeta] {
        &self.properties
    }

    /// Returns the non-identifier properties in declaration order.
    pub fn data_properties(&self) -> impl Iterator<Item = &PropertyMeta> {
        self.properties.iter().filter(|p| !p.def.id)
    }

    /// Looks up a property by property name.
    #[must_use]
    pub fn property(&self, property: &str) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| p.def.property == property)
    }

    /// The table definition this entity maps to.
    #[must_use]
    pub fn table_schema(&self) -> TableSchema {
        let mut schema = TableSchema::new(&self.table, &self.id().def.column);
        for p in &self.properties {
            let mut column = ColumnDef::new(&p.def.column, p.def.ty).nullable(p.def.nullable);
            if let Some(generation) = p.def.generation {
                column = column.generated(generation);
            }
            schema = schema.with_column(column);
        }
        schema
    }

    /// Converts property values to a row keyed by column.
    #[must_use]
    pub fn to_row(&self, mut values: PropertyValues) -> Row {
        self.properties
            .iter()
            .map(|p| (p.def.column.clone(), values.take(&p.def.property)))
            .collect()
    }

    /// Converts a stored row back to property values.
    #[must_use]
    pub fn from_row(&self, mut row: Row) -> PropertyValues {
        let mut values = PropertyValues::new();
        for p in &self.properties {
            values.set(
                p.def.property.clone(),
                row.remove(&p.def.column).unwrap_or(Value::Null),
            );
        }
        values
    }
}
