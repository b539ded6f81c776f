//! Entity mapping: how an application type maps to a table.

use crate::error::{CoreError, CoreResult};
use scopedb_engine::{ColumnType, Generation, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Trait for application types persisted through ScopeDB.
///
/// Implementors describe their table once in [`descriptor`](Entity::descriptor)
/// and convert to and from property values.
///
/// # Example
///
/// ```rust
/// use scopedb_core::{ColumnType, CoreResult, Entity, EntityDescriptor, Generation, PropertyDef, PropertyValues};
///
/// struct Note {
///     id: Option<i64>,
///     body: String,
/// }
///
/// impl Entity for Note {
///     fn descriptor() -> EntityDescriptor {
///         EntityDescriptor::new("Note", "NOTES")
///             .property(PropertyDef::new("id", ColumnType::Int).id().generated(Generation::Identity))
///             .property(PropertyDef::new("body", ColumnType::Text).column("BODY_TEXT"))
///     }
///
///     fn to_values(&self) -> PropertyValues {
///         PropertyValues::new().with("id", self.id).with("body", self.body.as_str())
///     }
///
///     fn from_values(values: PropertyValues) -> CoreResult<Self> {
///         Ok(Self {
///             id: values.opt_int("id")?,
///             body: values.text("body")?,
///         })
///     }
/// }
/// ```
pub trait Entity: Sized + Send + 'static {
    /// Describes the entity's table and properties.
    fn descriptor() -> EntityDescriptor;

    /// Returns the entity's property values, keyed by property name.
    ///
    /// Generated properties that have not been assigned yet are `Null`.
    fn to_values(&self) -> PropertyValues;

    /// Rebuilds an entity from property values read from storage.
    fn from_values(values: PropertyValues) -> CoreResult<Self>;
}

/// One mapped property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    /// Property name as used by the application.
    pub property: String,
    /// Column name in the table.
    pub column: String,
    /// Column type.
    pub ty: ColumnType,
    /// Whether the property may be null.
    pub nullable: bool,
    /// How the engine fills the column on insert, if at all.
    pub generation: Option<Generation>,
    /// Whether this is the identifier property.
    pub id: bool,
}

impl PropertyDef {
    /// Creates a nullable property stored in a column of the same name.
    pub fn new(property: impl Into<String>, ty: ColumnType) -> Self {
        let property = property.into();
        Self {
            column: property.clone(),
            property,
            ty,
            nullable: true,
            generation: None,
            id: false,
        }
    }

    /// Stores the property in a differently named column.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this as the identifier property. Identifiers are not nullable.
    #[must_use]
    pub fn id(mut self) -> Self {
        self.id = true;
        self.nullable = false;
        self
    }

    /// Sets nullability.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Lets the engine generate the value on insert.
    #[must_use]
    pub fn generated(mut self, generation: Generation) -> Self {
        self.generation = Some(generation);
        self
    }
}

/// Static description of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity name, used in logs and errors.
    pub name: String,
    /// Table name.
    pub table: String,
    /// Properties in declaration order.
    pub properties: Vec<PropertyDef>,
}

impl EntityDescriptor {
    /// Creates a descriptor with no properties.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            properties: Vec::new(),
        }
    }

    /// Appends a property.
    #[must_use]
    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Returns the identifier property, if one is declared.
    #[must_use]
    pub fn id_property(&self) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.id)
    }
}

/// Property values of one entity, keyed by property name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyValues {
    values: BTreeMap<String, Value>,
}

impl PropertyValues {
    /// Creates an empty set of values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, builder style.
    #[must_use]
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(property, value);
        self
    }

    /// Sets a value.
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(property.into(), value.into());
    }

    /// Returns a value, if present.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Removes and returns a value. Absent values come back as `Null`.
    pub fn take(&mut self, property: &str) -> Value {
        self.values.remove(property).unwrap_or(Value::Null)
    }

    /// Iterates over the values in property-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a required text property.
    pub fn text(&self, property: &str) -> CoreResult<String> {
        required(property, self.opt_text(property)?)
    }

    /// Returns an optional text property.
    pub fn opt_text(&self, property: &str) -> CoreResult<Option<String>> {
        self.typed(property, "text", |v| v.as_text().map(str::to_string))
    }

    /// Returns a required integer property.
    pub fn int(&self, property: &str) -> CoreResult<i64> {
        required(property, self.opt_int(property)?)
    }

    /// Returns an optional integer property.
    pub fn opt_int(&self, property: &str) -> CoreResult<Option<i64>> {
        self.typed(property, "int", Value::as_int)
    }

    /// Returns a required float property.
    pub fn float(&self, property: &str) -> CoreResult<f64> {
        required(property, self.opt_float(property)?)
    }

    /// Returns an optional float property.
    pub fn opt_float(&self, property: &str) -> CoreResult<Option<f64>> {
        self.typed(property, "float", Value::as_float)
    }

    /// Returns a required boolean property.
    pub fn bool(&self, property: &str) -> CoreResult<bool> {
        required(property, self.typed(property, "bool", Value::as_bool)?)
    }

    /// Returns a required identifier property.
    pub fn uuid(&self, property: &str) -> CoreResult<Uuid> {
        required(property, self.opt_uuid(property)?)
    }

    /// Returns an optional identifier property.
    pub fn opt_uuid(&self, property: &str) -> CoreResult<Option<Uuid>> {
        self.typed(property, "uuid", Value::as_uuid)
    }

    /// Returns an optional timestamp property as epoch milliseconds.
    pub fn opt_timestamp(&self, property: &str) -> CoreResult<Option<i64>> {
        self.typed(property, "timestamp", Value::as_timestamp)
    }

    fn typed<T>(
        &self,
        property: &str,
        expected: &str,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> CoreResult<Option<T>> {
        match self.values.get(property) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => extract(value).map(Some).ok_or_else(|| {
                CoreError::mapping(
                    property,
                    format!("expected {expected}, found {}", value.type_name()),
                )
            }),
        }
    }
}

impl From<BTreeMap<String, Value>> for PropertyValues {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

fn required<T>(property: &str, value: Option<T>) -> CoreResult<T> {
    value.ok_or_else(|| CoreError::mapping(property, "missing value"))
}
