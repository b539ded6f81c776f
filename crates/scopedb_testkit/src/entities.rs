//! Reference entities.

use scopedb_core::{
    ColumnType, CoreResult, Entity, EntityDescriptor, Generation, PropertyDef, PropertyValues,
    Value,
};
use uuid::Uuid;

/// An entity whose identity, identifier and creation timestamp are generated
/// by the store. Stored in table `TIMEKEEPER`; the `dateTime` property maps
/// to column `timestamp`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestEntity {
    /// Identity, assigned on insert.
    pub id: Option<i64>,
    /// Random identifier, assigned on insert unless set.
    pub uuid: Option<Uuid>,
    /// Creation time in epoch milliseconds, assigned on insert.
    pub date_time: Option<i64>,
    /// Free-form label.
    pub test: Option<String>,
}

impl TestEntity {
    /// Creates an unsaved entity with the given label.
    pub fn new(test: &str) -> Self {
        Self {
            test: Some(test.to_string()),
            ..Self::default()
        }
    }

    /// Sets the identifier.
    #[must_use]
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }
}

impl Entity for TestEntity {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("TestEntity", "TIMEKEEPER")
            .property(
                PropertyDef::new("id", ColumnType::Int)
                    .id()
                    .generated(Generation::Identity),
            )
            .property(PropertyDef::new("uuid", ColumnType::Uuid).generated(Generation::Uuid))
            .property(
                PropertyDef::new("dateTime", ColumnType::Timestamp)
                    .column("timestamp")
                    .generated(Generation::CreationTimestamp),
            )
            .property(PropertyDef::new("test", ColumnType::Text))
    }

    fn to_values(&self) -> PropertyValues {
        PropertyValues::new()
            .with("id", self.id)
            .with("uuid", self.uuid)
            .with("dateTime", self.date_time.map_or(Value::Null, Value::Timestamp))
            .with("test", self.test.clone())
    }

    fn from_values(values: PropertyValues) -> CoreResult<Self> {
        Ok(Self {
            id: values.opt_int("id")?,
            uuid: values.opt_uuid("uuid")?,
            date_time: values.opt_timestamp("dateTime")?,
            test: values.opt_text("test")?,
        })
    }
}

/// An entity with a caller-assigned key and two identifier columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TestTable {
    /// Primary key.
    pub id: i64,
    /// Free-form label.
    pub string: String,
    /// First identifier.
    pub uuid: Uuid,
    /// Second identifier, stored in column `uuid_indexed`.
    pub uuid_indexed: Uuid,
}

impl TestTable {
    /// Creates a row with random identifiers.
    pub fn new(id: i64, string: &str) -> Self {
        Self {
            id,
            string: string.to_string(),
            uuid: Uuid::new_v4(),
            uuid_indexed: Uuid::new_v4(),
        }
    }
}

impl Entity for TestTable {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("TestTable", "TEST_TABLE")
            .property(PropertyDef::new("id", ColumnType::Int).id())
            .property(PropertyDef::new("string", ColumnType::Text).nullable(false))
            .property(PropertyDef::new("uuid", ColumnType::Uuid).nullable(false))
            .property(
                PropertyDef::new("uuidIndexed", ColumnType::Uuid)
                    .column("uuid_indexed")
                    .nullable(false),
            )
    }

    fn to_values(&self) -> PropertyValues {
        PropertyValues::new()
            .with("id", self.id)
            .with("string", self.string.as_str())
            .with("uuid", self.uuid)
            .with("uuidIndexed", self.uuid_indexed)
    }

    fn from_values(values: PropertyValues) -> CoreResult<Self> {
        Ok(Self {
            id: values.int("id")?,
            string: values.text("string")?,
            uuid: values.uuid("uuid")?,
            uuid_indexed: values.uuid("uuidIndexed")?,
        })
    }
}
