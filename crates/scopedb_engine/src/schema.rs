//! Table definitions.

use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Opaque unique identifier.
    Uuid,
    /// Epoch milliseconds.
    Timestamp,
    /// Raw bytes.
    Bytes,
}

impl ColumnType {
    /// Returns true if a value of this shape may be stored in the column.
    ///
    /// `Null` is accepted by every type; nullability is checked separately.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_) | Value::Int(_))
                | (ColumnType::Text, Value::Text(_))
                | (ColumnType::Uuid, Value::Uuid(_))
                | (ColumnType::Timestamp, Value::Timestamp(_) | Value::Int(_))
                | (ColumnType::Bytes, Value::Bytes(_))
        )
    }

    /// Converts an accepted value to the column's canonical representation.
    #[must_use]
    pub fn normalize(self, value: Value) -> Value {
        match (self, value) {
            (ColumnType::Float, Value::Int(i)) => Value::Float(i as f64),
            (ColumnType::Timestamp, Value::Int(i)) => Value::Timestamp(i),
            (_, value) => value,
        }
    }

    /// Returns true if the column supports ordered numeric comparison.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Int | ColumnType::Float | ColumnType::Timestamp
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "BOOLEAN",
            ColumnType::Int => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Text => "VARCHAR",
            ColumnType::Uuid => "UUID",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Bytes => "BLOB",
        };
        f.write_str(name)
    }
}

/// How the engine fills a column left null on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generation {
    /// Next value of the table's identity sequence. Never rolled back.
    Identity,
    /// A random (v4) identifier.
    Uuid,
    /// The wall-clock time of the insert.
    CreationTimestamp,
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub ty: ColumnType,
    /// Whether `Null` may be stored.
    pub nullable: bool,
    /// Value generation on insert, if any.
    pub generation: Option<Generation>,
}

impl ColumnDef {
    /// Creates a nullable, non-generated column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            generation: None,
        }
    }

    /// Sets nullability.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Sets value generation.
    #[must_use]
    pub fn generated(mut self, generation: Generation) -> Self {
        self.generation = Some(generation);
        self
    }
}

/// A table definition: ordered columns plus a single-column primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Name of the primary key column.
    pub primary_key: String,
}

impl TableSchema {
    /// Creates an empty table definition.
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: primary_key.into(),
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column by name, failing with `UnknownColumn`.
    pub fn require_column(&self, name: &str) -> EngineResult<&ColumnDef> {
        self.column(name)
            .ok_or_else(|| EngineError::unknown_column(&self.name, name))
    }

    /// Returns the primary key column definition.
    pub fn primary_key_column(&self) -> EngineResult<&ColumnDef> {
        self.require_column(&self.primary_key)
    }

    /// Checks structural invariants.
    pub fn validate(&self) -> EngineResult<()> {
        if self.name.is_empty() {
            return Err(EngineError::invalid_schema("", "table name is empty"));
        }
        if self.columns.is_empty() {
            return Err(EngineError::invalid_schema(&self.name, "no columns"));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(EngineError::invalid_schema(
                    &self.name,
                    format!("duplicate column {}", column.name),
                ));
            }
        }
        let pk = self.column(&self.primary_key).ok_or_else(|| {
            EngineError::invalid_schema(
                &self.name,
                format!("primary key {} is not a column", self.primary_key),
            )
        })?;
        if pk.generation == Some(Generation::Identity) && pk.ty != ColumnType::Int {
            return Err(EngineError::invalid_schema(
                &self.name,
                "identity generation requires an integer column",
            ));
        }
        for column in &self.columns {
            let type_ok = match column.generation {
                Some(Generation::Identity) => column.ty == ColumnType::Int,
                Some(Generation::Uuid) => column.ty == ColumnType::Uuid,
                Some(Generation::CreationTimestamp) => column.ty == ColumnType::Timestamp,
                None => true,
            };
            if !type_ok {
                return Err(EngineError::invalid_schema(
                    &self.name,
                    format!("generation does not match type of column {}", column.name),
                ));
            }
        }
        Ok(())
    }

    /// Returns the columns of `self` missing from `existing`.
    ///
    /// Fails if a shared column changed type or the primary key moved; such
    /// changes need a drop and re-create.
    pub fn added_columns(&self, existing: &TableSchema) -> EngineResult<Vec<ColumnDef>> {
        if self.primary_key != existing.primary_key {
            return Err(EngineError::TableExists {
                table: self.name.clone(),
            });
        }
        let mut added = Vec::new();
        for column in &self.columns {
            match existing.column(&column.name) {
                Some(current) if current.ty != column.ty => {
                    return Err(EngineError::TableExists {
                        table: self.name.clone(),
                    })
                }
                Some(_) => {}
                None => added.push(column.clone()),
            }
        }
        Ok(added)
    }
}
