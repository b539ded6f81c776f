//! Committed table contents.

use crate::schema::{Generation, TableSchema};
use crate::types::RowId;
use crate::value::Value;
use crate::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A table as last committed: definition, rows and identity sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Table {
    pub(crate) schema: TableSchema,
    pub(crate) rows: BTreeMap<RowId, Row>,
    /// Next value handed out for an identity column.
    pub(crate) next_identity: i64,
}

impl Table {
    pub(crate) fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_identity: 1,
        }
    }

    /// Allocates the next identity value. Allocation is not undone by rollback.
    pub(crate) fn allocate_identity(&mut self) -> i64 {
        let value = self.next_identity;
        self.next_identity += 1;
        value
    }

    /// Moves the identity sequence past an explicitly supplied key.
    pub(crate) fn observe_identity(&mut self, row: &Row) {
        let Some(column) = self
            .schema
            .columns
            .iter()
            .find(|c| c.generation == Some(Generation::Identity))
        else {
            return;
        };
        if let Some(Value::Int(v)) = row.get(&column.name) {
            if *v >= self.next_identity {
                self.next_identity = v.saturating_add(1);
            }
        }
    }

    /// Finds a committed row by primary key value.
    pub(crate) fn find_by_key(&self, key: &Value) -> Option<RowId> {
        let pk = &self.schema.primary_key;
        self.rows
            .iter()
            .find(|(_, row)| row.get(pk).is_some_and(|v| v.sql_eq(key)))
            .map(|(id, _)| *id)
    }

    /// Adds the columns in `added` to the definition, back-filling nulls.
    pub(crate) fn extend_schema(&mut self, schema: TableSchema, added: &[String]) {
        for row in self.rows.values_mut() {
            for column in added {
                row.entry(column.clone()).or_insert(Value::Null);
            }
        }
        self.schema = schema;
    }
}
