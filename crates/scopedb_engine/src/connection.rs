//! Connections: the unit that owns a transaction and runs statements.

use crate::error::{EngineError, EngineResult};
use crate::filter::{Assignments, Filter};
use crate::schema::Generation;
use crate::store::Store;
use crate::transaction::Transaction;
use crate::types::{ConnectionId, TransactionId};
use crate::value::Value;
use crate::Row;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A connection to a [`Store`].
///
/// Statements run inside the connection's transaction when one is active
/// and in their own single-statement transaction otherwise. Each statement
/// is atomic: it either applies in full or fails without changes.
///
/// Isolation is read committed: reads see rows committed by others plus the
/// connection's own uncommitted changes.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    store: Arc<Store>,
    txn: Option<Transaction>,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, store: Arc<Store>) -> Self {
        tracing::debug!(conn = %id, url = store.url(), "connection opened");
        Self {
            id,
            store,
            txn: None,
            closed: false,
        }
    }

    /// Returns the connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the store this connection is attached to.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns true if a transaction is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.txn.is_some()
    }

    /// Returns the active transaction's ID.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.txn.as_ref().map(Transaction::id)
    }

    // ========================================================================
    // Transaction control
    // ========================================================================

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// `TransactionActive` if one is already active.
    pub fn begin(&mut self) -> EngineResult<TransactionId> {
        self.ensure_open()?;
        if self.txn.is_some() {
            return Err(EngineError::TransactionActive);
        }
        let txn = self.store.begin_transaction();
        let id = txn.id();
        tracing::debug!(conn = %self.id, txid = %id, "begin");
        self.txn = Some(txn);
        Ok(id)
    }

    /// Commits the active transaction.
    ///
    /// The transaction ends whether or not the commit succeeds; a failed
    /// commit leaves the store unchanged.
    pub fn commit(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        let mut txn = self.txn.take().ok_or(EngineError::TransactionNotActive)?;
        let writes = txn.write_count();
        match self.store.apply(&txn) {
            Ok(()) => {
                txn.mark_committed();
                tracing::debug!(conn = %self.id, txid = %txn.id(), writes, "commit");
                Ok(())
            }
            Err(e) => {
                txn.mark_rolled_back();
                tracing::debug!(conn = %self.id, txid = %txn.id(), error = %e, "commit failed");
                Err(e)
            }
        }
    }

    /// Discards the active transaction.
    pub fn rollback(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        let mut txn = self.txn.take().ok_or(EngineError::TransactionNotActive)?;
        let writes = txn.write_count();
        txn.mark_rolled_back();
        tracing::debug!(conn = %self.id, txid = %txn.id(), writes, "rollback");
        Ok(())
    }

    /// Makes pending changes visible to this connection's later statements.
    ///
    /// Statements apply to the transaction's view immediately, so this only
    /// checks that the connection is usable.
    pub fn flush(&mut self) -> EngineResult<()> {
        self.ensure_open()
    }

    /// Closes the connection, rolling back any active transaction.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(mut txn) = self.txn.take() {
            tracing::debug!(conn = %self.id, txid = %txn.id(), "rollback on close");
            txn.mark_rolled_back();
        }
        self.closed = true;
        tracing::debug!(conn = %self.id, "connection closed");
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Returns the visible rows of `table` matching `filter`, in storage order.
    pub fn select(&self, table: &str, filter: &Filter) -> EngineResult<Vec<Row>> {
        self.ensure_open()?;
        let schema = self.store.table_schema(table)?;
        filter.validate(&schema)?;
        let mut rows = Vec::new();
        self.store.scan(table, self.txn.as_ref(), |_, row| {
            if filter.matches(row) {
                rows.push(row.clone());
            }
        })?;
        Ok(rows)
    }

    /// Counts the visible rows of `table` matching `filter`.
    pub fn count(&self, table: &str, filter: &Filter) -> EngineResult<usize> {
        self.ensure_open()?;
        let schema = self.store.table_schema(table)?;
        filter.validate(&schema)?;
        let mut count = 0usize;
        self.store.scan(table, self.txn.as_ref(), |_, row| {
            if filter.matches(row) {
                count += 1;
            }
        })?;
        Ok(count)
    }

    /// Inserts a row and returns it as stored, with generated values filled.
    ///
    /// Columns absent from `row` are stored as null. A null generated column
    /// receives its generated value.
    ///
    /// # Errors
    ///
    /// `UnknownColumn`, `TypeMismatch`, `NotNull` or `PrimaryKeyViolation`.
    pub fn insert(&mut self, table: &str, row: Row) -> EngineResult<Row> {
        let conn = self.id;
        self.with_write(|store, txn| {
            let schema = store.table_schema(table)?;
            for column in row.keys() {
                schema.require_column(column)?;
            }

            let mut row = row;
            let mut stored = Row::new();
            for column in &schema.columns {
                let mut value = row.remove(&column.name).unwrap_or(Value::Null);
                if value.is_null() {
                    if let Some(generation) = column.generation {
                        value = generate(store, table, generation)?;
                    }
                }
                if !column.ty.accepts(&value) {
                    return Err(EngineError::type_mismatch(
                        &column.name,
                        format!("cannot store {} value in {} column", value.type_name(), column.ty),
                    ));
                }
                if value.is_null() && (!column.nullable || column.name == schema.primary_key) {
                    return Err(EngineError::NotNull {
                        table: table.to_string(),
                        column: column.name.clone(),
                    });
                }
                stored.insert(column.name.clone(), column.ty.normalize(value));
            }

            let key = stored
                .get(&schema.primary_key)
                .cloned()
                .unwrap_or(Value::Null);
            let mut taken = false;
            store.scan(table, Some(&*txn), |_, existing| {
                if existing
                    .get(&schema.primary_key)
                    .is_some_and(|v| v.sql_eq(&key))
                {
                    taken = true;
                }
            })?;
            if taken {
                return Err(EngineError::PrimaryKeyViolation {
                    table: table.to_string(),
                    key: key.to_string(),
                });
            }

            let row_id = store.allocate_row_id();
            txn.record_insert(table, row_id, stored.clone())?;
            tracing::trace!(conn = %conn, table, row = %row_id, "insert");
            Ok(stored)
        })
    }

    /// Applies `assignments` to every visible row matching `filter`.
    /// Returns the number of rows changed.
    pub fn update(&mut self, table: &str, filter: &Filter, assignments: &Assignments) -> EngineResult<usize> {
        let conn = self.id;
        self.with_write(|store, txn| {
            let schema = store.table_schema(table)?;
            filter.validate(&schema)?;
            assignments.validate(&schema)?;

            let mut targets = Vec::new();
            store.scan(table, Some(&*txn), |id, row| {
                if filter.matches(row) {
                    let mut image = row.clone();
                    assignments.apply(&schema, &mut image);
                    targets.push((id, image));
                }
            })?;

            let count = targets.len();
            for (id, image) in targets {
                txn.record_update(table, id, image)?;
            }
            tracing::trace!(conn = %conn, table, count, "update");
            Ok(count)
        })
    }

    /// Deletes every visible row matching `filter`. Returns the number removed.
    pub fn delete(&mut self, table: &str, filter: &Filter) -> EngineResult<usize> {
        let conn = self.id;
        self.with_write(|store, txn| {
            let schema = store.table_schema(table)?;
            filter.validate(&schema)?;

            let mut targets = Vec::new();
            store.scan(table, Some(&*txn), |id, row| {
                if filter.matches(row) {
                    targets.push(id);
                }
            })?;

            let count = targets.len();
            for id in targets {
                txn.record_delete(table, id)?;
            }
            tracing::trace!(conn = %conn, table, count, "delete");
            Ok(count)
        })
    }

    /// Runs a write in the active transaction, or in its own autocommitted one.
    fn with_write<R>(
        &mut self,
        op: impl FnOnce(&Store, &mut Transaction) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.ensure_open()?;
        match self.txn.as_mut() {
            Some(txn) => op(&self.store, txn),
            None => {
                let mut txn = self.store.begin_transaction();
                let result = op(&self.store, &mut txn)?;
                self.store.apply(&txn)?;
                txn.mark_committed();
                Ok(result)
            }
        }
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed {
            Err(EngineError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn generate(store: &Store, table: &str, generation: Generation) -> EngineResult<Value> {
    Ok(match generation {
        Generation::Identity => Value::Int(store.next_identity(table)?),
        Generation::Uuid => Value::Uuid(Uuid::new_v4()),
        Generation::CreationTimestamp => Value::Timestamp(now_millis()),
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
