//! Transaction state.
//!
//! A transaction buffers its changes per table as a delta over the committed
//! rows. Reads inside the transaction see the committed rows overlaid with
//! the delta; other connections only see the delta once it is applied by
//! [`Store::apply`](crate::Store).

use crate::error::{EngineError, EngineResult};
use crate::types::{RowId, TransactionId};
use crate::Row;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// Uncommitted changes to one table.
#[derive(Debug, Clone, Default)]
pub(crate) struct TableDelta {
    /// Rows created by this transaction.
    pub(crate) inserted: BTreeMap<RowId, Row>,
    /// New images of committed rows.
    pub(crate) updated: BTreeMap<RowId, Row>,
    /// Committed rows removed by this transaction.
    pub(crate) deleted: BTreeSet<RowId>,
}

impl TableDelta {
    pub(crate) fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// An open transaction on a connection.
#[derive(Debug)]
pub(crate) struct Transaction {
    id: TransactionId,
    state: TransactionState,
    deltas: HashMap<String, TableDelta>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            deltas: HashMap::new(),
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn delta(&self, table: &str) -> Option<&TableDelta> {
        self.deltas.get(table)
    }

    pub(crate) fn deltas(&self) -> impl Iterator<Item = (&String, &TableDelta)> {
        self.deltas.iter().filter(|(_, d)| !d.is_empty())
    }

    /// Returns the number of row changes buffered.
    pub(crate) fn write_count(&self) -> usize {
        self.deltas
            .values()
            .map(|d| d.inserted.len() + d.updated.len() + d.deleted.len())
            .sum()
    }

    pub(crate) fn record_insert(&mut self, table: &str, id: RowId, row: Row) -> EngineResult<()> {
        self.ensure_active()?;
        self.delta_mut(table).inserted.insert(id, row);
        Ok(())
    }

    /// Records a new image for a row, whether committed or inserted earlier.
    pub(crate) fn record_update(&mut self, table: &str, id: RowId, row: Row) -> EngineResult<()> {
        self.ensure_active()?;
        let delta = self.delta_mut(table);
        if let Some(existing) = delta.inserted.get_mut(&id) {
            *existing = row;
        } else {
            delta.updated.insert(id, row);
        }
        Ok(())
    }

    pub(crate) fn record_delete(&mut self, table: &str, id: RowId) -> EngineResult<()> {
        self.ensure_active()?;
        let delta = self.delta_mut(table);
        if delta.inserted.remove(&id).is_none() {
            delta.updated.remove(&id);
            delta.deleted.insert(id);
        }
        Ok(())
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_rolled_back(&mut self) {
        self.state = TransactionState::RolledBack;
        self.deltas.clear();
    }

    fn delta_mut(&mut self, table: &str) -> &mut TableDelta {
        self.deltas.entry(table.to_string()).or_default()
    }

    fn ensure_active(&self) -> EngineResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed | TransactionState::RolledBack => {
                Err(EngineError::TransactionNotActive)
            }
        }
    }
}
