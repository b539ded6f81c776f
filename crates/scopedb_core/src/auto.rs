//! Auto queries: ride the ambient transaction, or commit per call.

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::predicate::{Comparator, PredicateSet};
use crate::query::Query;
use crate::scope::{ScopeMode, TransactionScope};
use scopedb_engine::Value;

/// How an auto query runs its operations. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoMode {
    /// An ambient transaction existed: operations join it.
    Bound,
    /// No ambient transaction: each operation gets its own.
    AdHoc,
}

/// A query that is safe to use both inside and outside a transaction.
///
/// If an ambient transaction was open when the auto query was created, every
/// operation joins it and its owner decides the outcome. Otherwise each
/// operation runs in a fresh transaction that commits when the operation
/// succeeds and rolls back when it fails.
///
/// # Example
///
/// ```rust,ignore
/// db.auto::<TestEntity>()?.insert(&TestEntity::new("t1"))?;
/// let total = db.auto::<TestEntity>()?.count()?;
/// ```
#[derive(Debug)]
pub struct AutoQuery<T: Entity> {
    query: Query<T>,
    mode: AutoMode,
}

impl<T: Entity> AutoQuery<T> {
    /// `ambient` is the joined ambient scope, if one existed.
    pub(crate) fn new(mut query: Query<T>, ambient: Option<TransactionScope>) -> Self {
        let mode = if ambient.is_some() {
            AutoMode::Bound
        } else {
            AutoMode::AdHoc
        };
        query.set_scope(ambient);
        Self { query, mode }
    }

    /// Returns true if operations join an ambient transaction.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.mode == AutoMode::Bound
    }

    /// Returns the accumulated predicates.
    #[must_use]
    pub fn predicates(&self) -> &PredicateSet {
        self.query.predicates()
    }

    /// Removes every predicate.
    pub fn clear(&mut self) -> &mut Self {
        self.query.clear();
        self
    }

    /// Same as [`clear`](Self::clear).
    pub fn reset(&mut self) -> &mut Self {
        self.clear()
    }

    /// See [`Query::where_eq`].
    pub fn where_eq(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<&mut Self> {
        self.query.where_eq(name, value)?;
        Ok(self)
    }

    /// See [`Query::where_cmp`].
    pub fn where_cmp(
        &mut self,
        name: &str,
        comparator: &str,
        value: impl Into<Value>,
    ) -> CoreResult<&mut Self> {
        self.query.where_cmp(name, comparator, value)?;
        Ok(self)
    }

    /// See [`Query::where_with`].
    pub fn where_with(
        &mut self,
        name: &str,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> CoreResult<&mut Self> {
        self.query.where_with(name, comparator, value)?;
        Ok(self)
    }

    /// See [`Query::select`].
    pub fn select(&mut self) -> CoreResult<Vec<T>> {
        self.run(Query::<T>::select)
    }

    /// See [`Query::select_unique`].
    pub fn select_unique(&mut self) -> CoreResult<T> {
        self.run(Query::<T>::select_unique)
    }

    /// See [`Query::select_unique_or_none`].
    pub fn select_unique_or_none(&mut self) -> CoreResult<Option<T>> {
        self.run(Query::<T>::select_unique_or_none)
    }

    /// See [`Query::count`].
    pub fn count(&mut self) -> CoreResult<usize> {
        self.run(Query::<T>::count)
    }

    /// See [`Query::insert`].
    pub fn insert(&mut self, entity: &T) -> CoreResult<T> {
        self.run(|query| query.insert(entity))
    }

    /// See [`Query::update`].
    pub fn update(&mut self, entity: &T, columns: &[&str]) -> CoreResult<usize> {
        self.run(|query| query.update(entity, columns))
    }

    /// See [`Query::delete`].
    pub fn delete(&mut self) -> CoreResult<usize> {
        self.run(Query::<T>::delete)
    }

    fn run<R>(&mut self, op: impl FnOnce(&Query<T>) -> CoreResult<R>) -> CoreResult<R> {
        if self.mode == AutoMode::Bound {
            return op(&self.query);
        }

        let inner = self.query.shared().open_scope(ScopeMode::AdHoc)?;
        self.query
            .set_scope(Some(TransactionScope::owned(inner, None)));
        let result = op(&self.query);
        let Some(scope) = self.query.set_scope(None) else {
            return result;
        };
        match result {
            Ok(value) => scope.close().map(|()| value),
            Err(e) => {
                scope.fail();
                Err(e)
            }
        }
    }
}
