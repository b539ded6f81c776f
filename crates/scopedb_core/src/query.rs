//! Queries: predicate accumulation plus execution under a transaction scope.

use crate::database::Shared;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::metadata::EntityMeta;
use crate::predicate::{Comparator, PredicateSet};
use crate::resolver::ColumnResolver;
use crate::scope::{ScopeMode, TransactionScope};
use scopedb_engine::{Assignments, Connection, EngineError, Filter, Value};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A query over entities of type `T`.
///
/// Predicates form a conjunction with at most one value per
/// (property, comparator) pair; setting a pair again replaces its value.
/// Names may be given as property or column names.
///
/// Operations run in the query's transaction scope. A query obtained with
/// [`Database::query`](crate::Database::query) while no ambient transaction
/// exists has no scope, and its operations fail with `NoActiveTransaction`.
///
/// # Example
///
/// ```rust,ignore
/// let mut query = db.query::<TestEntity>()?;
/// let matches = query.where_eq("test", "t2")?.count()?;
/// ```
pub struct Query<T: Entity> {
    shared: Arc<Shared>,
    scope: Option<TransactionScope>,
    meta: Arc<EntityMeta>,
    resolver: ColumnResolver,
    predicates: PredicateSet,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Query<T> {
    pub(crate) fn new(
        shared: Arc<Shared>,
        scope: Option<TransactionScope>,
        meta: Arc<EntityMeta>,
    ) -> Self {
        let resolver = ColumnResolver::new(&meta);
        Self {
            shared,
            scope,
            meta,
            resolver,
            predicates: PredicateSet::new(),
            _entity: PhantomData,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn scope(&self) -> Option<&TransactionScope> {
        self.scope.as_ref()
    }

    pub(crate) fn set_scope(&mut self, scope: Option<TransactionScope>) -> Option<TransactionScope> {
        std::mem::replace(&mut self.scope, scope)
    }

    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        self.meta.name()
    }

    /// Returns true if the query has a transaction scope.
    #[must_use]
    pub fn has_transaction(&self) -> bool {
        self.scope.is_some()
    }

    /// Returns how the query's transaction is owned, if it has one.
    #[must_use]
    pub fn scope_mode(&self) -> Option<ScopeMode> {
        self.scope.as_ref().map(|s| s.inner().mode())
    }

    /// Returns the accumulated predicates.
    #[must_use]
    pub fn predicates(&self) -> &PredicateSet {
        &self.predicates
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    /// Removes every predicate.
    pub fn clear(&mut self) -> &mut Self {
        self.predicates.clear();
        self
    }

    /// Same as [`clear`](Self::clear).
    pub fn reset(&mut self) -> &mut Self {
        self.clear()
    }

    /// Adds an equality predicate.
    pub fn where_eq(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<&mut Self> {
        self.where_with(name, Comparator::Eq, value)
    }

    /// Adds a predicate with a comparator given as text: `=`, `>`, `<` or
    /// `like`. `>` is inclusive.
    ///
    /// # Errors
    ///
    /// `UnsupportedComparator` or `UnresolvedColumn`, raised immediately.
    pub fn where_cmp(
        &mut self,
        name: &str,
        comparator: &str,
        value: impl Into<Value>,
    ) -> CoreResult<&mut Self> {
        let comparator = comparator.parse()?;
        self.where_with(name, comparator, value)
    }

    /// Adds a predicate, replacing any earlier value for the same
    /// (property, comparator) pair.
    ///
    /// # Errors
    ///
    /// `UnresolvedColumn` if `name` is neither a property nor a column.
    pub fn where_with(
        &mut self,
        name: &str,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> CoreResult<&mut Self> {
        let property = self.resolver.resolve(name)?.to_string();
        self.predicates.set(property, comparator, value.into());
        Ok(self)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the matching entities in storage order.
    pub fn select(&self) -> CoreResult<Vec<T>> {
        self.execute("select", |conn, filter, meta| {
            let rows = conn.select(meta.table(), filter)?;
            tracing::debug!(entity = meta.name(), rows = rows.len(), "selected");
            rows.into_iter()
                .map(|row| T::from_values(meta.from_row(row)))
                .collect()
        })
    }

    /// Returns the single matching entity.
    ///
    /// # Errors
    ///
    /// `NotUnique` if zero or several entities match.
    pub fn select_unique(&self) -> CoreResult<T> {
        let mut matches = self.select()?;
        if matches.len() != 1 {
            return Err(CoreError::NotUnique {
                entity: self.meta.name().to_string(),
                matched: matches.len(),
            });
        }
        matches.pop().ok_or_else(|| CoreError::NotUnique {
            entity: self.meta.name().to_string(),
            matched: 0,
        })
    }

    /// Returns the single matching entity, or `None` if zero or several match.
    pub fn select_unique_or_none(&self) -> CoreResult<Option<T>> {
        let mut matches = self.select()?;
        Ok(if matches.len() == 1 { matches.pop() } else { None })
    }

    /// Counts the matching entities.
    pub fn count(&self) -> CoreResult<usize> {
        self.execute("count", |conn, filter, meta| {
            Ok(conn.count(meta.table(), filter)?)
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Inserts an entity and returns it as stored, with generated values.
    ///
    /// On failure the transaction is marked rollback-only.
    pub fn insert(&self, entity: &T) -> CoreResult<T> {
        let values = entity.to_values();
        self.mutate("insert", |conn, _, meta| {
            let stored = conn.insert(meta.table(), meta.to_row(values))?;
            T::from_values(meta.from_row(stored))
        })
    }

    /// Sets the named properties of every matching entity to their values in
    /// `entity`, as one bulk update. With no names, every non-identifier
    /// property is set. Returns the number of rows updated.
    ///
    /// # Errors
    ///
    /// `UnresolvedColumn` for an unknown name, or an engine
    /// `ImmutableColumn` for the identifier. Both are raised before anything
    /// runs and leave the transaction untouched. Any later failure marks the
    /// transaction rollback-only.
    pub fn update(&self, entity: &T, columns: &[&str]) -> CoreResult<usize> {
        let assignments = self.assignments(entity, columns)?;
        self.mutate("update", |conn, filter, meta| {
            if assignments.is_empty() {
                return Ok(0);
            }
            let rows = conn.update(meta.table(), filter, &assignments)?;
            tracing::debug!(entity = meta.name(), rows, "updated");
            Ok(rows)
        })
    }

    /// Deletes every matching entity as one bulk delete. Returns the number
    /// of rows deleted.
    ///
    /// On failure the transaction is marked rollback-only.
    pub fn delete(&self) -> CoreResult<usize> {
        self.mutate("delete", |conn, filter, meta| {
            let rows = conn.delete(meta.table(), filter)?;
            tracing::debug!(entity = meta.name(), rows, "deleted");
            Ok(rows)
        })
    }

    fn assignments(&self, entity: &T, columns: &[&str]) -> CoreResult<Assignments> {
        let id = self.meta.id();
        let mut named = Vec::with_capacity(columns.len());
        for column in columns {
            let property = self.resolver.resolve(column)?;
            if property == id.def.property {
                return Err(EngineError::ImmutableColumn {
                    table: self.meta.table().to_string(),
                    column: id.def.column.clone(),
                }
                .into());
            }
            named.push(property);
        }

        let values = entity.to_values();
        let mut assignments = Assignments::new();
        for p in self.meta.data_properties() {
            if named.is_empty() || named.contains(&p.def.property.as_str()) {
                let value = values.get(&p.def.property).cloned().unwrap_or(Value::Null);
                assignments.set(&p.def.column, value);
            }
        }
        Ok(assignments)
    }

    fn execute<R>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut Connection, &Filter, &EntityMeta) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let scope = self
            .scope
            .as_ref()
            .ok_or(CoreError::NoActiveTransaction { operation })?;
        let factory = self.shared.factory()?;
        if factory.generation() != scope.inner().generation() {
            return Err(CoreError::StaleSession {
                scope: scope.inner().id(),
            });
        }

        let filter = self.predicates.to_filter(&self.meta)?;
        if factory.show_sql() {
            tracing::debug!(
                table = self.meta.table(),
                operation,
                filter = %filter,
                "sql"
            );
        }
        tracing::debug!(
            entity = self.meta.name(),
            scope = scope.inner().id(),
            mode = %scope.inner().mode(),
            operation,
            "query"
        );
        scope
            .inner()
            .with_connection(|conn| op(conn, &filter, &self.meta))
    }

    fn mutate<R>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut Connection, &Filter, &EntityMeta) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let result = self.execute(operation, op);
        if result.is_err() {
            if let Some(scope) = &self.scope {
                scope.inner().mark_rollback_only();
            }
        }
        result
    }
}

impl<T: Entity> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &self.meta.name())
            .field("scope", &self.scope.as_ref().map(|s| s.inner().id()))
            .field("predicates", &self.predicates)
            .finish()
    }
}

/// A query that owns (or has joined) an explicit transaction scope.
///
/// The caller finishes the scope with [`commit`](Self::commit),
/// [`rollback`](Self::rollback) or [`close`](Self::close). Dropping an
/// owned scope that is still open rolls it back.
///
/// A scope opened while an ambient transaction exists joins it instead of
/// opening a second one; such a scope cannot commit or roll back, and
/// closing it leaves the transaction to its owner.
#[derive(Debug)]
pub struct TransactionalQuery<T: Entity> {
    query: Query<T>,
}

impl<T: Entity> TransactionalQuery<T> {
    pub(crate) fn new(query: Query<T>) -> Self {
        Self { query }
    }

    fn scope(&self, operation: &'static str) -> CoreResult<&TransactionScope> {
        self.query
            .scope()
            .ok_or(CoreError::NoActiveTransaction { operation })
    }

    /// Returns true if this query owns its transaction.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.query.scope().is_some_and(TransactionScope::is_owner)
    }

    /// Returns true while the transaction is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.query.scope().is_some_and(|s| s.inner().is_active())
    }

    /// Returns true if the transaction can only roll back.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.query
            .scope()
            .is_some_and(|s| s.inner().is_rollback_only())
    }

    /// Flushes and commits the transaction.
    ///
    /// # Errors
    ///
    /// `NotOwner` for a joined scope, `TransactionClosed` if already
    /// finished, `TransactionConflict` if rollback-only.
    pub fn commit(&self) -> CoreResult<()> {
        self.scope("commit")?.commit()
    }

    /// Rolls the transaction back.
    pub fn rollback(&self) -> CoreResult<()> {
        self.scope("rollback")?.rollback()
    }

    /// Commits unless rollback-only, in which case rolls back. Does nothing
    /// if already finished or joined.
    pub fn close(self) -> CoreResult<()> {
        let scope = self.scope("close")?;
        scope.close()
    }

    pub(crate) fn fail(&self) {
        if let Some(scope) = self.query.scope() {
            scope.fail();
        }
    }
}

impl<T: Entity> Deref for TransactionalQuery<T> {
    type Target = Query<T>;

    fn deref(&self) -> &Self::Target {
        &self.query
    }
}

impl<T: Entity> DerefMut for TransactionalQuery<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.query
    }
}

impl<T: Entity> Drop for TransactionalQuery<T> {
    fn drop(&mut self) {
        if let Some(scope) = self.query.scope() {
            scope.abandon();
        }
    }
}
