//! Database handle.

use crate::auto::AutoQuery;
use crate::config::Config;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::manager::{ConnectionManager, SessionFactory};
use crate::metadata::EntityMeta;
use crate::query::{Query, TransactionalQuery};
use crate::scope::{AmbientSlot, ScopeInner, ScopeMode, TransactionOptions, TransactionScope};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State shared by a handle and the queries it hands out.
///
/// Lock order: ambient slot, then manager, then scope session, then store.
#[derive(Debug)]
pub(crate) struct Shared {
    url: String,
    manager: RwLock<ConnectionManager>,
    ambient: Arc<AmbientSlot>,
    next_scope_id: AtomicU64,
}

impl Shared {
    /// Returns the live factory, or `DatabaseClosed`.
    pub(crate) fn factory(&self) -> CoreResult<Arc<SessionFactory>> {
        self.manager.read().factory()
    }

    /// Opens a scope with a fresh connection and an active transaction.
    pub(crate) fn open_scope(&self, mode: ScopeMode) -> CoreResult<Arc<ScopeInner>> {
        let factory = self.factory()?;
        let id = self.next_scope_id.fetch_add(1, Ordering::SeqCst) + 1;
        ScopeInner::open(id, mode, &factory)
    }

    /// Returns the ambient scope if it is still open.
    fn active_ambient(&self) -> Option<Arc<ScopeInner>> {
        self.ambient.current().filter(|scope| scope.is_active())
    }
}

/// A handle to a ScopeDB database.
///
/// The handle owns the registered entity set, the session factory built from
/// it, and a single ambient transaction slot. Queries obtained from it run
/// against one of three kinds of transaction:
///
/// - the ambient transaction, begun with the deprecated
///   [`begin_transaction`](Self::begin_transaction) or bound by an explicit
///   scope ([`transaction`](Self::transaction));
/// - a scope the caller finishes ([`transaction`](Self::transaction));
/// - a per-operation transaction ([`auto`](Self::auto)).
///
/// Two handles opened on the same store URL are independent: each has its
/// own ambient slot, and neither sees the other's uncommitted writes.
///
/// # Example
///
/// ```rust,ignore
/// use scopedb_core::{Config, Database};
///
/// let db = Database::open(Config::new().url("mem:app_db").entity::<TestEntity>())?;
/// db.auto::<TestEntity>()?.insert(&TestEntity::new("t1"))?;
///
/// let tx = db.transaction::<TestEntity>()?;
/// tx.insert(&TestEntity::new("t2"))?;
/// assert_eq!(db.query::<TestEntity>()?.count()?, 2);
/// tx.close()?;
///
/// db.close()?;
/// ```
#[derive(Debug)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Opens a handle on the store named by `config.url` and registers the
    /// configured entities, creating or extending their tables.
    ///
    /// # Errors
    ///
    /// Engine errors from opening the store (`InvalidUrl`, `StoreMissing`,
    /// `Locked`, I/O), `InvalidEntity` for a malformed descriptor, or
    /// `TableExists` when a table is incompatible with its entity.
    pub fn open(config: Config) -> CoreResult<Self> {
        let manager = ConnectionManager::open(&config)?;
        tracing::info!(
            url = %config.url,
            entities = config.entities.len(),
            "database opened"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                url: config.url,
                manager: RwLock::new(manager),
                ambient: Arc::new(AmbientSlot::default()),
                next_scope_id: AtomicU64::new(0),
            }),
        })
    }

    /// Opens a handle on a fresh, uniquely named in-memory store.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(Config::new().url(format!("mem:{}", uuid::Uuid::new_v4())))
    }

    /// Returns the store URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Checks that the handle is open.
    ///
    /// # Errors
    ///
    /// `DatabaseClosed` after [`close`](Self::close).
    pub fn connect(&self) -> CoreResult<&Self> {
        self.shared.factory()?;
        Ok(self)
    }

    /// Checks if the handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.factory().is_ok()
    }

    /// Closes the handle.
    ///
    /// An open ambient transaction is committed, or rolled back if it is
    /// rollback-only. Every later operation fails with `DatabaseClosed`.
    /// Closing a closed handle does nothing.
    pub fn close(&self) -> CoreResult<()> {
        if !self.is_open() {
            return Ok(());
        }

        let ambient = self.shared.ambient.lock().take();
        let result = match ambient {
            Some(scope) => scope.close(),
            None => Ok(()),
        };
        self.shared.manager.write().shutdown();
        tracing::info!(url = %self.shared.url, "database closed");
        result
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Creates the table for `T` and registers the entity.
    ///
    /// Rebuilds the session factory: do not change tables while a
    /// transaction is open, its later operations fail with `StaleSession`.
    pub fn create_table<T: Entity>(&self) -> CoreResult<()> {
        let descriptor = T::descriptor();
        let table = descriptor.table.clone();
        self.shared.manager.write().create_table(descriptor)?;
        tracing::info!(table = %table, "table created");
        Ok(())
    }

    /// Adds any columns of `T` missing from its table, creating the table if
    /// needed, and registers the entity.
    pub fn update_table<T: Entity>(&self) -> CoreResult<()> {
        let descriptor = T::descriptor();
        let table = descriptor.table.clone();
        self.shared.manager.write().update_table(descriptor)?;
        tracing::info!(table = %table, "table updated");
        Ok(())
    }

    /// Drops the table for `T` and unregisters the entity.
    pub fn delete_table<T: Entity>(&self) -> CoreResult<()> {
        let descriptor = T::descriptor();
        self.shared.manager.write().delete_table(&descriptor)?;
        tracing::info!(table = %descriptor.table, "table dropped");
        Ok(())
    }

    // ========================================================================
    // Ambient transaction
    // ========================================================================

    /// Returns true if an ambient transaction is open.
    #[must_use]
    pub fn has_ambient_transaction(&self) -> bool {
        self.shared.active_ambient().is_some()
    }

    /// Begins the ambient transaction.
    ///
    /// # Errors
    ///
    /// `TransactionConflict` if an ambient transaction is already open.
    #[deprecated(note = "use `transaction` or `in_transaction` for scoped transactions")]
    pub fn begin_transaction(&self) -> CoreResult<()> {
        let mut slot = self.shared.ambient.lock();
        if let Some(current) = slot.as_ref().filter(|s| s.is_active()) {
            return Err(CoreError::transaction_conflict(format!(
                "ambient transaction already open in scope {}",
                current.id()
            )));
        }
        *slot = Some(self.shared.open_scope(ScopeMode::Ambient)?);
        Ok(())
    }

    /// Flushes and commits the ambient transaction.
    ///
    /// # Errors
    ///
    /// `TransactionConflict` if no ambient transaction was begun, or if it
    /// was rollback-only (it is rolled back instead).
    #[deprecated(note = "use `transaction` or `in_transaction` for scoped transactions")]
    pub fn commit_transaction(&self) -> CoreResult<()> {
        let mut slot = self.shared.ambient.lock();
        let scope = Self::take_ambient(&mut slot, "commit")?;
        scope.commit()
    }

    /// Rolls the ambient transaction back.
    ///
    /// # Errors
    ///
    /// `TransactionConflict` if no ambient transaction was begun.
    #[deprecated(note = "use `transaction` or `in_transaction` for scoped transactions")]
    pub fn rollback_transaction(&self) -> CoreResult<()> {
        let mut slot = self.shared.ambient.lock();
        let scope = Self::take_ambient(&mut slot, "roll back")?;
        scope.rollback()
    }

    fn take_ambient(
        slot: &mut Option<Arc<ScopeInner>>,
        action: &str,
    ) -> CoreResult<Arc<ScopeInner>> {
        match slot.take() {
            Some(scope) if scope.mode() == ScopeMode::Ambient && scope.is_active() => Ok(scope),
            other => {
                *slot = other;
                Err(CoreError::transaction_conflict(format!(
                    "no ambient transaction to {action}"
                )))
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns a query bound to the ambient transaction, or with no
    /// transaction if none is open.
    pub fn query<T: Entity>(&self) -> CoreResult<Query<T>> {
        let meta = self.meta::<T>()?;
        let scope = self.shared.active_ambient().map(TransactionScope::joined);
        Ok(Query::new(Arc::clone(&self.shared), scope, meta))
    }

    /// Returns an auto query: bound to the ambient transaction if one is
    /// open, otherwise committing each operation on its own.
    pub fn auto<T: Entity>(&self) -> CoreResult<AutoQuery<T>> {
        let meta = self.meta::<T>()?;
        let ambient = self.shared.active_ambient().map(TransactionScope::joined);
        Ok(AutoQuery::new(
            Query::new(Arc::clone(&self.shared), None, meta),
            ambient,
        ))
    }

    /// Opens an explicit transaction bound as the ambient transaction.
    ///
    /// See [`transaction_with`](Self::transaction_with).
    pub fn transaction<T: Entity>(&self) -> CoreResult<TransactionalQuery<T>> {
        self.transaction_with(TransactionOptions::default())
    }

    /// Opens an explicit transaction.
    ///
    /// If an ambient transaction is already open the returned query joins it
    /// and cannot finish it. Otherwise a new transaction is begun on its own
    /// connection and, with `bind`, becomes the ambient transaction until it
    /// is finished.
    pub fn transaction_with<T: Entity>(
        &self,
        options: TransactionOptions,
    ) -> CoreResult<TransactionalQuery<T>> {
        let meta = self.meta::<T>()?;
        let mut slot = self.shared.ambient.lock();
        let current = slot.as_ref().filter(|s| s.is_active()).cloned();
        let scope = match current {
            Some(current) => TransactionScope::joined(current),
            None => {
                let inner = self.shared.open_scope(ScopeMode::Explicit)?;
                if options.bind {
                    *slot = Some(Arc::clone(&inner));
                    tracing::debug!(scope = inner.id(), "scope bound as ambient");
                    TransactionScope::owned(inner, Some(Arc::clone(&self.shared.ambient)))
                } else {
                    TransactionScope::owned(inner, None)
                }
            }
        };
        drop(slot);
        Ok(TransactionalQuery::new(Query::new(
            Arc::clone(&self.shared),
            Some(scope),
            meta,
        )))
    }

    /// Runs `f` in an explicit transaction, committing if it returns `Ok`
    /// and rolling back if it returns `Err`.
    pub fn in_transaction<T, R, F>(&self, f: F) -> CoreResult<R>
    where
        T: Entity,
        F: FnOnce(&mut TransactionalQuery<T>) -> CoreResult<R>,
    {
        let mut query = self.transaction::<T>()?;
        match f(&mut query) {
            Ok(value) => {
                query.close()?;
                Ok(value)
            }
            Err(e) => {
                query.fail();
                Err(e)
            }
        }
    }

    fn meta<T: Entity>(&self) -> CoreResult<Arc<EntityMeta>> {
        self.shared.factory()?.meta(&T::descriptor().name)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(url = %self.shared.url, error = %e, "close on drop failed");
        }
    }
}
