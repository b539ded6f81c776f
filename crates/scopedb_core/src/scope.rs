//! Transaction scopes.
//!
//! A scope is one unit of work: a connection with an open transaction, plus
//! the policy deciding who finishes it.
//!
//! - **Ambient** scopes live in the handle's single [`AmbientSlot`] and are
//!   finished by the handle's `commit_transaction` / `rollback_transaction`.
//! - **Ad-hoc** scopes wrap exactly one operation of an auto query.
//! - **Explicit** scopes are finished by the caller and may bind themselves
//!   into the ambient slot while they are open.
//!
//! Lock order: ambient slot, then scope session, then store.

use crate::error::{CoreError, CoreResult};
use crate::manager::SessionFactory;
use parking_lot::Mutex;
use scopedb_engine::Connection;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Who owns a scope's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Begun and finished through the database handle.
    Ambient,
    /// Opened and finished around a single operation.
    AdHoc,
    /// Finished by the caller holding it.
    Explicit,
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScopeMode::Ambient => "ambient",
            ScopeMode::AdHoc => "ad-hoc",
            ScopeMode::Explicit => "explicit",
        })
    }
}

/// Lifecycle of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Created, transaction not yet begun.
    Idle,
    /// Transaction open.
    Active,
    /// Transaction committed.
    Committed,
    /// Transaction rolled back.
    RolledBack,
}

/// Options for an explicit transaction scope.
#[derive(Debug, Clone, Copy)]
pub struct TransactionOptions {
    /// Whether the scope becomes the ambient transaction while open.
    pub bind: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self { bind: true }
    }
}

impl TransactionOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the scope binds itself as ambient.
    #[must_use]
    pub const fn bind(mut self, value: bool) -> Self {
        self.bind = value;
        self
    }
}

#[derive(Debug)]
struct Session {
    conn: Connection,
    state: ScopeState,
}

/// Shared state of one scope.
#[derive(Debug)]
pub(crate) struct ScopeInner {
    id: u64,
    mode: ScopeMode,
    generation: u64,
    session: Mutex<Session>,
    rollback_only: AtomicBool,
}

impl ScopeInner {
    /// Opens a connection and begins its transaction.
    pub(crate) fn open(id: u64, mode: ScopeMode, factory: &SessionFactory) -> CoreResult<Arc<Self>> {
        let scope = Self {
            id,
            mode,
            generation: factory.generation(),
            session: Mutex::new(Session {
                conn: factory.open_session(),
                state: ScopeState::Idle,
            }),
            rollback_only: AtomicBool::new(false),
        };
        scope.begin()?;
        Ok(Arc::new(scope))
    }

    fn begin(&self) -> CoreResult<()> {
        let mut session = self.session.lock();
        if session.state != ScopeState::Idle {
            return Err(CoreError::transaction_conflict(format!(
                "scope {} has already begun",
                self.id
            )));
        }
        session.conn.begin()?;
        session.state = ScopeState::Active;
        tracing::debug!(scope = self.id, mode = %self.mode, "scope begun");
        Ok(())
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn mode(&self) -> ScopeMode {
        self.mode
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn state(&self) -> ScopeState {
        self.session.lock().state
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == ScopeState::Active
    }

    pub(crate) fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    /// Flags the transaction so that its only possible outcome is rollback.
    pub(crate) fn mark_rollback_only(&self) {
        if !self.rollback_only.swap(true, Ordering::SeqCst) {
            tracing::warn!(scope = self.id, mode = %self.mode, "scope marked rollback-only");
        }
    }

    /// Runs `op` on the scope's connection while the transaction is open.
    pub(crate) fn with_connection<R>(
        &self,
        op: impl FnOnce(&mut Connection) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut session = self.session.lock();
        if session.state != ScopeState::Active {
            return Err(CoreError::TransactionClosed { scope: self.id });
        }
        op(&mut session.conn)
    }

    /// Flushes and commits, then releases the connection.
    ///
    /// A rollback-only scope is rolled back instead and the commit fails with
    /// `TransactionConflict`.
    pub(crate) fn commit(&self) -> CoreResult<()> {
        let mut session = self.session.lock();
        self.ensure_active(&session)?;
        if self.is_rollback_only() {
            self.finish_rollback(&mut session);
            return Err(CoreError::transaction_conflict(format!(
                "scope {} is rollback-only and was rolled back",
                self.id
            )));
        }

        let result = match session.conn.flush() {
            Ok(()) => session.conn.commit(),
            Err(e) => Err(e),
        }
        .map_err(CoreError::from);
        session.state = match result {
            Ok(()) => ScopeState::Committed,
            // a failed engine commit ends the transaction without applying it
            Err(_) => ScopeState::RolledBack,
        };
        session.conn.close();
        tracing::debug!(
            scope = self.id,
            mode = %self.mode,
            committed = result.is_ok(),
            "scope committed"
        );
        result
    }

    /// Rolls back, then releases the connection.
    pub(crate) fn rollback(&self) -> CoreResult<()> {
        let mut session = self.session.lock();
        self.ensure_active(&session)?;
        self.rollback_only.store(true, Ordering::SeqCst);
        self.finish_rollback(&mut session);
        Ok(())
    }

    /// Rolls back if rollback-only, otherwise commits. No-op once finished.
    pub(crate) fn close(&self) -> CoreResult<()> {
        if !self.is_active() {
            return Ok(());
        }
        if self.is_rollback_only() {
            self.rollback()
        } else {
            self.commit()
        }
    }

    /// Rolls back a scope that was dropped while still open.
    pub(crate) fn abandon(&self) {
        let mut session = self.session.lock();
        if session.state == ScopeState::Active {
            tracing::warn!(scope = self.id, mode = %self.mode, "scope dropped without close, rolling back");
            self.finish_rollback(&mut session);
        }
    }

    fn finish_rollback(&self, session: &mut Session) {
        if let Err(e) = session.conn.rollback() {
            tracing::debug!(scope = self.id, error = %e, "rollback on finished connection");
        }
        session.state = ScopeState::RolledBack;
        session.conn.close();
        tracing::debug!(scope = self.id, mode = %self.mode, "scope rolled back");
    }

    fn ensure_active(&self, session: &Session) -> CoreResult<()> {
        if session.state == ScopeState::Active {
            Ok(())
        } else {
            Err(CoreError::TransactionClosed { scope: self.id })
        }
    }
}

/// The handle-wide ambient transaction slot.
#[derive(Debug, Default)]
pub(crate) struct AmbientSlot {
    current: Mutex<Option<Arc<ScopeInner>>>,
}

impl AmbientSlot {
    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, Option<Arc<ScopeInner>>> {
        self.current.lock()
    }

    /// Returns the ambient scope, if one is bound.
    pub(crate) fn current(&self) -> Option<Arc<ScopeInner>> {
        self.current.lock().clone()
    }

    /// Clears the slot if it still holds `scope`.
    fn unbind(&self, scope: &Arc<ScopeInner>) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, scope)) {
            *current = None;
            tracing::debug!(scope = scope.id(), "scope unbound");
        }
    }
}

/// A query's view of a scope: shared state plus whether it may finish it.
#[derive(Debug)]
pub(crate) struct TransactionScope {
    inner: Arc<ScopeInner>,
    owner: bool,
    binding: Option<Arc<AmbientSlot>>,
}

impl TransactionScope {
    /// A scope this query opened and finishes. `binding` is the slot it was
    /// bound into, if any.
    pub(crate) fn owned(inner: Arc<ScopeInner>, binding: Option<Arc<AmbientSlot>>) -> Self {
        Self {
            inner,
            owner: true,
            binding,
        }
    }

    /// A scope joined from the ambient slot; its owner finishes it.
    pub(crate) fn joined(inner: Arc<ScopeInner>) -> Self {
        Self {
            inner,
            owner: false,
            binding: None,
        }
    }

    pub(crate) fn inner(&self) -> &ScopeInner {
        &self.inner
    }

    pub(crate) fn is_owner(&self) -> bool {
        self.owner
    }

    pub(crate) fn commit(&self) -> CoreResult<()> {
        self.ensure_owner()?;
        let result = self.inner.commit();
        self.unbind();
        result
    }

    pub(crate) fn rollback(&self) -> CoreResult<()> {
        self.ensure_owner()?;
        let result = self.inner.rollback();
        self.unbind();
        result
    }

    /// Finishes an owned scope; a joined scope is left to its owner.
    pub(crate) fn close(&self) -> CoreResult<()> {
        if !self.owner {
            return Ok(());
        }
        let result = self.inner.close();
        self.unbind();
        result
    }

    /// Gives up after a failed unit of work: an owner rolls back, a joined
    /// scope marks the shared transaction rollback-only.
    pub(crate) fn fail(&self) {
        if self.owner {
            if let Err(e) = self.inner.rollback() {
                tracing::debug!(scope = self.inner.id(), error = %e, "rollback after failure");
            }
            self.unbind();
        } else {
            self.inner.mark_rollback_only();
        }
    }

    /// Rolls back an owned scope that is still open.
    pub(crate) fn abandon(&self) {
        if self.owner {
            self.inner.abandon();
            self.unbind();
        }
    }

    fn ensure_owner(&self) -> CoreResult<()> {
        if self.owner {
            Ok(())
        } else {
            Err(CoreError::NotOwner {
                scope: self.inner.id(),
            })
        }
    }

    fn unbind(&self) {
        if let Some(slot) = &self.binding {
            slot.unbind(&self.inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::{EntityDescriptor, PropertyDef};
    use crate::manager::ConnectionManager;
    use scopedb_engine::{ColumnType, Filter, Row, Value};

    fn manager() -> ConnectionManager {
        let mut manager =
            ConnectionManager::open(&Config::new().url(format!("mem:scope-{}", uuid::Uuid::new_v4())))
                .unwrap();
        manager
            .create_table(
                EntityDescriptor::new("Item", "ITEMS")
                    .property(PropertyDef::new("id", ColumnType::Int).id())
                    .property(PropertyDef::new("label", ColumnType::Text)),
            )
            .unwrap();
        manager
    }

    fn insert(scope: &ScopeInner, id: i64) -> CoreResult<Row> {
        scope.with_connection(|conn| {
            let mut row = Row::new();
            row.insert("id".into(), Value::Int(id));
            Ok(conn.insert("ITEMS", row)?)
        })
    }

    fn committed_count(manager: &ConnectionManager) -> usize {
        manager
            .store()
            .connect()
            .count("ITEMS", &Filter::new())
            .unwrap()
    }

    #[test]
    fn commit_applies_and_finishes() {
        let manager = manager();
        let scope = ScopeInner::open(1, ScopeMode::Explicit, &manager.factory().unwrap()).unwrap();
        insert(&scope, 1).unwrap();
        assert_eq!(committed_count(&manager), 0);

        scope.commit().unwrap();
        assert_eq!(scope.state(), ScopeState::Committed);
        assert_eq!(committed_count(&manager), 1);
        assert!(matches!(
            insert(&scope, 2),
            Err(CoreError::TransactionClosed { scope: 1 })
        ));
        assert!(matches!(scope.commit(), Err(CoreError::TransactionClosed { .. })));
    }

    #[test]
    fn close_rolls_back_when_rollback_only() {
        let manager = manager();
        let scope = ScopeInner::open(1, ScopeMode::Explicit, &manager.factory().unwrap()).unwrap();
        insert(&scope, 1).unwrap();
        scope.mark_rollback_only();
        scope.close().unwrap();
        assert_eq!(scope.state(), ScopeState::RolledBack);
        assert_eq!(committed_count(&manager), 0);
    }

    #[test]
    fn commit_of_rollback_only_scope_fails() {
        let manager = manager();
        let scope = ScopeInner::open(1, ScopeMode::Ambient, &manager.factory().unwrap()).unwrap();
        insert(&scope, 1).unwrap();
        scope.mark_rollback_only();
        assert!(matches!(
            scope.commit(),
            Err(CoreError::TransactionConflict { .. })
        ));
        assert_eq!(committed_count(&manager), 0);
    }

    #[test]
    fn joined_scope_cannot_finish() {
        let manager = manager();
        let inner = ScopeInner::open(1, ScopeMode::Explicit, &manager.factory().unwrap()).unwrap();
        let joined = TransactionScope::joined(Arc::clone(&inner));
        assert!(matches!(joined.commit(), Err(CoreError::NotOwner { .. })));
        assert!(matches!(joined.rollback(), Err(CoreError::NotOwner { .. })));
        joined.close().unwrap();
        assert!(inner.is_active());

        joined.fail();
        assert!(inner.is_rollback_only());
        assert!(inner.is_active());
    }

    #[test]
    fn owned_scope_unbinds_on_commit() {
        let manager = manager();
        let slot = Arc::new(AmbientSlot::default());
        let inner = ScopeInner::open(1, ScopeMode::Explicit, &manager.factory().unwrap()).unwrap();
        *slot.lock() = Some(Arc::clone(&inner));

        let scope = TransactionScope::owned(inner, Some(Arc::clone(&slot)));
        assert!(slot.current().is_some());
        scope.commit().unwrap();
        assert!(slot.current().is_none());
    }

    #[test]
    fn abandon_rolls_back() {
        let manager = manager();
        let inner = ScopeInner::open(1, ScopeMode::Explicit, &manager.factory().unwrap()).unwrap();
        insert(&inner, 1).unwrap();
        TransactionScope::owned(Arc::clone(&inner), None).abandon();
        assert_eq!(inner.state(), ScopeState::RolledBack);
        assert_eq!(committed_count(&manager), 0);
    }
}
