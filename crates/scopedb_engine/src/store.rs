//! The shared store: committed tables, DDL and commit application.
//!
//! Stores are addressed by URL:
//!
//! - `mem:<name>` keeps everything in memory. Every handle opened on the same
//!   name within a process shares one store, which is dropped with its last
//!   handle.
//! - `file:<path>` additionally persists committed state to a CBOR snapshot
//!   at `<path>` (requires the `file` feature).

use crate::config::StoreOptions;
use crate::connection::Connection;
use crate::error::{EngineError, EngineResult};
#[cfg(feature = "file")]
use crate::snapshot::SnapshotFile;
use crate::table::Table;
use crate::transaction::Transaction;
use crate::types::{ConnectionId, RowId, TransactionId};
use crate::value::Value;
use crate::{Row, TableSchema};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

const MEMORY_SCHEME: &str = "mem:";
const FILE_SCHEME: &str = "file:";

/// Live stores of this process, keyed by URL.
fn registry() -> &'static Mutex<HashMap<String, Weak<Store>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Weak<Store>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Committed state guarded by the store lock.
#[derive(Debug, Default)]
struct StoreState {
    tables: BTreeMap<String, Table>,
}

/// A relational store shared by any number of connections.
///
/// # Thread Safety
///
/// `Store` is `Send + Sync`. Committed state sits behind a `RwLock`; commits
/// and DDL take the write lock, reads take the read lock.
#[derive(Debug)]
pub struct Store {
    url: String,
    options: StoreOptions,
    state: RwLock<StoreState>,
    next_txid: AtomicU64,
    next_row_id: AtomicU64,
    next_conn: AtomicU64,
    #[cfg(feature = "file")]
    snapshot: Option<SnapshotFile>,
}

impl Store {
    /// Opens the store at `url`, joining it if it is already open in this
    /// process.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` if the scheme is not recognised
    /// - `StoreMissing` if the store doesn't exist and `create_if_missing`
    ///   is false
    /// - `Locked` if another process holds a `file:` store
    pub fn open(url: &str, options: StoreOptions) -> EngineResult<Arc<Self>> {
        let mut registry = registry().lock();
        if let Some(existing) = registry.get(url).and_then(Weak::upgrade) {
            tracing::debug!(url, "joining open store");
            return Ok(existing);
        }

        let store = Arc::new(Self::create(url, options)?);
        registry.insert(url.to_string(), Arc::downgrade(&store));
        Ok(store)
    }

    fn create(url: &str, options: StoreOptions) -> EngineResult<Self> {
        if let Some(name) = url.strip_prefix(MEMORY_SCHEME) {
            if name.is_empty() {
                return Err(EngineError::InvalidUrl { url: url.to_string() });
            }
            if !options.create_if_missing {
                return Err(EngineError::StoreMissing { url: url.to_string() });
            }
            tracing::info!(url, "opened memory store");
            return Ok(Self::with_state(url, options, StoreState::default(), 1));
        }

        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            if path.is_empty() {
                return Err(EngineError::InvalidUrl { url: url.to_string() });
            }
            return Self::open_file(url, std::path::Path::new(path), options);
        }

        Err(EngineError::InvalidUrl { url: url.to_string() })
    }

    #[cfg(feature = "file")]
    fn open_file(url: &str, path: &std::path::Path, options: StoreOptions) -> EngineResult<Self> {
        let snapshot = SnapshotFile::open(path, options.create_if_missing, options.sync_on_commit)?;
        let (state, next_row_id) = match snapshot.load()? {
            Some(data) => (StoreState { tables: data.tables }, data.next_row_id),
            None => (StoreState::default(), 1),
        };
        tracing::info!(
            url,
            path = %snapshot.path().display(),
            tables = state.tables.len(),
            "opened file store"
        );
        let mut store = Self::with_state(url, options, state, next_row_id);
        store.snapshot = Some(snapshot);
        Ok(store)
    }

    #[cfg(not(feature = "file"))]
    fn open_file(url: &str, _path: &std::path::Path, _options: StoreOptions) -> EngineResult<Self> {
        Err(EngineError::InvalidUrl { url: url.to_string() })
    }

    fn with_state(url: &str, options: StoreOptions, state: StoreState, next_row_id: u64) -> Self {
        Self {
            url: url.to_string(),
            options,
            state: RwLock::new(state),
            next_txid: AtomicU64::new(1),
            next_row_id: AtomicU64::new(next_row_id),
            next_conn: AtomicU64::new(1),
            #[cfg(feature = "file")]
            snapshot: None,
        }
    }

    /// Returns the URL the store was opened with.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the options the store was opened with.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Opens a new connection.
    #[must_use]
    pub fn connect(self: &Arc<Self>) -> Connection {
        let id = ConnectionId(self.next_conn.fetch_add(1, Ordering::SeqCst));
        Connection::new(id, Arc::clone(self))
    }

    // ========================================================================
    // DDL
    // ========================================================================

    /// Creates a table. Returns false if an identical table already exists.
    ///
    /// # Errors
    ///
    /// `TableExists` if a table with the same name but a different
    /// definition exists.
    pub fn create_table(&self, schema: &TableSchema) -> EngineResult<bool> {
        schema.validate()?;
        let mut state = self.state.write();
        if let Some(existing) = state.tables.get(&schema.name) {
            if existing.schema == *schema {
                return Ok(false);
            }
            return Err(EngineError::TableExists {
                table: schema.name.clone(),
            });
        }
        state
            .tables
            .insert(schema.name.clone(), Table::new(schema.clone()));
        self.persist_or_restore(&mut state, vec![(schema.name.clone(), None)])?;
        tracing::info!(table = %schema.name, columns = schema.columns.len(), "created table");
        Ok(true)
    }

    /// Brings a table up to `schema`, creating it if missing and adding
    /// columns it lacks. Existing columns are kept. Returns the resulting
    /// definition.
    pub fn update_table(&self, schema: &TableSchema) -> EngineResult<TableSchema> {
        schema.validate()?;
        let mut state = self.state.write();
        let Some(table) = state.tables.get_mut(&schema.name) else {
            state
                .tables
                .insert(schema.name.clone(), Table::new(schema.clone()));
            self.persist_or_restore(&mut state, vec![(schema.name.clone(), None)])?;
            tracing::info!(table = %schema.name, "created table");
            return Ok(schema.clone());
        };

        let added = schema.added_columns(&table.schema)?;
        if added.is_empty() {
            return Ok(table.schema.clone());
        }
        if !table.rows.is_empty() {
            if let Some(column) = added.iter().find(|c| !c.nullable && c.generation.is_none()) {
                return Err(EngineError::NotNull {
                    table: schema.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let saved = self.save_image(&schema.name, table);
        let mut merged = table.schema.clone();
        merged.columns.extend(added.iter().cloned());
        let names: Vec<String> = added.iter().map(|c| c.name.clone()).collect();
        table.extend_schema(merged.clone(), &names);
        self.persist_or_restore(&mut state, saved.into_iter().collect())?;
        tracing::info!(table = %schema.name, added = ?names, "updated table");
        Ok(merged)
    }

    /// Drops a table and its rows. Returns false if it didn't exist.
    pub fn drop_table(&self, name: &str) -> EngineResult<bool> {
        let mut state = self.state.write();
        let Some(removed) = state.tables.remove(name) else {
            return Ok(false);
        };
        self.persist_or_restore(&mut state, vec![(name.to_string(), Some(removed))])?;
        tracing::info!(table = name, "dropped table");
        Ok(true)
    }

    /// Returns a table's definition.
    pub fn table_schema(&self, name: &str) -> EngineResult<TableSchema> {
        self.state
            .read()
            .tables
            .get(name)
            .map(|t| t.schema.clone())
            .ok_or_else(|| EngineError::unknown_table(name))
    }

    /// Returns true if the table exists.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.state.read().tables.contains_key(name)
    }

    /// Returns the names of all tables, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.state.read().tables.keys().cloned().collect()
    }

    // ========================================================================
    // Row access
    // ========================================================================

    pub(crate) fn begin_transaction(&self) -> Transaction {
        Transaction::new(TransactionId::new(
            self.next_txid.fetch_add(1, Ordering::SeqCst),
        ))
    }

    pub(crate) fn allocate_row_id(&self) -> RowId {
        RowId::new(self.next_row_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Hands out the next identity value for `table`.
    pub(crate) fn next_identity(&self, table: &str) -> EngineResult<i64> {
        let mut state = self.state.write();
        let table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| EngineError::unknown_table(table))?;
        Ok(table.allocate_identity())
    }

    /// Visits the rows of `table` visible to `txn` in row-id order.
    ///
    /// Committed rows are overlaid with the transaction's delta: deleted rows
    /// are skipped, updated rows show their new image and inserted rows are
    /// merged in.
    pub(crate) fn scan<F>(&self, table: &str, txn: Option<&Transaction>, mut visit: F) -> EngineResult<()>
    where
        F: FnMut(RowId, &Row),
    {
        let state = self.state.read();
        let committed = state
            .tables
            .get(table)
            .ok_or_else(|| EngineError::unknown_table(table))?;
        let Some(delta) = txn.and_then(|t| t.delta(table)) else {
            for (id, row) in &committed.rows {
                visit(*id, row);
            }
            return Ok(());
        };

        let mut inserted = delta.inserted.iter().peekable();
        for (id, row) in &committed.rows {
            while let Some((ins_id, ins_row)) = inserted.next_if(|(ins_id, _)| *ins_id < id) {
                visit(*ins_id, ins_row);
            }
            if delta.deleted.contains(id) {
                continue;
            }
            visit(*id, delta.updated.get(id).unwrap_or(row));
        }
        for (id, row) in inserted {
            visit(*id, row);
        }
        Ok(())
    }

    /// Applies a transaction's changes atomically.
    ///
    /// Inserted keys are re-checked against rows committed since they were
    /// written; a collision fails the whole commit and changes nothing. A
    /// snapshot that cannot be written also fails the commit, and the
    /// touched tables are put back as they were.
    pub(crate) fn apply(&self, txn: &Transaction) -> EngineResult<()> {
        let mut state = self.state.write();

        for (name, delta) in txn.deltas() {
            let table = state
                .tables
                .get(name)
                .ok_or_else(|| EngineError::unknown_table(name))?;
            let pk = &table.schema.primary_key;
            for row in delta.inserted.values() {
                let key = row.get(pk).unwrap_or(&Value::Null);
                if let Some(existing) = table.find_by_key(key) {
                    if !delta.deleted.contains(&existing) {
                        return Err(EngineError::PrimaryKeyViolation {
                            table: name.clone(),
                            key: key.to_string(),
                        });
                    }
                }
            }
        }

        let mut changed = 0usize;
        let mut saved = Vec::new();
        for (name, delta) in txn.deltas() {
            let Some(table) = state.tables.get_mut(name) else {
                continue;
            };
            saved.extend(self.save_image(name, table));
            for id in &delta.deleted {
                table.rows.remove(id);
            }
            for (id, row) in &delta.updated {
                // A concurrent commit may have deleted the row; its update is lost.
                if let Some(current) = table.rows.get_mut(id) {
                    *current = row.clone();
                }
            }
            for (id, row) in &delta.inserted {
                table.observe_identity(row);
                table.rows.insert(*id, row.clone());
            }
            changed += delta.inserted.len() + delta.updated.len() + delta.deleted.len();
        }

        if changed > 0 {
            self.persist_or_restore(&mut state, saved)?;
        }
        tracing::debug!(txid = %txn.id(), changed, "applied transaction");
        Ok(())
    }

    /// Writes the snapshot; on failure puts each saved table back (`None`
    /// removes a table that did not exist before).
    fn persist_or_restore(
        &self,
        state: &mut StoreState,
        saved: Vec<(String, Option<Table>)>,
    ) -> EngineResult<()> {
        let Err(e) = self.persist(state) else {
            return Ok(());
        };
        let restored = saved.len();
        for (name, image) in saved {
            match image {
                Some(table) => {
                    state.tables.insert(name, table);
                }
                None => {
                    state.tables.remove(&name);
                }
            }
        }
        tracing::warn!(url = %self.url, restored, error = %e, "snapshot write failed, changes undone");
        Err(e)
    }

    /// Copy of a table to restore if the next snapshot write fails. Memory
    /// stores never fail to persist, so they keep nothing.
    fn save_image(&self, name: &str, table: &Table) -> Option<(String, Option<Table>)> {
        self.is_durable()
            .then(|| (name.to_string(), Some(table.clone())))
    }

    #[cfg(feature = "file")]
    fn is_durable(&self) -> bool {
        self.snapshot.is_some()
    }

    #[cfg(not(feature = "file"))]
    fn is_durable(&self) -> bool {
        false
    }

    #[cfg(feature = "file")]
    fn persist(&self, state: &StoreState) -> EngineResult<()> {
        match &self.snapshot {
            Some(snapshot) => {
                snapshot.write(self.next_row_id.load(Ordering::SeqCst), &state.tables)
            }
            None => Ok(()),
        }
    }

    #[cfg(not(feature = "file"))]
    fn persist(&self, _state: &StoreState) -> EngineResult<()> {
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let mut registry = registry().lock();
        if registry
            .get(&self.url)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            registry.remove(&self.url);
        }
        tracing::debug!(url = %self.url, "store released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType, Generation};

    fn unique_url(tag: &str) -> String {
        format!("mem:store-{tag}-{}", uuid::Uuid::new_v4())
    }

    fn schema() -> TableSchema {
        TableSchema::new("people", "id")
            .with_column(
                ColumnDef::new("id", ColumnType::Int)
                    .nullable(false)
                    .generated(Generation::Identity),
            )
            .with_column(ColumnDef::new("name", ColumnType::Text))
    }

    #[test]
    fn memory_stores_are_shared_by_url() {
        let url = unique_url("shared");
        let a = Store::open(&url, StoreOptions::default()).unwrap();
        let b = Store::open(&url, StoreOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = Store::open(&unique_url("other"), StoreOptions::default()).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn memory_store_is_dropped_with_last_handle() {
        let url = unique_url("dropped");
        {
            let store = Store::open(&url, StoreOptions::default()).unwrap();
            store.create_table(&schema()).unwrap();
        }
        let store = Store::open(&url, StoreOptions::default()).unwrap();
        assert!(!store.has_table("people"));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let result = Store::open("jdbc:h2:mem:test", StoreOptions::default());
        assert!(matches!(result, Err(EngineError::InvalidUrl { .. })));
        assert!(Store::open("mem:", StoreOptions::default()).is_err());
    }

    #[test]
    fn create_table_is_idempotent() {
        let store = Store::open(&unique_url("ddl"), StoreOptions::default()).unwrap();
        assert!(store.create_table(&schema()).unwrap());
        assert!(!store.create_table(&schema()).unwrap());

        let changed = schema().with_column(ColumnDef::new("age", ColumnType::Int));
        assert!(matches!(
            store.create_table(&changed),
            Err(EngineError::TableExists { .. })
        ));
    }

    #[test]
    fn update_table_adds_columns() {
        let store = Store::open(&unique_url("update"), StoreOptions::default()).unwrap();
        store.create_table(&schema()).unwrap();
        let wanted = schema().with_column(ColumnDef::new("age", ColumnType::Int));
        let merged = store.update_table(&wanted).unwrap();
        assert!(merged.column("age").is_some());
        assert_eq!(store.table_schema("people").unwrap(), merged);
    }

    #[test]
    fn drop_table_reports_existence() {
        let store = Store::open(&unique_url("drop"), StoreOptions::default()).unwrap();
        store.create_table(&schema()).unwrap();
        assert!(store.drop_table("people").unwrap());
        assert!(!store.drop_table("people").unwrap());
        assert!(matches!(
            store.table_schema("people"),
            Err(EngineError::UnknownTable { .. })
        ));
    }

    #[test]
    fn identity_values_are_not_reused() {
        let store = Store::open(&unique_url("identity"), StoreOptions::default()).unwrap();
        store.create_table(&schema()).unwrap();
        assert_eq!(store.next_identity("people").unwrap(), 1);
        assert_eq!(store.next_identity("people").unwrap(), 2);
    }

    #[cfg(feature = "file")]
    #[test]
    fn file_store_persists_tables() {
        let temp = tempfile::tempdir().unwrap();
        let url = format!("file:{}", temp.path().join("store.db").display());
        {
            let store = Store::open(&url, StoreOptions::default()).unwrap();
            store.create_table(&schema()).unwrap();
        }
        let store = Store::open(&url, StoreOptions::default().create_if_missing(false)).unwrap();
        assert_eq!(store.table_names(), vec!["people".to_string()]);
    }

    #[cfg(feature = "file")]
    fn named(name: &str) -> Row {
        let mut row = Row::new();
        row.insert("name".into(), Value::from(name));
        row
    }

    #[cfg(feature = "file")]
    #[test]
    fn failed_snapshot_write_leaves_store_unchanged() {
        use crate::filter::Filter;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("store.db");
        let store = Store::open(&format!("file:{}", path.display()), StoreOptions::default()).unwrap();
        store.create_table(&schema()).unwrap();

        let mut writer = store.connect();
        writer.begin().unwrap();
        writer.insert("people", named("ada")).unwrap();

        // a directory in the temp file's place makes every snapshot write fail
        let blocker = temp.path().join("store.db.tmp");
        std::fs::create_dir(&blocker).unwrap();

        assert!(matches!(writer.commit(), Err(EngineError::Io(_))));
        let reader = store.connect();
        assert_eq!(reader.count("people", &Filter::new()).unwrap(), 0);

        assert!(matches!(
            writer.insert("people", named("autocommit")),
            Err(EngineError::Io(_))
        ));
        assert_eq!(reader.count("people", &Filter::new()).unwrap(), 0);

        let other = TableSchema::new("pets", "id")
            .with_column(ColumnDef::new("id", ColumnType::Int).nullable(false));
        assert!(store.create_table(&other).is_err());
        assert!(!store.has_table("pets"));
        assert!(store.drop_table("people").is_err());
        assert!(store.has_table("people"));
        let wider = schema().with_column(ColumnDef::new("age", ColumnType::Int));
        assert!(store.update_table(&wider).is_err());
        assert!(store.table_schema("people").unwrap().column("age").is_none());

        std::fs::remove_dir(&blocker).unwrap();
        writer.insert("people", named("grace")).unwrap();
        assert_eq!(reader.count("people", &Filter::new()).unwrap(), 1);
    }
}
