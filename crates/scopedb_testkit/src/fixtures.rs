//! Test fixtures and database helpers.
//!
//! Every fixture opens its own uniquely named store, so tests running in
//! parallel never share rows.

use crate::entities::{TestEntity, TestTable};
use scopedb_core::{Config, Database};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Returns a `mem:` URL no other test uses.
pub fn unique_memory_url() -> String {
    format!("mem:testkit-{}", uuid::Uuid::new_v4())
}

/// Configuration for `url` with [`TestEntity`] and [`TestTable`] registered.
pub fn test_config(url: impl Into<String>) -> Config {
    Config::new()
        .url(url)
        .entity::<TestEntity>()
        .entity::<TestTable>()
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG`. Safe to call from
/// every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database handle.
    pub db: Database,
    url: String,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        init_tracing();
        let url = unique_memory_url();
        Self {
            db: Database::open(test_config(url.clone()))
                .expect("Failed to open in-memory database"),
            url,
            _temp_dir: None,
        }
    }

    /// Creates a new file-backed test database in a temporary directory.
    pub fn file() -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let url = format!("file:{}", temp_dir.path().join("test.scopedb").display());
        Self {
            db: Database::open(test_config(url.clone())).expect("Failed to open file database"),
            url,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the snapshot path if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|d| d.path().join("test.scopedb"))
    }

    /// Opens a second, independent handle on the same store.
    pub fn second_handle(&self) -> Database {
        Database::open(test_config(self.url.clone())).expect("Failed to open second handle")
    }

    /// Closes the handle and opens a new one on the same store.
    ///
    /// For a file store with no other handles open this reloads the snapshot
    /// from disk.
    pub fn reopen(self) -> Self {
        let Self { db, url, _temp_dir } = self;
        drop(db);
        Self {
            db: Database::open(test_config(url.clone())).expect("Failed to reopen database"),
            url,
            _temp_dir,
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with two independent handles on one in-memory store.
pub fn with_two_handles<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Database) -> R,
{
    let test_db = TestDatabase::memory();
    let second = test_db.second_handle();
    f(&test_db.db, &second)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Inserts one committed [`TestEntity`] per label.
    pub fn insert_labels(db: &Database, labels: &[&str]) -> Vec<TestEntity> {
        let mut auto = db.auto::<TestEntity>().expect("TestEntity is registered");
        tracing::debug!(count = labels.len(), "inserting labelled entities");
        labels
            .iter()
            .map(|label| {
                auto.insert(&TestEntity::new(label))
                    .expect("Failed to insert entity")
            })
            .collect()
    }

    /// A database holding entities labelled `t1`, `t2`, `t2`, `t3`.
    pub fn labelled_database() -> TestDatabase {
        let test_db = TestDatabase::memory();
        insert_labels(&test_db, &["t1", "t2", "t2", "t3"]);
        test_db
    }
}
