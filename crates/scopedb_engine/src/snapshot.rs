//! File-backed persistence.
//!
//! A `file:` store keeps its committed state in a single CBOR snapshot:
//!
//! ```text
//! <path>        # committed tables, rewritten after each commit and DDL
//! <path>.lock   # advisory lock for single-process access
//! <path>.tmp    # temporary file for atomic rewrites
//! ```

use crate::error::{EngineError, EngineResult};
use crate::table::Table;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Current snapshot format version.
const FORMAT_VERSION: u16 = 1;

/// Serialized committed state of a store.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotData {
    pub(crate) format_version: u16,
    pub(crate) next_row_id: u64,
    pub(crate) tables: BTreeMap<String, Table>,
}

/// An exclusively locked snapshot file.
#[derive(Debug)]
pub(crate) struct SnapshotFile {
    path: PathBuf,
    sync_on_commit: bool,
    /// Held for exclusive access; released when dropped.
    _lock_file: File,
}

impl SnapshotFile {
    /// Locks the snapshot at `path`, creating its parent directory if allowed.
    pub(crate) fn open(path: &Path, create_if_missing: bool, sync_on_commit: bool) -> EngineResult<Self> {
        if !path.exists() && !create_if_missing {
            return Err(EngineError::StoreMissing {
                url: format!("file:{}", path.display()),
            });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = sibling(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_commit,
            _lock_file: lock_file,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot. Returns `None` for a new store.
    pub(crate) fn load(&self) -> EngineResult<Option<SnapshotData>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        let data: SnapshotData = ciborium::from_reader(BufReader::new(file))
            .map_err(|e| EngineError::snapshot(e.to_string()))?;
        if data.format_version != FORMAT_VERSION {
            return Err(EngineError::snapshot(format!(
                "unsupported format version {}",
                data.format_version
            )));
        }
        Ok(Some(data))
    }

    /// Replaces the snapshot atomically: write a temp file, then rename it.
    pub(crate) fn write(&self, next_row_id: u64, tables: &BTreeMap<String, Table>) -> EngineResult<()> {
        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            format_version: u16,
            next_row_id: u64,
            tables: &'a BTreeMap<String, Table>,
        }

        let temp_path = sibling(&self.path, "tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        ciborium::into_writer(
            &SnapshotRef {
                format_version: FORMAT_VERSION,
                next_row_id,
                tables,
            },
            &mut writer,
        )
        .map_err(|e| EngineError::snapshot(e.to_string()))?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| EngineError::Io(e.into_error()))?;
        if self.sync_on_commit {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType, TableSchema};
    use tempfile::tempdir;

    fn tables() -> BTreeMap<String, Table> {
        let schema = TableSchema::new("t", "id").with_column(ColumnDef::new("id", ColumnType::Int));
        let mut tables = BTreeMap::new();
        tables.insert("t".to_string(), Table::new(schema));
        tables
    }

    #[test]
    fn new_store_has_no_snapshot() {
        let temp = tempdir().unwrap();
        let file = SnapshotFile::open(&temp.path().join("db"), true, false).unwrap();
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn missing_store_without_create_fails() {
        let temp = tempdir().unwrap();
        let result = SnapshotFile::open(&temp.path().join("db"), false, false);
        assert!(matches!(result, Err(EngineError::StoreMissing { .. })));
    }

    #[test]
    fn written_snapshot_is_loaded() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("db");
        {
            let file = SnapshotFile::open(&path, true, true).unwrap();
            file.write(42, &tables()).unwrap();
        }
        let file = SnapshotFile::open(&path, false, false).unwrap();
        let data = file.load().unwrap().unwrap();
        assert_eq!(data.next_row_id, 42);
        assert!(data.tables.contains_key("t"));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("db");
        let _first = SnapshotFile::open(&path, true, false).unwrap();
        let second = SnapshotFile::open(&path, true, false);
        assert!(matches!(second, Err(EngineError::Locked { .. })));
    }
}
