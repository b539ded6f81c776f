//! # ScopeDB Engine
//!
//! In-process relational store backing ScopeDB.
//!
//! This crate provides:
//! - Tables with typed columns, a single-column primary key and generated
//!   values (identity, random identifiers, creation timestamps)
//! - Conjunctive filters with `=`, `>=`, `<` and `LIKE`
//! - Connections with read-committed transactions and autocommit
//! - Memory stores shared by URL within a process
//! - File stores persisted as CBOR snapshots (`file` feature)
//!
//! ## Example
//!
//! ```rust
//! use scopedb_engine::{CmpOp, ColumnDef, ColumnType, Filter, Row, Store, StoreOptions, TableSchema, Value};
//!
//! let store = Store::open("mem:engine-doc", StoreOptions::default()).unwrap();
//! store
//!     .create_table(
//!         &TableSchema::new("notes", "id")
//!             .with_column(ColumnDef::new("id", ColumnType::Int).nullable(false))
//!             .with_column(ColumnDef::new("body", ColumnType::Text)),
//!     )
//!     .unwrap();
//!
//! let mut conn = store.connect();
//! let mut row = Row::new();
//! row.insert("id".into(), Value::Int(1));
//! row.insert("body".into(), Value::from("hello"));
//! conn.insert("notes", row).unwrap();
//!
//! let filter = Filter::new().and("body", CmpOp::Like, "he%");
//! assert_eq!(conn.count("notes", &filter).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod filter;
mod schema;
#[cfg(feature = "file")]
mod snapshot;
mod store;
mod table;
mod transaction;
mod types;
mod value;

pub use config::StoreOptions;
pub use connection::Connection;
pub use error::{EngineError, EngineResult};
pub use filter::{like_matches, Assignments, CmpOp, Condition, Filter};
pub use schema::{ColumnDef, ColumnType, Generation, TableSchema};
pub use store::Store;
pub use types::{ConnectionId, RowId, TransactionId};
pub use value::Value;

/// A row: column name to value.
pub type Row = std::collections::BTreeMap<String, Value>;
