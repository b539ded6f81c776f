//! # ScopeDB Core
//!
//! Typed predicate queries and scoped transactions over a ScopeDB store.
//!
//! This crate provides:
//! - Entity mapping: application types described as tables of properties
//! - Column resolution by property or column name
//! - Predicate accumulation with `=`, `>`, `<` and `like`
//! - Queries: select, unique select, count, insert, bulk update, bulk delete
//! - Ambient, per-operation and explicit transaction scopes
//! - A database handle that keeps its session factory in step with the
//!   registered entities
//!
//! ## Example
//!
//! ```rust
//! use scopedb_core::{ColumnType, Config, CoreResult, Database, Entity, EntityDescriptor, Generation, PropertyDef, PropertyValues};
//!
//! struct Note {
//!     id: Option<i64>,
//!     body: String,
//! }
//!
//! impl Entity for Note {
//!     fn descriptor() -> EntityDescriptor {
//!         EntityDescriptor::new("Note", "NOTES")
//!             .property(PropertyDef::new("id", ColumnType::Int).id().generated(Generation::Identity))
//!             .property(PropertyDef::new("body", ColumnType::Text))
//!     }
//!
//!     fn to_values(&self) -> PropertyValues {
//!         PropertyValues::new().with("id", self.id).with("body", self.body.as_str())
//!     }
//!
//!     fn from_values(values: PropertyValues) -> CoreResult<Self> {
//!         Ok(Self { id: values.opt_int("id")?, body: values.text("body")? })
//!     }
//! }
//!
//! let db = Database::open(Config::new().url("mem:core-doc").entity::<Note>()).unwrap();
//! db.auto::<Note>().unwrap().insert(&Note { id: None, body: "hello".into() }).unwrap();
//!
//! let tx = db.transaction::<Note>().unwrap();
//! tx.insert(&Note { id: None, body: "world".into() }).unwrap();
//! tx.close().unwrap();
//!
//! let mut query = db.auto::<Note>().unwrap();
//! assert_eq!(query.where_cmp("body", "like", "h%").unwrap().count().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auto;
mod config;
mod database;
mod entity;
mod error;
mod manager;
mod metadata;
mod predicate;
mod query;
mod resolver;
mod scope;

pub use auto::AutoQuery;
pub use config::{Config, DescriptorFn};
pub use database::Database;
pub use entity::{Entity, EntityDescriptor, PropertyDef, PropertyValues};
pub use error::{CoreError, CoreResult};
pub use metadata::{Coercion, EntityMeta, PropertyMeta};
pub use predicate::{Comparator, PredicateSet};
pub use query::{Query, TransactionalQuery};
pub use resolver::ColumnResolver;
pub use scope::{ScopeMode, ScopeState, TransactionOptions};

pub use scopedb_engine::{ColumnType, Generation, StoreOptions, Value};
