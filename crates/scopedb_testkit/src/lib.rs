//! # ScopeDB Testkit
//!
//! Test utilities for ScopeDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Reference entities used across the integration suites
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scopedb_testkit::prelude::*;
//!
//! #[test]
//! fn counts_inserted_rows() {
//!     let db = TestDatabase::memory();
//!     db.auto::<TestEntity>().unwrap().insert(&TestEntity::new("t1")).unwrap();
//!     assert_eq!(db.auto::<TestEntity>().unwrap().count().unwrap(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod entities;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::entities::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use entities::*;
pub use fixtures::*;
pub use generators::*;
