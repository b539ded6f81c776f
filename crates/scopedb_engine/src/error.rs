//! Error types for the storage engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error while reading or writing a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot file could not be encoded or decoded.
    #[error("snapshot error: {message}")]
    Snapshot {
        /// Description of the codec failure.
        message: String,
    },

    /// Another process holds the store lock.
    #[error("store locked: another process has exclusive access to {path}")]
    Locked {
        /// Path of the locked store.
        path: String,
    },

    /// The store URL could not be understood.
    #[error("invalid store url: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// The store does not exist and creation was disabled.
    #[error("store does not exist: {url}")]
    StoreMissing {
        /// The store URL.
        url: String,
    },

    /// No table with this name exists.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// Table name.
        table: String,
    },

    /// A table with this name already exists with a different definition.
    #[error("table {table} already exists with a different definition")]
    TableExists {
        /// Table name.
        table: String,
    },

    /// The table definition is malformed.
    #[error("invalid schema for table {table}: {message}")]
    InvalidSchema {
        /// Table name.
        table: String,
        /// What is wrong with it.
        message: String,
    },

    /// No column with this name exists in the table.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A value does not fit the column or comparison it is used with.
    #[error("type mismatch on column {column}: {message}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Description of the mismatch.
        message: String,
    },

    /// A textual literal could not be parsed into the column type.
    #[error("invalid literal for column {column}: {message}")]
    InvalidLiteral {
        /// Column name.
        column: String,
        /// Description of the parse failure.
        message: String,
    },

    /// A non-nullable column received a null value.
    #[error("column {column} in table {table} may not be null")]
    NotNull {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Two rows would share a primary key.
    #[error("duplicate primary key {key} in table {table}")]
    PrimaryKeyViolation {
        /// Table name.
        table: String,
        /// Rendered key value.
        key: String,
    },

    /// The column cannot be assigned by a bulk update.
    #[error("column {column} in table {table} cannot be updated")]
    ImmutableColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// The connection has been closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// A transaction is already active on this connection.
    #[error("a transaction is already active on this connection")]
    TransactionActive,

    /// No transaction is active on this connection.
    #[error("no active transaction on this connection")]
    TransactionNotActive,
}

impl EngineError {
    /// Creates a snapshot codec error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Creates an unknown column error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid literal error.
    pub fn invalid_literal(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLiteral {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error was raised by a constraint check.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::NotNull { .. } | Self::PrimaryKeyViolation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = EngineError::unknown_column("TIMEKEEPER", "nope");
        assert_eq!(err.to_string(), "unknown column nope in table TIMEKEEPER");

        let err = EngineError::invalid_literal("uuid", "invalid length");
        assert!(err.to_string().contains("uuid"));
    }

    #[test]
    fn constraint_classification() {
        let err = EngineError::PrimaryKeyViolation {
            table: "t".into(),
            key: "1".into(),
        };
        assert!(err.is_constraint_violation());
        assert!(!EngineError::ConnectionClosed.is_constraint_violation());
    }
}
