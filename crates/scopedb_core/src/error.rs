//! Error types for ScopeDB core.

use scopedb_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ScopeDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A predicate named a column or property the entity doesn't have.
    #[error("unresolved column {name} on entity {entity}")]
    UnresolvedColumn {
        /// Entity name.
        entity: String,
        /// The name as supplied.
        name: String,
    },

    /// A predicate used a comparator outside `=`, `>`, `<`, `like`.
    #[error("unsupported comparator: {comparator}")]
    UnsupportedComparator {
        /// The comparator as supplied.
        comparator: String,
    },

    /// Ambient transaction misuse: a second begin, or commit/rollback with
    /// none active. Also raised when committing a rollback-only scope.
    #[error("transaction conflict: {message}")]
    TransactionConflict {
        /// What went wrong.
        message: String,
    },

    /// An operation ran on a query with no transaction.
    #[error("no active transaction for {operation}")]
    NoActiveTransaction {
        /// The operation attempted.
        operation: &'static str,
    },

    /// The scope has already been committed, rolled back or closed.
    #[error("transaction scope {scope} is closed")]
    TransactionClosed {
        /// Scope identifier.
        scope: u64,
    },

    /// A joined scope tried to finish a transaction it doesn't own.
    #[error("transaction scope {scope} does not own its transaction")]
    NotOwner {
        /// Scope identifier.
        scope: u64,
    },

    /// The scope was opened before the session factory was rebuilt.
    #[error("transaction scope {scope} outlived a schema change")]
    StaleSession {
        /// Scope identifier.
        scope: u64,
    },

    /// A unique select matched zero or several rows.
    #[error("expected exactly one {entity}, found {matched}")]
    NotUnique {
        /// Entity name.
        entity: String,
        /// Number of matching rows.
        matched: usize,
    },

    /// The entity type is not registered with the database.
    #[error("unknown entity: {entity}")]
    UnknownEntity {
        /// Entity name.
        entity: String,
    },

    /// The entity descriptor is malformed.
    #[error("invalid entity {entity}: {message}")]
    InvalidEntity {
        /// Entity name.
        entity: String,
        /// What is wrong with it.
        message: String,
    },

    /// A row could not be mapped to or from an entity.
    #[error("mapping error on property {property}: {message}")]
    Mapping {
        /// Property name.
        property: String,
        /// Description of the failure.
        message: String,
    },

    /// The database handle has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// The storage engine rejected the request.
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),
}

impl CoreError {
    /// Creates a transaction conflict error.
    pub fn transaction_conflict(message: impl Into<String>) -> Self {
        Self::TransactionConflict {
            message: message.into(),
        }
    }

    /// Creates an unresolved column error.
    pub fn unresolved_column(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnresolvedColumn {
            entity: entity.into(),
            name: name.into(),
        }
    }

    /// Creates an invalid entity error.
    pub fn invalid_entity(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown entity error.
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self::UnknownEntity {
            entity: entity.into(),
        }
    }

    /// Returns true for programming errors that retrying cannot fix.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedColumn { .. }
                | Self::UnsupportedComparator { .. }
                | Self::TransactionConflict { .. }
                | Self::NoActiveTransaction { .. }
                | Self::TransactionClosed { .. }
                | Self::NotOwner { .. }
                | Self::StaleSession { .. }
                | Self::UnknownEntity { .. }
                | Self::InvalidEntity { .. }
                | Self::DatabaseClosed
        )
    }

    /// Returns the engine error, if this is an engine failure.
    #[must_use]
    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }
}
