//! Database handle configuration.

use crate::entity::{Entity, EntityDescriptor};
use scopedb_engine::StoreOptions;

/// Produces an entity's descriptor.
pub type DescriptorFn = fn() -> EntityDescriptor;

/// Configuration for opening a database handle.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store URL: `mem:<name>` or `file:<path>`.
    pub url: String,

    /// Options passed to the store.
    pub store: StoreOptions,

    /// Whether to log every engine request at debug level.
    pub show_sql: bool,

    /// Entities registered when the handle opens.
    pub entities: Vec<DescriptorFn>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: "mem:scopedb".to_string(),
            store: StoreOptions::default(),
            show_sql: false,
            entities: Vec::new(),
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the store options.
    #[must_use]
    pub fn store(mut self, options: StoreOptions) -> Self {
        self.store = options;
        self
    }

    /// Sets whether engine requests are logged.
    #[must_use]
    pub const fn show_sql(mut self, value: bool) -> Self {
        self.show_sql = value;
        self
    }

    /// Registers an entity type.
    #[must_use]
    pub fn entity<T: Entity>(mut self) -> Self {
        self.entities.push(T::descriptor);
        self
    }
}
