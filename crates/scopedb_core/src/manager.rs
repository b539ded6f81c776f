//! Connection management and the session factory.
//!
//! The [`ConnectionManager`] owns the registered entity set and the
//! [`SessionFactory`] built from it. Every change to the entity set rebuilds
//! the factory under a new generation number; scopes opened against an older
//! generation are stale.

use crate::config::Config;
use crate::entity::EntityDescriptor;
use crate::error::{CoreError, CoreResult};
use crate::metadata::EntityMeta;
use scopedb_engine::{Connection, Store};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable snapshot of the registered entities, handing out connections.
#[derive(Debug)]
pub(crate) struct SessionFactory {
    generation: u64,
    store: Arc<Store>,
    show_sql: bool,
    metas: HashMap<String, Arc<EntityMeta>>,
}

impl SessionFactory {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn show_sql(&self) -> bool {
        self.show_sql
    }

    /// Returns the metadata of a registered entity.
    pub(crate) fn meta(&self, entity: &str) -> CoreResult<Arc<EntityMeta>> {
        self.metas
            .get(entity)
            .cloned()
            .ok_or_else(|| CoreError::unknown_entity(entity))
    }

    /// Opens a connection to the store.
    pub(crate) fn open_session(&self) -> Connection {
        self.store.connect()
    }
}

/// Owns the entity set and keeps the session factory consistent with it.
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    store: Arc<Store>,
    show_sql: bool,
    entities: Vec<EntityDescriptor>,
    factory: Option<Arc<SessionFactory>>,
    last_generation: u64,
}

impl ConnectionManager {
    /// Opens the store, brings the configured entities' tables up to date and
    /// builds the first factory.
    pub(crate) fn open(config: &Config) -> CoreResult<Self> {
        let store = Store::open(&config.url, config.store.clone())?;
        let entities: Vec<EntityDescriptor> = config.entities.iter().map(|f| f()).collect();
        for descriptor in &entities {
            let meta = EntityMeta::from_descriptor(descriptor)?;
            store.update_table(&meta.table_schema())?;
        }

        let mut manager = Self {
            store,
            show_sql: config.show_sql,
            entities: Vec::new(),
            factory: None,
            last_generation: 0,
        };
        manager.rebuild(entities)?;
        Ok(manager)
    }

    pub(crate) fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Returns the live factory.
    pub(crate) fn factory(&self) -> CoreResult<Arc<SessionFactory>> {
        self.factory.clone().ok_or(CoreError::DatabaseClosed)
    }

    /// Creates the entity's table and registers the entity.
    pub(crate) fn create_table(&mut self, descriptor: EntityDescriptor) -> CoreResult<()> {
        self.ensure_live()?;
        let meta = EntityMeta::from_descriptor(&descriptor)?;
        self.store.create_table(&meta.table_schema())?;
        self.register(descriptor)
    }

    /// Adds missing columns to the entity's table and registers the entity.
    pub(crate) fn update_table(&mut self, descriptor: EntityDescriptor) -> CoreResult<()> {
        self.ensure_live()?;
        let meta = EntityMeta::from_descriptor(&descriptor)?;
        self.store.update_table(&meta.table_schema())?;
        self.register(descriptor)
    }

    /// Drops the entity's table and unregisters the entity.
    pub(crate) fn delete_table(&mut self, descriptor: &EntityDescriptor) -> CoreResult<()> {
        self.ensure_live()?;
        self.store.drop_table(&descriptor.table)?;
        let remaining = self
            .entities
            .iter()
            .filter(|d| d.name != descriptor.name)
            .cloned()
            .collect();
        self.rebuild(remaining)
    }

    /// Tears down the factory. Later calls fail with `DatabaseClosed`.
    pub(crate) fn shutdown(&mut self) {
        if self.factory.take().is_some() {
            tracing::info!(url = self.store.url(), "session factory closed");
        }
    }

    fn register(&mut self, descriptor: EntityDescriptor) -> CoreResult<()> {
        let mut candidate: Vec<EntityDescriptor> = self
            .entities
            .iter()
            .filter(|d| d.name != descriptor.name)
            .cloned()
            .collect();
        candidate.push(descriptor);
        self.rebuild(candidate)
    }

    /// Builds a factory for `entities` and adopts both only if it succeeds.
    fn rebuild(&mut self, entities: Vec<EntityDescriptor>) -> CoreResult<()> {
        let mut metas = HashMap::with_capacity(entities.len());
        for descriptor in &entities {
            let meta = EntityMeta::from_descriptor(descriptor)?;
            if metas
                .insert(descriptor.name.clone(), Arc::new(meta))
                .is_some()
            {
                return Err(CoreError::invalid_entity(
                    &descriptor.name,
                    "registered more than once",
                ));
            }
        }

        self.last_generation += 1;
        let factory = SessionFactory {
            generation: self.last_generation,
            store: Arc::clone(&self.store),
            show_sql: self.show_sql,
            metas,
        };
        self.factory = Some(Arc::new(factory));
        self.entities = entities;
        tracing::info!(
            generation = self.last_generation,
            entities = self.entities.len(),
            "session factory rebuilt"
        );
        Ok(())
    }

    fn ensure_live(&self) -> CoreResult<()> {
        self.factory.as_ref().map(|_| ()).ok_or(CoreError::DatabaseClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PropertyDef;
    use scopedb_engine::ColumnType;

    fn config() -> Config {
        Config::new().url(format!("mem:manager-{}", uuid::Uuid::new_v4()))
    }

    fn descriptor(name: &str, table: &str) -> EntityDescriptor {
        EntityDescriptor::new(name, table)
            .property(PropertyDef::new("id", ColumnType::Int).id())
            .property(PropertyDef::new("label", ColumnType::Text))
    }

    #[test]
    fn create_table_registers_and_bumps_generation() {
        let mut manager = ConnectionManager::open(&config()).unwrap();
        let before = manager.factory().unwrap().generation();

        manager.create_table(descriptor("Tag", "TAGS")).unwrap();
        let factory = manager.factory().unwrap();
        assert!(factory.generation() > before);
        assert_eq!(factory.meta("Tag").unwrap().table(), "TAGS");
        assert!(manager.store().has_table("TAGS"));
    }

    #[test]
    fn delete_table_unregisters() {
        let mut manager = ConnectionManager::open(&config()).unwrap();
        manager.create_table(descriptor("Tag", "TAGS")).unwrap();
        manager.delete_table(&descriptor("Tag", "TAGS")).unwrap();
        assert!(matches!(
            manager.factory().unwrap().meta("Tag"),
            Err(CoreError::UnknownEntity { .. })
        ));
        assert!(!manager.store().has_table("TAGS"));
    }

    #[test]
    fn invalid_descriptor_leaves_state_unchanged() {
        let mut manager = ConnectionManager::open(&config()).unwrap();
        manager.create_table(descriptor("Tag", "TAGS")).unwrap();
        let generation = manager.factory().unwrap().generation();

        let broken = EntityDescriptor::new("Broken", "BROKEN")
            .property(PropertyDef::new("label", ColumnType::Text));
        assert!(manager.create_table(broken).is_err());
        assert_eq!(manager.factory().unwrap().generation(), generation);
        assert!(manager.factory().unwrap().meta("Tag").is_ok());
    }

    #[test]
    fn shutdown_closes_factory() {
        let mut manager = ConnectionManager::open(&config()).unwrap();
        manager.shutdown();
        assert!(matches!(manager.factory(), Err(CoreError::DatabaseClosed)));
        assert!(matches!(
            manager.create_table(descriptor("Tag", "TAGS")),
            Err(CoreError::DatabaseClosed)
        ));
    }
}
