//! Column resolution: column or property name to canonical property name.

use crate::error::{CoreError, CoreResult};
use crate::metadata::EntityMeta;
use std::collections::HashMap;

/// Maps the names a caller may use for a property to its canonical name.
///
/// Both the property name and the column name resolve. Entries are added
/// identifier first, then per property column before property, so a
/// property name always wins over a column of the same name.
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    entity: String,
    names: HashMap<String, String>,
}

impl ColumnResolver {
    /// Builds the lookup table for an entity.
    #[must_use]
    pub fn new(meta: &EntityMeta) -> Self {
        let mut names = HashMap::new();
        let id = &meta.id().def;
        names.insert(id.property.clone(), id.property.clone());
        names.insert(id.column.clone(), id.property.clone());
        for p in meta.data_properties() {
            names.insert(p.def.column.clone(), p.def.property.clone());
            names.insert(p.def.property.clone(), p.def.property.clone());
        }
        Self {
            entity: meta.name().to_string(),
            names,
        }
    }

    /// Resolves a column or property name.
    ///
    /// # Errors
    ///
    /// `UnresolvedColumn` if the entity has no such column or property.
    pub fn resolve(&self, name: &str) -> CoreResult<&str> {
        self.names
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| CoreError::unresolved_column(&self.entity, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityDescriptor, PropertyDef};
    use scopedb_engine::ColumnType;

    fn resolver() -> ColumnResolver {
        let meta = EntityMeta::from_descriptor(
            &EntityDescriptor::new("TestEntity", "TIMEKEEPER")
                .property(PropertyDef::new("key", ColumnType::Int).id().column("ID"))
                .property(PropertyDef::new("dateTime", ColumnType::Timestamp).column("timestamp"))
                .property(PropertyDef::new("test", ColumnType::Text)),
        )
        .unwrap();
        ColumnResolver::new(&meta)
    }

    #[test]
    fn resolves_properties_and_columns() {
        let r = resolver();
        assert_eq!(r.resolve("key").unwrap(), "key");
        assert_eq!(r.resolve("ID").unwrap(), "key");
        assert_eq!(r.resolve("timestamp").unwrap(), "dateTime");
        assert_eq!(r.resolve("dateTime").unwrap(), "dateTime");
        assert_eq!(r.resolve("test").unwrap(), "test");
    }

    #[test]
    fn unknown_name_fails() {
        let err = resolver().resolve("nope").unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnresolvedColumn { ref name, .. } if name == "nope"
        ));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(resolver().resolve("TEST").is_err());
    }
}
