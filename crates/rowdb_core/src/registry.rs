//! The metadata registry and database handle.
//!
//! Registration is a startup phase: entity schemas are declared and
//! backend connections attached on a [`RegistryBuilder`], then
//! [`RegistryBuilder::initialize`] validates the whole configuration
//! and freezes it into an immutable [`Database`]. Nothing can be added
//! to a live schema.

use crate::backend::Backend;
use crate::error::{CoreError, CoreResult};
use crate::query::Table;
use crate::schema::{ColumnKind, EntityDef, EntitySchema};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Which physical backend a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// The entity's main data backend.
    #[default]
    Data,
    /// The archive backend holding soft-deleted rows.
    Archive,
    /// The append-only history backend.
    History,
}

pub(crate) struct Registry {
    entities: HashMap<String, Arc<EntityDef>>,
    backends: HashMap<String, Arc<dyn Backend>>,
}

/// Accumulates schema declarations and backend attachments.
#[derive(Default)]
pub struct RegistryBuilder {
    schemas: Vec<EntitySchema>,
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an entity schema.
    #[must_use]
    pub fn declare(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Attaches a backend connection under an alias.
    #[must_use]
    pub fn attach_backend(mut self, backend: Arc<dyn Backend>, alias: &str) -> Self {
        self.backends.insert(alias.to_string(), backend);
        self
    }

    /// Attaches a backend connection under the `"default"` alias.
    #[must_use]
    pub fn attach_default(self, backend: Arc<dyn Backend>) -> Self {
        self.attach_backend(backend, "default")
    }

    /// Validates every declaration and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an entity declares no primary
    /// key (or several), when a referenced backend alias has no
    /// connection attached, or when a foreign key targets an unknown
    /// entity.
    pub fn initialize(self) -> CoreResult<Database> {
        let declared: Vec<String> = self.schemas.iter().map(|s| s.name.clone()).collect();
        let mut entities = HashMap::new();

        for schema in &self.schemas {
            let mut pk_columns = schema
                .columns
                .iter()
                .filter(|c| c.kind == ColumnKind::PrimaryKey);
            let primary_key = pk_columns
                .next()
                .ok_or_else(|| {
                    CoreError::config(format!("entity {} has no primary key", schema.name))
                })?
                .name
                .clone();
            if pk_columns.next().is_some() {
                return Err(CoreError::config(format!(
                    "entity {} declares more than one primary key",
                    schema.name
                )));
            }

            let data_backend = self.backends.get(&schema.backend).ok_or_else(|| {
                CoreError::config(format!(
                    "backend alias {} referenced by entity {} is not attached",
                    schema.backend, schema.name
                ))
            })?;
            if schema.archive_mode != crate::schema::ArchiveMode::None
                && !self.backends.contains_key(&schema.archive_backend)
            {
                return Err(CoreError::config(format!(
                    "archive backend alias {} referenced by entity {} is not attached",
                    schema.archive_backend, schema.name
                )));
            }
            if let Some(history) = &schema.history_backend {
                if !self.backends.contains_key(history) {
                    return Err(CoreError::config(format!(
                        "history backend alias {history} referenced by entity {} is not attached",
                        schema.name
                    )));
                }
            }
            for col in &schema.columns {
                if let Some(target) = &col.fk_entity {
                    if !declared.contains(target) {
                        return Err(CoreError::config(format!(
                            "foreign key {}.{} targets undeclared entity {target}",
                            schema.name, col.name
                        )));
                    }
                }
            }

            let def = EntityDef::from_schema(schema, primary_key, data_backend.is_list_type());
            debug!(
                entity = %def.name,
                backend = %def.backend,
                list = def.is_list,
                "registered entity"
            );
            entities.insert(schema.name.clone(), Arc::new(def));
        }

        Ok(Database {
            registry: Arc::new(Registry {
                entities,
                backends: self.backends,
            }),
        })
    }
}

/// Handle to an initialized, read-only registry.
///
/// Cloning is cheap; all clones share the same frozen metadata and
/// backend connections.
#[derive(Clone)]
pub struct Database {
    registry: Arc<Registry>,
}

impl Database {
    /// Returns a typed table handle for an entity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unregistered entity name.
    pub fn table(&self, entity: &str) -> CoreResult<Table> {
        let def = self.entity(entity)?;
        Ok(Table::new(self.clone(), def))
    }

    pub(crate) fn entity(&self, name: &str) -> CoreResult<Arc<EntityDef>> {
        self.registry
            .entities
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::config(format!("entity {name} is not registered")))
    }

    /// Returns the wired backend for an entity and mode.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the corresponding alias was
    /// never attached or the entity has no backend configured for the
    /// requested mode.
    pub(crate) fn backend(
        &self,
        def: &EntityDef,
        mode: BackendMode,
    ) -> CoreResult<Arc<dyn Backend>> {
        let alias = match mode {
            BackendMode::Data => Some(def.backend.as_str()),
            BackendMode::Archive => Some(def.archive_backend.as_str()),
            BackendMode::History => def.history_backend.as_deref(),
        };
        let alias = alias.ok_or_else(|| {
            CoreError::config(format!("no history backend configured for {}", def.name))
        })?;
        self.registry.backends.get(alias).cloned().ok_or_else(|| {
            CoreError::config(format!(
                "no backend attached under alias {alias} for {}",
                def.name
            ))
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("entities", &self.registry.entities.len())
            .field("backends", &self.registry.backends.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvBackend;
    use rowdb_storage::MemoryStore;

    fn memory_backend() -> Arc<dyn Backend> {
        Arc::new(KvBackend::json(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn missing_primary_key_fails_init() {
        let err = RegistryBuilder::new()
            .declare(EntitySchema::new("NoPk").column("a"))
            .attach_default(memory_backend())
            .initialize()
            .unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn duplicate_primary_key_fails_init() {
        let schema = EntitySchema::new("TwoPk").primary_key("A").primary_key("B");
        // Same name would replace; different names collide.
        let err = RegistryBuilder::new()
            .declare(schema)
            .attach_default(memory_backend())
            .initialize()
            .unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn missing_backend_alias_fails_init() {
        let err = RegistryBuilder::new()
            .declare(EntitySchema::new("T").primary_key("ID").backend("elsewhere"))
            .attach_default(memory_backend())
            .initialize()
            .unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn fk_to_undeclared_entity_fails_init() {
        let err = RegistryBuilder::new()
            .declare(
                EntitySchema::new("T")
                    .primary_key("ID")
                    .foreign_key("Other", crate::schema::FkKind::Remote, "Missing"),
            )
            .attach_default(memory_backend())
            .initialize()
            .unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn unknown_entity_lookup_fails() {
        let db = RegistryBuilder::new()
            .declare(EntitySchema::new("T").primary_key("ID"))
            .attach_default(memory_backend())
            .initialize()
            .unwrap();
        assert!(db.table("Nope").is_err());
        assert!(db.table("T").is_ok());
    }

    #[test]
    fn history_backend_requires_attachment() {
        let err = RegistryBuilder::new()
            .declare(
                EntitySchema::new("T")
                    .primary_key("ID")
                    .history_backend("history"),
            )
            .attach_default(memory_backend())
            .initialize()
            .unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
