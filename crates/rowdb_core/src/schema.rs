//! Schema declaration: column descriptors and the entity schema builder.
//!
//! Schemas are declared as plain values before the registry is
//! initialized; there is no runtime reflection. A schema names its
//! columns (with their index kinds), foreign keys, backend aliases,
//! archive/history configuration, and lifecycle hooks. Composition via
//! [`EntitySchema::extends`] flattens a base schema's columns into the
//! derived schema once, at declaration time.

use crate::error::{CoreError, CoreResult};
use crate::row::Row;
use rowdb_codec::{FieldMap, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The index kind of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Stored, not indexed.
    Plain,
    /// Secondary key: non-unique, multi-match lookup.
    Key,
    /// Unique key: direct single-row lookup.
    Unique,
    /// Primary key. Exactly one per entity.
    PrimaryKey,
    /// Foreign key; see [`FkKind`].
    ForeignKey,
    /// Derived by a function over the row, indexed like a secondary key.
    Computed,
    /// Derived by a function over the row, indexed like a unique key.
    ComputedUnique,
}

/// The relationship kind of a foreign-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkKind {
    /// Many remote rows reference this row; resolves to a row set.
    Local,
    /// At most one remote row references this row; resolves to a row.
    LocalSingle,
    /// This row stores a reference to exactly one remote row.
    Remote,
    /// This row stores a set of references to remote rows.
    RemoteMulti,
}

/// What happens to deleted rows of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// Rows are deleted outright.
    #[default]
    None,
    /// Deletes redirect to the archive; archived rows are read-only.
    Protected,
    /// Deletes redirect to the archive; archived rows can be restored.
    Active,
}

/// A pure function deriving a computed column's value from raw row data.
pub type ComputedFn = Arc<dyn Fn(&FieldMap) -> Value + Send + Sync>;

/// A lifecycle hook invoked with the row being operated on.
pub type Hook = Arc<dyn Fn(&Row) -> CoreResult<()> + Send + Sync>;

/// A generator for fresh primary keys.
pub type IdGenerator = Arc<dyn Fn() -> Value + Send + Sync>;

/// One declared column.
#[derive(Clone)]
pub struct ColumnDef {
    /// Column name. For foreign keys this is the relation name; the
    /// stored id field is [`ColumnDef::fk_id_field`].
    pub name: String,
    /// Index kind.
    pub kind: ColumnKind,
    /// The column holds a set of indexable values instead of one.
    pub is_array: bool,
    /// Target entity name, for foreign keys.
    pub fk_entity: Option<String>,
    /// Relationship kind, for foreign keys.
    pub fk_kind: Option<FkKind>,
    /// The FK relation name on the remote side, for `local` and
    /// `localSingle` relations.
    pub fk_remote_property: Option<String>,
    pub(crate) computed: Option<ComputedFn>,
}

impl ColumnDef {
    fn plain(name: &str, kind: ColumnKind, is_array: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            is_array,
            fk_entity: None,
            fk_kind: None,
            fk_remote_property: None,
            computed: None,
        }
    }

    /// The raw field holding this foreign key's stored id(s).
    #[must_use]
    pub fn fk_id_field(&self) -> String {
        format!("{}_ID", self.name)
    }

    /// Whether the column feeds a secondary (multi-match) index.
    #[must_use]
    pub const fn is_secondary(&self) -> bool {
        matches!(self.kind, ColumnKind::Key | ColumnKind::Computed)
    }

    /// Whether the column feeds a unique index.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        matches!(self.kind, ColumnKind::Unique | ColumnKind::ComputedUnique)
    }

    /// Whether the column is a foreign key that stores ids locally
    /// (`remote` or `remoteMulti`), and therefore feeds an FK index.
    #[must_use]
    pub fn stores_fk_ids(&self) -> bool {
        matches!(self.fk_kind, Some(FkKind::Remote | FkKind::RemoteMulti))
    }
}

impl fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_array", &self.is_array)
            .field("fk_entity", &self.fk_entity)
            .field("fk_kind", &self.fk_kind)
            .finish_non_exhaustive()
    }
}

/// Lifecycle hooks of an entity.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub on_create: Option<Hook>,
    pub on_save: Option<Hook>,
    pub on_delete: Option<Hook>,
    pub on_archive: Option<Hook>,
    pub on_unarchive: Option<Hook>,
}

/// A declarative entity schema, accumulated before initialization.
///
/// ```
/// use rowdb_core::{EntitySchema, FkKind};
///
/// let company = EntitySchema::new("Company")
///     .primary_key("ID")
///     .unique_column("companyName")
///     .key_column("address")
///     .column("value")
///     .foreign_key("NewOwner", FkKind::Remote, "Owner");
/// ```
#[derive(Clone)]
pub struct EntitySchema {
    pub(crate) name: String,
    pub(crate) columns: Vec<ColumnDef>,
    pub(crate) backend: String,
    pub(crate) archive_backend: String,
    pub(crate) archive_mode: ArchiveMode,
    pub(crate) history_backend: Option<String>,
    pub(crate) hooks: Hooks,
    pub(crate) id_generator: Option<IdGenerator>,
}

impl EntitySchema {
    /// Starts a schema for the named entity type.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            backend: "default".to_string(),
            archive_backend: "archive".to_string(),
            archive_mode: ArchiveMode::None,
            history_backend: None,
            hooks: Hooks::default(),
            id_generator: None,
        }
    }

    /// Flattens `base`'s columns (and, where unset here, its hooks and
    /// id generator) into this schema. A derived column with the same
    /// name replaces the base declaration.
    #[must_use]
    pub fn extends(mut self, base: &EntitySchema) -> Self {
        let own = std::mem::take(&mut self.columns);
        self.columns = base.columns.clone();
        for col in own {
            self.upsert_column(col);
        }
        if self.hooks.on_create.is_none() {
            self.hooks.on_create = base.hooks.on_create.clone();
        }
        if self.hooks.on_save.is_none() {
            self.hooks.on_save = base.hooks.on_save.clone();
        }
        if self.hooks.on_delete.is_none() {
            self.hooks.on_delete = base.hooks.on_delete.clone();
        }
        if self.hooks.on_archive.is_none() {
            self.hooks.on_archive = base.hooks.on_archive.clone();
        }
        if self.hooks.on_unarchive.is_none() {
            self.hooks.on_unarchive = base.hooks.on_unarchive.clone();
        }
        if self.id_generator.is_none() {
            self.id_generator = base.id_generator.clone();
        }
        self
    }

    fn upsert_column(&mut self, col: ColumnDef) {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == col.name) {
            *existing = col;
        } else {
            self.columns.push(col);
        }
    }

    /// Declares the primary-key column.
    #[must_use]
    pub fn primary_key(mut self, name: &str) -> Self {
        self.upsert_column(ColumnDef::plain(name, ColumnKind::PrimaryKey, false));
        self
    }

    /// Declares a plain stored column.
    #[must_use]
    pub fn column(mut self, name: &str) -> Self {
        self.upsert_column(ColumnDef::plain(name, ColumnKind::Plain, false));
        self
    }

    /// Declares a secondary-key column.
    #[must_use]
    pub fn key_column(mut self, name: &str) -> Self {
        self.upsert_column(ColumnDef::plain(name, ColumnKind::Key, false));
        self
    }

    /// Declares an array-valued secondary-key column.
    #[must_use]
    pub fn key_array(mut self, name: &str) -> Self {
        self.upsert_column(ColumnDef::plain(name, ColumnKind::Key, true));
        self
    }

    /// Declares a unique-key column.
    #[must_use]
    pub fn unique_column(mut self, name: &str) -> Self {
        self.upsert_column(ColumnDef::plain(name, ColumnKind::Unique, false));
        self
    }

    /// Declares an array-valued unique-key column.
    #[must_use]
    pub fn unique_array(mut self, name: &str) -> Self {
        self.upsert_column(ColumnDef::plain(name, ColumnKind::Unique, true));
        self
    }

    /// Declares a computed column, secondary-indexed unless `unique`.
    #[must_use]
    pub fn computed(
        mut self,
        name: &str,
        unique: bool,
        func: impl Fn(&FieldMap) -> Value + Send + Sync + 'static,
    ) -> Self {
        let kind = if unique {
            ColumnKind::ComputedUnique
        } else {
            ColumnKind::Computed
        };
        let mut col = ColumnDef::plain(name, kind, false);
        col.computed = Some(Arc::new(func));
        self.upsert_column(col);
        self
    }

    /// Declares a foreign-key relation to `target`.
    ///
    /// For `local`/`localSingle` kinds the remote side's relation name
    /// defaults to this entity's own name; override it with
    /// [`EntitySchema::foreign_key_via`].
    #[must_use]
    pub fn foreign_key(self, name: &str, kind: FkKind, target: &str) -> Self {
        let remote = self.name.clone();
        self.foreign_key_via(name, kind, target, &remote)
    }

    /// Declares a foreign-key relation with an explicit remote
    /// relation name.
    #[must_use]
    pub fn foreign_key_via(mut self, name: &str, kind: FkKind, target: &str, remote: &str) -> Self {
        let mut col = ColumnDef::plain(name, ColumnKind::ForeignKey, kind == FkKind::RemoteMulti);
        col.fk_entity = Some(target.to_string());
        col.fk_kind = Some(kind);
        col.fk_remote_property = Some(remote.to_string());
        self.upsert_column(col);
        self
    }

    /// Selects the data backend alias (default `"default"`).
    #[must_use]
    pub fn backend(mut self, alias: &str) -> Self {
        self.backend = alias.to_string();
        self
    }

    /// Selects the archive backend alias (default `"archive"`).
    #[must_use]
    pub fn archive_backend(mut self, alias: &str) -> Self {
        self.archive_backend = alias.to_string();
        self
    }

    /// Sets the archive mode (default [`ArchiveMode::None`]).
    #[must_use]
    pub fn archive_mode(mut self, mode: ArchiveMode) -> Self {
        self.archive_mode = mode;
        self
    }

    /// Enables history snapshots through the given backend alias.
    #[must_use]
    pub fn history_backend(mut self, alias: &str) -> Self {
        self.history_backend = Some(alias.to_string());
        self
    }

    /// Installs the creation hook, run when a fresh row is constructed.
    #[must_use]
    pub fn on_create(mut self, hook: impl Fn(&Row) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.on_create = Some(Arc::new(hook));
        self
    }

    /// Installs the pre-save hook.
    #[must_use]
    pub fn on_save(mut self, hook: impl Fn(&Row) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.on_save = Some(Arc::new(hook));
        self
    }

    /// Installs the pre-delete hook.
    #[must_use]
    pub fn on_delete(mut self, hook: impl Fn(&Row) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.on_delete = Some(Arc::new(hook));
        self
    }

    /// Installs the pre-archive hook.
    #[must_use]
    pub fn on_archive(mut self, hook: impl Fn(&Row) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.on_archive = Some(Arc::new(hook));
        self
    }

    /// Installs the pre-unarchive hook.
    #[must_use]
    pub fn on_unarchive(
        mut self,
        hook: impl Fn(&Row) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_unarchive = Some(Arc::new(hook));
        self
    }

    /// Overrides primary-key generation (default: random UUID text).
    #[must_use]
    pub fn id_generator(mut self, gen: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.id_generator = Some(Arc::new(gen));
        self
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("backend", &self.backend)
            .field("archive_mode", &self.archive_mode)
            .finish_non_exhaustive()
    }
}

/// Frozen per-entity metadata, produced by registry initialization.
pub struct EntityDef {
    /// Entity type name; doubles as the base table name.
    pub name: String,
    pub(crate) columns: Vec<ColumnDef>,
    by_name: HashMap<String, usize>,
    /// Name of the primary-key column.
    pub primary_key: String,
    /// Data backend alias.
    pub backend: String,
    /// Archive backend alias.
    pub archive_backend: String,
    /// Archive mode.
    pub archive_mode: ArchiveMode,
    /// History backend alias, if history is enabled.
    pub history_backend: Option<String>,
    /// Whether the data backend is list-typed (positional keys).
    pub is_list: bool,
    pub(crate) hooks: Hooks,
    id_generator: Option<IdGenerator>,
}

impl EntityDef {
    pub(crate) fn from_schema(
        schema: &EntitySchema,
        primary_key: String,
        is_list: bool,
    ) -> Self {
        let by_name = schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            name: schema.name.clone(),
            columns: schema.columns.clone(),
            by_name,
            primary_key,
            backend: schema.backend.clone(),
            archive_backend: schema.archive_backend.clone(),
            archive_mode: schema.archive_mode,
            history_backend: schema.history_backend.clone(),
            is_list,
            hooks: schema.hooks.clone(),
            id_generator: schema.id_generator.clone(),
        }
    }

    /// All declared columns, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    /// The value a column contributes to reads and indexes: computed
    /// columns are evaluated, foreign keys read their stored id field,
    /// everything else reads the raw field.
    #[must_use]
    pub fn value_of(&self, col: &ColumnDef, data: &FieldMap) -> Value {
        match col.kind {
            ColumnKind::Computed | ColumnKind::ComputedUnique => col
                .computed
                .as_ref()
                .map_or(Value::Null, |f| f(data)),
            ColumnKind::ForeignKey => data
                .get(&col.fk_id_field())
                .cloned()
                .unwrap_or(Value::Null),
            _ => data.get(&col.name).cloned().unwrap_or(Value::Null),
        }
    }

    /// Mints a fresh primary key.
    #[must_use]
    pub fn new_id(&self) -> Value {
        self.id_generator.as_ref().map_or_else(
            || Value::Text(uuid::Uuid::new_v4().to_string()),
            |gen| gen(),
        )
    }
}

impl fmt::Debug for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDef")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("backend", &self.backend)
            .field("archive_mode", &self.archive_mode)
            .field("is_list", &self.is_list)
            .finish_non_exhaustive()
    }
}
