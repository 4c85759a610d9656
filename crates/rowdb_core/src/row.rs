//! The row handle: a typed view over one stored record.
//!
//! A [`Row`] is cheaply cloneable; clones share state, so a field set
//! through one handle is visible through all of them. Rows come in
//! three flavors with different rights: live rows (read/write),
//! archived rows (read-only, restorable when the entity allows it) and
//! history snapshots (strictly read-only).
//!
//! Writes are change-tracked: the first observed original value of
//! every mutated field is retained, and [`Row::save`] skips the store
//! entirely when nothing changed.

use crate::backend::UpsertOptions;
use crate::error::{CoreError, CoreResult};
use crate::registry::{BackendMode, Database};
use crate::rowset::RowSet;
use crate::schema::{ArchiveMode, ColumnKind, EntityDef};
use parking_lot::RwLock;
use rowdb_codec::{FieldMap, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Field name carrying the source row's primary key in a history
/// snapshot.
pub const HISTORY_SOURCE_FIELD: &str = "$PK";
/// Field name carrying the snapshot time, in milliseconds since epoch.
pub const HISTORY_TIMESTAMP_FIELD: &str = "$timestamp";

pub(crate) enum FkCached {
    One(Option<Row>),
    Many(RowSet),
}

pub(crate) struct RowInner {
    /// Raw field data; `None` until fetched.
    pub(crate) data: Option<FieldMap>,
    /// First observed original value per mutated field. Survives a
    /// save, so later saves of an unchanged row stay no-ops only when
    /// the current values match what was last written.
    pub(crate) dirty: BTreeMap<String, Value>,
    pub(crate) archived: bool,
    pub(crate) history: bool,
    pub(crate) subtable: Option<String>,
    pub(crate) fk_cache: HashMap<String, FkCached>,
}

/// Handle to one record of an entity.
#[derive(Clone)]
pub struct Row {
    pub(crate) db: Database,
    pub(crate) def: Arc<EntityDef>,
    pub(crate) inner: Arc<RwLock<RowInner>>,
}

impl Row {
    pub(crate) fn from_fetched(
        db: Database,
        def: Arc<EntityDef>,
        data: Option<FieldMap>,
        archived: bool,
        history: bool,
        subtable: Option<String>,
    ) -> Self {
        Self {
            db,
            def,
            inner: Arc::new(RwLock::new(RowInner {
                data,
                dirty: BTreeMap::new(),
                archived,
                history,
                subtable,
                fk_cache: HashMap::new(),
            })),
        }
    }

    /// Builds a fresh unsaved row. Keyed entities get their primary key
    /// minted immediately; positional list entities receive theirs from
    /// the backend on first save.
    pub(crate) fn create(
        db: Database,
        def: Arc<EntityDef>,
        subtable: Option<String>,
    ) -> CoreResult<Self> {
        let mut data = FieldMap::new();
        if !def.is_list {
            data.insert(def.primary_key.clone(), def.new_id());
        }
        let row = Self::from_fetched(db, def, Some(data), false, false, subtable);
        if let Some(hook) = row.def.hooks.on_create.clone() {
            hook(&row)?;
        }
        Ok(row)
    }

    /// The physical table name, including any sub-table suffix.
    #[must_use]
    pub fn table_name(&self) -> String {
        match &self.inner.read().subtable {
            Some(sub) => format!("{}/{}", self.def.name, sub),
            None => self.def.name.clone(),
        }
    }

    /// Whether the row's data has been fetched.
    #[must_use]
    pub fn is_fetched(&self) -> bool {
        self.inner.read().data.is_some()
    }

    /// Whether this handle points into the archive.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.inner.read().archived
    }

    /// Whether this handle is a history snapshot.
    #[must_use]
    pub fn is_history(&self) -> bool {
        self.inner.read().history
    }

    /// Whether any field was changed since fetch or last explicit
    /// write.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.inner.read().dirty.is_empty()
    }

    fn data_or_err<'a>(
        &self,
        inner: &'a RowInner,
    ) -> CoreResult<&'a FieldMap> {
        inner.data.as_ref().ok_or_else(|| {
            CoreError::invalid_call(format!("row of {} has not been fetched", self.def.name))
        })
    }

    /// The row's primary key value.
    ///
    /// # Errors
    ///
    /// Fails on an unfetched row, or on an unsaved positional-list row
    /// whose key has not been assigned yet.
    pub fn primary_key(&self) -> CoreResult<Value> {
        let inner = self.inner.read();
        let data = self.data_or_err(&inner)?;
        match data.get(&self.def.primary_key) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(CoreError::invalid_call(format!(
                "row of {} has no primary key yet",
                self.def.name
            ))),
        }
    }

    /// Reads a declared column.
    ///
    /// Computed columns are evaluated on the fly. Foreign-key relations
    /// are not values; traverse them with the relation methods instead.
    ///
    /// # Errors
    ///
    /// Fails on an unfetched row, an undeclared column, or a
    /// foreign-key column.
    pub fn get(&self, column: &str) -> CoreResult<Value> {
        let inner = self.inner.read();
        let data = self.data_or_err(&inner)?;
        let col = self.def.column(column).ok_or_else(|| {
            CoreError::invalid_call(format!("{} has no column {column}", self.def.name))
        })?;
        if col.kind == ColumnKind::ForeignKey {
            return Err(CoreError::invalid_call(format!(
                "{column} is a relation; use relation_one/relation_many to traverse it"
            )));
        }
        Ok(self.def.value_of(col, data))
    }

    /// Writes a declared column, recording the original value for
    /// change tracking.
    ///
    /// # Errors
    ///
    /// Fails on history snapshots and archived rows (both read-only),
    /// unfetched rows, undeclared columns, the primary key, computed
    /// columns, and foreign keys (use [`Row::set_relation`]).
    pub fn set(&self, column: &str, value: impl Into<Value>) -> CoreResult<()> {
        let mut inner = self.inner.write();
        if inner.history {
            return Err(CoreError::invalid_call("history snapshots are read-only"));
        }
        if inner.archived {
            return Err(CoreError::invalid_call("archived rows are read-only"));
        }
        self.data_or_err(&inner)?;
        let col = self.def.column(column).ok_or_else(|| {
            CoreError::invalid_call(format!("{} has no column {column}", self.def.name))
        })?;
        match col.kind {
            ColumnKind::PrimaryKey => {
                return Err(CoreError::invalid_call("the primary key cannot be changed"))
            }
            ColumnKind::Computed | ColumnKind::ComputedUnique => {
                return Err(CoreError::invalid_call(format!(
                    "{column} is computed and cannot be set"
                )))
            }
            ColumnKind::ForeignKey => {
                return Err(CoreError::invalid_call(format!(
                    "{column} is a relation; use set_relation/link to change it"
                )))
            }
            _ => {}
        }
        let value = value.into();
        let name = col.name.clone();
        let data = match inner.data.as_mut() {
            Some(data) => data,
            // Checked above.
            None => return Ok(()),
        };
        let original = data.get(&name).cloned().unwrap_or(Value::Null);
        data.insert(name.clone(), value);
        inner.dirty.entry(name).or_insert(original);
        Ok(())
    }

    /// Writes a raw field without change tracking. Used internally for
    /// backend-assigned keys.
    pub(crate) fn set_untracked(&self, field: &str, value: Value) {
        let mut inner = self.inner.write();
        if let Some(data) = inner.data.as_mut() {
            data.insert(field.to_string(), value);
        }
    }

    pub(crate) fn data_snapshot(&self) -> CoreResult<FieldMap> {
        let inner = self.inner.read();
        Ok(self.data_or_err(&inner)?.clone())
    }

    /// Persists the row: a history snapshot first when the entity keeps
    /// history, then the row itself with all index maintenance.
    ///
    /// Returns whether anything was written; a clean row is a no-op
    /// unless `force`.
    ///
    /// # Errors
    ///
    /// Fails on history snapshots and archived rows, on unfetched
    /// rows, and on storage conflicts that outlast the retry budget.
    pub fn save(&self) -> CoreResult<bool> {
        self.save_with(false)
    }

    /// Persists the row even when no field changed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Row::save`].
    pub fn save_forced(&self) -> CoreResult<bool> {
        self.save_with(true)
    }

    fn save_with(&self, force: bool) -> CoreResult<bool> {
        {
            let inner = self.inner.read();
            if inner.history {
                return Err(CoreError::invalid_call("history snapshots are read-only"));
            }
            if inner.archived {
                return Err(CoreError::invalid_call(
                    "archived rows cannot be saved; unarchive first",
                ));
            }
            self.data_or_err(&inner)?;
        }
        if let Some(hook) = self.def.hooks.on_save.clone() {
            hook(self)?;
        }
        let (data, dirty) = {
            let inner = self.inner.read();
            (
                self.data_or_err(&inner)?.clone(),
                !inner.dirty.is_empty(),
            )
        };
        if !dirty && !force {
            return Ok(false);
        }
        let table = self.table_name();
        if self.def.history_backend.is_some() && !self.def.is_list {
            let history = self.db.backend(&self.def, BackendMode::History)?;
            history.upsert(
                &table,
                &self.def,
                &data,
                UpsertOptions {
                    history: true,
                    force: true,
                    dirty: true,
                    insert_only: false,
                },
            )?;
        }
        let backend = self.db.backend(&self.def, BackendMode::Data)?;
        let outcome = backend.upsert(
            &table,
            &self.def,
            &data,
            UpsertOptions {
                force,
                dirty,
                ..UpsertOptions::default()
            },
        )?;
        if let Some(pk) = outcome.assigned_pk {
            let field = self.def.primary_key.clone();
            self.set_untracked(&field, pk);
        }
        debug!(entity = %self.def.name, table = %table, written = outcome.written, "saved row");
        Ok(outcome.written)
    }

    /// Removes the row. When the entity archives deletions, a live row
    /// is moved to the archive instead of being destroyed.
    ///
    /// Returns whether a stored row existed.
    ///
    /// # Errors
    ///
    /// Fails on history snapshots, on archived rows of
    /// [`ArchiveMode::Protected`] entities, and on unfetched rows.
    pub fn delete(&self) -> CoreResult<bool> {
        let archived = {
            let inner = self.inner.read();
            if inner.history {
                return Err(CoreError::invalid_call("history snapshots cannot be deleted"));
            }
            self.data_or_err(&inner)?;
            inner.archived
        };
        if !archived && self.def.archive_mode != ArchiveMode::None {
            self.archive()?;
            return Ok(true);
        }
        if archived && self.def.archive_mode == ArchiveMode::Protected {
            return Err(CoreError::invalid_call(format!(
                "archived rows of {} are protected from deletion",
                self.def.name
            )));
        }
        if let Some(hook) = self.def.hooks.on_delete.clone() {
            hook(self)?;
        }
        let pk = self.primary_key()?.to_string();
        let mode = if archived {
            BackendMode::Archive
        } else {
            BackendMode::Data
        };
        let backend = self.db.backend(&self.def, mode)?;
        let existed = backend.delete(&self.table_name(), &self.def, &pk)?;
        debug!(entity = %self.def.name, pk = %pk, existed, "deleted row");
        Ok(existed)
    }

    /// Moves a live row into the archive.
    ///
    /// # Errors
    ///
    /// Fails when the entity does not archive, on already-archived rows
    /// and history snapshots, and when the archive already holds a row
    /// with this key.
    pub fn archive(&self) -> CoreResult<()> {
        if self.def.archive_mode == ArchiveMode::None {
            return Err(CoreError::invalid_call(format!(
                "entity {} does not archive",
                self.def.name
            )));
        }
        {
            let mut inner = self.inner.write();
            if inner.history {
                return Err(CoreError::invalid_call("history snapshots cannot be archived"));
            }
            if inner.archived {
                return Err(CoreError::invalid_call("row is already archived"));
            }
            self.data_or_err(&inner)?;
            // Flip before the hook so the hook observes the target
            // state, matching unarchive.
            inner.archived = true;
        }
        if let Some(hook) = self.def.hooks.on_archive.clone() {
            if let Err(err) = hook(self) {
                self.inner.write().archived = false;
                return Err(err);
            }
        }
        let data = self.data_snapshot()?;
        let table = self.table_name();
        let archive = self.db.backend(&self.def, BackendMode::Archive)?;
        let outcome = archive.upsert(
            &table,
            &self.def,
            &data,
            UpsertOptions {
                insert_only: true,
                force: true,
                dirty: true,
                history: false,
            },
        )?;
        if !outcome.written {
            self.inner.write().archived = false;
            return Err(CoreError::result_mismatch(format!(
                "archive of {} already holds this key",
                self.def.name
            )));
        }
        let pk = self.primary_key()?.to_string();
        let backend = self.db.backend(&self.def, BackendMode::Data)?;
        backend.delete(&table, &self.def, &pk)?;
        debug!(entity = %self.def.name, pk = %pk, "archived row");
        Ok(())
    }

    /// Restores an archived row into live data.
    ///
    /// # Errors
    ///
    /// Fails unless the entity uses [`ArchiveMode::Active`] and the row
    /// is archived, or when a live row with this key already exists.
    pub fn unarchive(&self) -> CoreResult<()> {
        if self.def.archive_mode != ArchiveMode::Active {
            return Err(CoreError::invalid_call(format!(
                "entity {} does not allow restoring archived rows",
                self.def.name
            )));
        }
        {
            let mut inner = self.inner.write();
            if inner.history {
                return Err(CoreError::invalid_call("history snapshots cannot be restored"));
            }
            if !inner.archived {
                return Err(CoreError::invalid_call("row is not archived"));
            }
            self.data_or_err(&inner)?;
            inner.archived = false;
        }
        if let Some(hook) = self.def.hooks.on_unarchive.clone() {
            if let Err(err) = hook(self) {
                self.inner.write().archived = true;
                return Err(err);
            }
        }
        let data = self.data_snapshot()?;
        let table = self.table_name();
        let backend = self.db.backend(&self.def, BackendMode::Data)?;
        let outcome = backend.upsert(
            &table,
            &self.def,
            &data,
            UpsertOptions {
                insert_only: true,
                force: true,
                dirty: true,
                history: false,
            },
        )?;
        if !outcome.written {
            self.inner.write().archived = true;
            return Err(CoreError::result_mismatch(format!(
                "a live row of {} already holds this key",
                self.def.name
            )));
        }
        let pk = self.primary_key()?.to_string();
        let archive = self.db.backend(&self.def, BackendMode::Archive)?;
        archive.delete(&table, &self.def, &pk)?;
        debug!(entity = %self.def.name, pk = %pk, "restored row");
        Ok(())
    }

    /// Flattens the row into a plain field map: every declared
    /// non-relation column, computed values evaluated.
    ///
    /// # Errors
    ///
    /// Fails on an unfetched row.
    pub fn serialize(&self) -> CoreResult<FieldMap> {
        let inner = self.inner.read();
        let data = self.data_or_err(&inner)?;
        let mut out = FieldMap::new();
        for col in self.def.columns() {
            if col.kind == ColumnKind::ForeignKey {
                continue;
            }
            out.insert(col.name.clone(), self.def.value_of(col, data));
        }
        Ok(out)
    }

    /// Copies matching fields from a plain map into this row through
    /// normal change tracking. Primary-key, computed and relation
    /// columns are skipped; `only` restricts the copy further.
    ///
    /// # Errors
    ///
    /// Propagates the same failures as [`Row::set`].
    pub fn import_from(&self, source: &FieldMap, only: Option<&[&str]>) -> CoreResult<()> {
        for col in self.def.columns() {
            if matches!(
                col.kind,
                ColumnKind::PrimaryKey
                    | ColumnKind::ForeignKey
                    | ColumnKind::Computed
                    | ColumnKind::ComputedUnique
            ) {
                continue;
            }
            if let Some(filter) = only {
                if !filter.contains(&col.name.as_str()) {
                    continue;
                }
            }
            if let Some(value) = source.get(&col.name) {
                self.set(&col.name, value.clone())?;
            }
        }
        Ok(())
    }

    /// Copies this row's plain column values into a mutable map;
    /// `only` restricts the copy to the named columns.
    ///
    /// # Errors
    ///
    /// Fails on an unfetched row.
    pub fn export_to(&self, target: &mut FieldMap, only: Option<&[&str]>) -> CoreResult<()> {
        for (name, value) in self.serialize()? {
            if let Some(filter) = only {
                if !filter.contains(&name.as_str()) {
                    continue;
                }
            }
            target.insert(name, value);
        }
        Ok(())
    }

    /// The snapshot time of a history row, in milliseconds since the
    /// Unix epoch.
    ///
    /// # Errors
    ///
    /// Fails on non-history rows.
    pub fn history_timestamp(&self) -> CoreResult<i64> {
        let inner = self.inner.read();
        if !inner.history {
            return Err(CoreError::invalid_call(
                "history_timestamp is only available on history snapshots",
            ));
        }
        let data = self.data_or_err(&inner)?;
        data.get(HISTORY_TIMESTAMP_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| CoreError::invalid_call("history snapshot carries no timestamp"))
    }

    /// The primary key of the live row a history snapshot was taken
    /// from.
    ///
    /// # Errors
    ///
    /// Fails on non-history rows.
    pub fn history_source_key(&self) -> CoreResult<Value> {
        let inner = self.inner.read();
        if !inner.history {
            return Err(CoreError::invalid_call(
                "history_source_key is only available on history snapshots",
            ));
        }
        let data = self.data_or_err(&inner)?;
        data.get(HISTORY_SOURCE_FIELD)
            .cloned()
            .ok_or_else(|| CoreError::invalid_call("history snapshot carries no source key"))
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Row")
            .field("entity", &self.def.name)
            .field("fetched", &inner.data.is_some())
            .field("archived", &inner.archived)
            .field("history", &inner.history)
            .finish_non_exhaustive()
    }
}
