//! Table handles and index accessors.
//!
//! A [`Table`] is the entry point for everything per-entity: creating
//! rows, fetching by primary key, and querying the declared secondary
//! and unique indexes. Read accessors return [`Deferred`] values, so a
//! lookup chain costs nothing until it is resolved.

use crate::deferred::Deferred;
use crate::error::{CoreError, CoreResult};
use crate::registry::{BackendMode, Database};
use crate::row::Row;
use crate::rowset::RowSet;
use crate::schema::{ColumnKind, EntityDef};
use rowdb_codec::{FieldMap, Value};
use std::sync::Arc;

fn table_of(def: &EntityDef, sub: Option<&str>) -> String {
    match sub {
        Some(sub) => format!("{}/{sub}", def.name),
        None => def.name.clone(),
    }
}

fn rows_from(
    db: &Database,
    def: &Arc<EntityDef>,
    mode: BackendMode,
    sub: Option<&String>,
    fetched: Vec<Option<FieldMap>>,
) -> RowSet {
    let rows = fetched
        .into_iter()
        .flatten()
        .map(|data| {
            Row::from_fetched(
                db.clone(),
                Arc::clone(def),
                Some(data),
                mode == BackendMode::Archive,
                mode == BackendMode::History,
                sub.cloned(),
            )
        })
        .collect();
    RowSet::new(rows)
}

fn dedup_preserving(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Handle to one entity's tables.
///
/// The handle addresses the live data by default; [`Table::archive`],
/// [`Table::history`] and [`Table::sub`] narrow it to the archive, the
/// history store, or a named sub-table.
#[derive(Debug, Clone)]
pub struct Table {
    db: Database,
    def: Arc<EntityDef>,
    mode: BackendMode,
    sub: Option<String>,
}

impl Table {
    pub(crate) fn new(db: Database, def: Arc<EntityDef>) -> Self {
        Self {
            db,
            def,
            mode: BackendMode::Data,
            sub: None,
        }
    }

    /// The entity type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Addresses the archive of this entity.
    #[must_use]
    pub fn archive(mut self) -> Self {
        self.mode = BackendMode::Archive;
        self
    }

    /// Addresses the history store of this entity.
    #[must_use]
    pub fn history(mut self) -> Self {
        self.mode = BackendMode::History;
        self
    }

    /// Addresses a named sub-table sharing this entity's schema.
    #[must_use]
    pub fn sub(mut self, name: &str) -> Self {
        self.sub = Some(name.to_string());
        self
    }

    fn ensure_live(&self, what: &str) -> CoreResult<()> {
        if self.mode == BackendMode::Data {
            Ok(())
        } else {
            Err(CoreError::invalid_call(format!(
                "{what} only operates on live data, not archive or history"
            )))
        }
    }

    /// Builds a fresh unsaved row of this entity.
    ///
    /// # Errors
    ///
    /// Fails on archive/history handles and when the creation hook
    /// rejects the row.
    pub fn create(&self) -> CoreResult<Row> {
        self.ensure_live("create")?;
        Row::create(self.db.clone(), Arc::clone(&self.def), self.sub.clone())
    }

    /// Builds a fresh unsaved row in a named sub-table. Shorthand for
    /// `table.sub(name).create()`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Table::create`].
    pub fn create_in(&self, sub: &str) -> CoreResult<Row> {
        self.clone().sub(sub).create()
    }

    /// Builds a fresh row populated from a plain field map, through
    /// normal change tracking. Primary-key, computed and relation
    /// fields in the map are ignored.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Table::create`].
    pub fn from_object(&self, source: &FieldMap) -> CoreResult<Row> {
        let row = self.create()?;
        row.import_from(source, None)?;
        Ok(row)
    }

    /// Builds a fresh row carrying a caller-chosen primary key, then
    /// populates it from the map.
    ///
    /// # Errors
    ///
    /// Fails on positional list entities, whose keys are always
    /// backend-assigned, and under the [`Table::create`] conditions.
    pub fn from_object_with_pk(&self, pk: Value, source: &FieldMap) -> CoreResult<Row> {
        if self.def.is_list {
            return Err(CoreError::invalid_call(format!(
                "list entity {} assigns its own primary keys",
                self.def.name
            )));
        }
        let row = self.create()?;
        row.set_untracked(&self.def.primary_key.clone(), pk);
        row.import_from(source, None)?;
        Ok(row)
    }

    /// Fetches every row of the addressed table.
    pub fn all(&self) -> Deferred<RowSet> {
        let (db, def, mode, sub) = self.parts();
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let rows = backend.all(&table)?;
            Ok(rows_from(&db, &def, mode, sub.as_ref(), rows.into_iter().map(Some).collect()))
        })
    }

    /// Accessor for the primary-key index.
    #[must_use]
    pub fn primary_key(&self) -> PkAccessor {
        let (db, def, mode, sub) = self.parts();
        PkAccessor { db, def, mode, sub }
    }

    /// Accessor for a secondary (multi-match) index.
    ///
    /// Accepts declared key and computed columns, and the stored id
    /// field of an id-holding foreign key (`<relation>_ID`). On a
    /// history handle every indexed column queries this way.
    ///
    /// # Errors
    ///
    /// Fails when the column feeds no usable secondary index.
    pub fn key(&self, column: &str) -> CoreResult<KeyAccessor> {
        let name = self.secondary_column(column)?;
        let (db, def, mode, sub) = self.parts();
        Ok(KeyAccessor {
            db,
            def,
            mode,
            sub,
            column: name,
        })
    }

    /// Accessor for a unique index.
    ///
    /// # Errors
    ///
    /// Fails when the column is not unique-indexed, or on a history
    /// handle (history queries go through [`Table::key`]).
    pub fn unique(&self, column: &str) -> CoreResult<UniqueAccessor> {
        if self.mode == BackendMode::History {
            return Err(CoreError::invalid_call(
                "history stores have no unique indexes; query them with key()",
            ));
        }
        let col = self.def.column(column).ok_or_else(|| {
            CoreError::config(format!("{} has no column {column}", self.def.name))
        })?;
        if !col.is_unique() {
            return Err(CoreError::config(format!(
                "{}.{column} is not unique-indexed",
                self.def.name
            )));
        }
        let (db, def, mode, sub) = self.parts();
        Ok(UniqueAccessor {
            db,
            def,
            mode,
            sub,
            column: column.to_string(),
        })
    }

    /// Drops and rebuilds this table's secondary and unique indexes
    /// from its stored rows.
    ///
    /// # Errors
    ///
    /// Fails on backends that cannot rebuild (positional lists) and on
    /// storage errors.
    pub fn reindex(&self) -> CoreResult<()> {
        let backend = self.db.backend(&self.def, self.mode)?;
        backend.reindex(&table_of(&self.def, self.sub.as_deref()), &self.def)
    }

    fn secondary_column(&self, column: &str) -> CoreResult<String> {
        if let Some(col) = self.def.column(column) {
            let history = self.mode == BackendMode::History;
            let usable = col.is_secondary()
                || (history
                    && (col.is_unique() || col.kind == ColumnKind::PrimaryKey));
            if usable {
                return Ok(col.name.clone());
            }
            if col.kind == ColumnKind::ForeignKey {
                return Err(CoreError::config(format!(
                    "{}.{column} is a relation; query its id field {}",
                    self.def.name,
                    col.fk_id_field()
                )));
            }
        }
        // Stored id fields of id-holding foreign keys are indexed too.
        if let Some(relation) = column.strip_suffix("_ID") {
            if let Some(col) = self.def.column(relation) {
                if col.stores_fk_ids() {
                    return Ok(column.to_string());
                }
            }
        }
        Err(CoreError::config(format!(
            "{}.{column} is not key-indexed",
            self.def.name
        )))
    }

    fn parts(&self) -> (Database, Arc<EntityDef>, BackendMode, Option<String>) {
        (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
        )
    }
}

/// Primary-key lookups.
#[derive(Debug, Clone)]
pub struct PkAccessor {
    db: Database,
    def: Arc<EntityDef>,
    mode: BackendMode,
    sub: Option<String>,
}

impl PkAccessor {
    /// Fetches one row by primary key.
    pub fn get(&self, id: impl Into<Value>) -> Deferred<Option<Row>> {
        let (db, def, mode, sub) = (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
        );
        let id = id.into();
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let fetched = backend.get(&table, &[id.to_string()])?;
            Ok(rows_from(&db, &def, mode, sub.as_ref(), fetched)
                .into_iter()
                .next())
        })
    }

    /// Fetches many rows by primary key; missing keys are skipped and
    /// duplicates collapsed, preserving order.
    pub fn get_many(&self, ids: Vec<Value>) -> Deferred<RowSet> {
        let (db, def, mode, sub) = (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
        );
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let ids = dedup_preserving(ids.iter().map(Value::to_string).collect());
            let fetched = backend.get(&table, &ids)?;
            Ok(rows_from(&db, &def, mode, sub.as_ref(), fetched))
        })
    }

    /// Fetches a contiguous range of rows by position. Negative bounds
    /// count from the tail; both bounds are inclusive. Only positional
    /// list entities support this.
    pub fn get_range(&self, start: i64, end: i64) -> Deferred<RowSet> {
        let (db, def, mode, sub) = (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
        );
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let rows = backend.get_range(&table, start, end)?;
            Ok(rows_from(
                &db,
                &def,
                mode,
                sub.as_ref(),
                rows.into_iter().map(Some).collect(),
            ))
        })
    }
}

/// Secondary-index lookups: non-unique, multi-match.
#[derive(Debug, Clone)]
pub struct KeyAccessor {
    db: Database,
    def: Arc<EntityDef>,
    mode: BackendMode,
    sub: Option<String>,
    column: String,
}

impl KeyAccessor {
    /// Fetches every row whose indexed value matches the query. An
    /// array query matches any of its elements, deduplicated.
    pub fn find(&self, query: impl Into<Value>) -> Deferred<RowSet> {
        let (db, def, mode, sub, column) = (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
            self.column.clone(),
        );
        let query = query.into();
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let values: Vec<Value> = match query {
                Value::Array(items) => items,
                other => vec![other],
            };
            let mut ids = Vec::new();
            for value in &values {
                ids.extend(backend.find_index(&table, &column, value)?);
            }
            let ids = dedup_preserving(ids);
            let fetched = backend.get(&table, &ids)?;
            Ok(rows_from(&db, &def, mode, sub.as_ref(), fetched))
        })
    }

    /// Fetches the single row matching the query.
    ///
    /// Resolving fails with a result mismatch when the index yields no
    /// row, or more than one.
    pub fn find_one(&self, query: impl Into<Value>) -> Deferred<Row> {
        let entity = self.def.name.clone();
        let column = self.column.clone();
        self.find(query).and_then(move |set| match set.len() {
            1 => Ok(set[0].clone()),
            0 => Err(CoreError::result_mismatch(format!(
                "no row of {entity} matches {column}"
            ))),
            n => Err(CoreError::result_mismatch(format!(
                "{n} rows of {entity} match {column}, expected one"
            ))),
        })
    }
}

/// Unique-index lookups: at most one row per value.
#[derive(Debug, Clone)]
pub struct UniqueAccessor {
    db: Database,
    def: Arc<EntityDef>,
    mode: BackendMode,
    sub: Option<String>,
    column: String,
}

impl UniqueAccessor {
    /// Fetches the row holding exactly this value, if any.
    pub fn get(&self, value: impl Into<Value>) -> Deferred<Option<Row>> {
        let (db, def, mode, sub, column) = (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
            self.column.clone(),
        );
        let value = value.into();
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let ids = backend.get_unique(&table, &column, std::slice::from_ref(&value))?;
            let Some(Some(id)) = ids.into_iter().next() else {
                return Ok(None);
            };
            let fetched = backend.get(&table, &[id])?;
            Ok(rows_from(&db, &def, mode, sub.as_ref(), fetched)
                .into_iter()
                .next())
        })
    }

    /// Fetches the rows holding any of these values; absent values are
    /// skipped and duplicate hits collapsed.
    pub fn get_many(&self, values: Vec<Value>) -> Deferred<RowSet> {
        let (db, def, mode, sub, column) = (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
            self.column.clone(),
        );
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let ids: Vec<String> = backend
                .get_unique(&table, &column, &values)?
                .into_iter()
                .flatten()
                .collect();
            let ids = dedup_preserving(ids);
            let fetched = backend.get(&table, &ids)?;
            Ok(rows_from(&db, &def, mode, sub.as_ref(), fetched))
        })
    }

    /// Scans the unique index for rows whose value matches a glob
    /// pattern (`*` and `?`). An array query scans once per element,
    /// deduplicated.
    pub fn find(&self, pattern: impl Into<Value>) -> Deferred<RowSet> {
        let (db, def, mode, sub, column) = (
            self.db.clone(),
            Arc::clone(&self.def),
            self.mode,
            self.sub.clone(),
            self.column.clone(),
        );
        let pattern = pattern.into();
        Deferred::new(move || {
            let backend = db.backend(&def, mode)?;
            let table = table_of(&def, sub.as_deref());
            let patterns: Vec<Value> = match pattern {
                Value::Array(items) => items,
                other => vec![other],
            };
            let mut ids = Vec::new();
            for pattern in &patterns {
                ids.extend(backend.find_unique(&table, &column, pattern)?);
            }
            let ids = dedup_preserving(ids);
            let fetched = backend.get(&table, &ids)?;
            Ok(rows_from(&db, &def, mode, sub.as_ref(), fetched))
        })
    }
}
