//! The backend abstraction the engine drives.
//!
//! A backend owns the physical layout of one table family: where rows
//! live, how index entries are shaped, and how writes are made atomic.
//! The engine never touches storage directly; everything goes through
//! this trait so that keyed stores and positional list stores can be
//! swapped per entity.

use crate::error::{CoreError, CoreResult};
use crate::schema::EntityDef;
use rowdb_codec::{FieldMap, Value};

/// Options controlling an upsert.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertOptions {
    /// Fail (write nothing, report not-written) when a row with the
    /// same primary key already exists.
    pub insert_only: bool,
    /// Write a history snapshot instead of updating the row in place.
    pub history: bool,
    /// Write even when the engine believes nothing changed.
    pub force: bool,
    /// Whether the caller observed any field changes since fetch.
    pub dirty: bool,
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// Whether anything was written.
    pub written: bool,
    /// Primary key assigned by the backend, for backends that mint
    /// their own (positional list stores).
    pub assigned_pk: Option<Value>,
}

impl UpsertOutcome {
    /// An outcome that wrote nothing.
    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            written: false,
            assigned_pk: None,
        }
    }

    /// An outcome that wrote the row as addressed.
    #[must_use]
    pub const fn written() -> Self {
        Self {
            written: true,
            assigned_pk: None,
        }
    }
}

/// Physical storage driver for a family of tables.
pub trait Backend: Send + Sync {
    /// Whether this backend stores rows positionally (list semantics:
    /// integer primary keys assigned on insert, no deletes).
    fn is_list_type(&self) -> bool {
        false
    }

    /// Whether [`Backend::get_range`] is supported.
    fn supports_range(&self) -> bool {
        false
    }

    /// Fetches rows by primary key, one slot per requested key, `None`
    /// where no row exists.
    fn get(&self, table: &str, ids: &[String]) -> CoreResult<Vec<Option<FieldMap>>>;

    /// Fetches every row of a table.
    fn all(&self, table: &str) -> CoreResult<Vec<FieldMap>>;

    /// Fetches a contiguous range of rows by position. Only positional
    /// backends support this.
    fn get_range(&self, table: &str, start: i64, end: i64) -> CoreResult<Vec<FieldMap>> {
        let _ = (start, end);
        Err(CoreError::invalid_call(format!(
            "range reads are not supported on table {table}"
        )))
    }

    /// Looks up primary keys through a secondary index. Returns every
    /// matching id, duplicates included.
    fn find_index(&self, table: &str, column: &str, query: &Value) -> CoreResult<Vec<String>>;

    /// Scans a unique index by value pattern. Returns matching ids.
    fn find_unique(&self, table: &str, column: &str, query: &Value) -> CoreResult<Vec<String>>;

    /// Direct unique-index lookups, one slot per requested value.
    fn get_unique(&self, table: &str, column: &str, values: &[Value])
        -> CoreResult<Vec<Option<String>>>;

    /// Removes a row and its index entries. Returns whether a row
    /// existed.
    fn delete(&self, table: &str, entity: &EntityDef, pk: &str) -> CoreResult<bool>;

    /// Writes a row and maintains its index entries atomically.
    fn upsert(
        &self,
        table: &str,
        entity: &EntityDef,
        data: &FieldMap,
        options: UpsertOptions,
    ) -> CoreResult<UpsertOutcome>;

    /// Drops and rebuilds every index of a table from its rows.
    fn reindex(&self, table: &str, entity: &EntityDef) -> CoreResult<()>;
}
