//! The positional-table driver.
//!
//! Rows live in an append-only list; a row's position is its primary
//! key, assigned at insert time. Rows are never updated or removed, so
//! the driver serves append-heavy record streams (logs, feeds) where
//! the secondary indexes still apply.

use super::layout;
use crate::backend::{Backend, UpsertOptions, UpsertOutcome};
use crate::error::{CoreError, CoreResult};
use crate::schema::EntityDef;
use rowdb_codec::{FieldMap, JsonCodec, RowCodec, Value};
use rowdb_storage::{KvOp, KvStore};
use std::sync::Arc;
use tracing::trace;

/// Backend storing each table as an append-only list.
pub struct KvListBackend {
    store: Arc<dyn KvStore>,
    codec: Arc<dyn RowCodec>,
}

impl KvListBackend {
    /// Creates a backend with an explicit row codec.
    pub fn new(store: Arc<dyn KvStore>, codec: Arc<dyn RowCodec>) -> Self {
        Self { store, codec }
    }

    /// Creates a backend with the JSON row codec.
    pub fn json(store: Arc<dyn KvStore>) -> Self {
        Self::new(store, Arc::new(JsonCodec))
    }

    fn decode_all(&self, raw: Vec<Vec<u8>>) -> CoreResult<Vec<FieldMap>> {
        let mut rows = Vec::with_capacity(raw.len());
        for bytes in raw {
            if let Some(row) = self.codec.decode(Some(&bytes))? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl Backend for KvListBackend {
    fn is_list_type(&self) -> bool {
        true
    }

    fn supports_range(&self) -> bool {
        true
    }

    fn get(&self, table: &str, ids: &[String]) -> CoreResult<Vec<Option<FieldMap>>> {
        let key = layout::list_key(table);
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(position) = id.parse::<i64>() else {
                out.push(None);
                continue;
            };
            let raw = self.store.list_range(&key, position, position)?;
            out.push(match raw.into_iter().next() {
                Some(bytes) => self.codec.decode(Some(&bytes))?,
                None => None,
            });
        }
        Ok(out)
    }

    fn all(&self, table: &str) -> CoreResult<Vec<FieldMap>> {
        let raw = self.store.list_range(&layout::list_key(table), 0, -1)?;
        self.decode_all(raw)
    }

    fn get_range(&self, table: &str, start: i64, end: i64) -> CoreResult<Vec<FieldMap>> {
        let raw = self.store.list_range(&layout::list_key(table), start, end)?;
        self.decode_all(raw)
    }

    fn find_index(&self, table: &str, column: &str, query: &Value) -> CoreResult<Vec<String>> {
        super::scan_index(self.store.as_ref(), table, column, query)
    }

    fn find_unique(&self, table: &str, column: &str, query: &Value) -> CoreResult<Vec<String>> {
        super::scan_unique(self.store.as_ref(), table, column, query)
    }

    fn get_unique(
        &self,
        table: &str,
        column: &str,
        values: &[Value],
    ) -> CoreResult<Vec<Option<String>>> {
        super::lookup_unique(self.store.as_ref(), table, column, values)
    }

    fn delete(&self, table: &str, _entity: &EntityDef, _pk: &str) -> CoreResult<bool> {
        Err(CoreError::invalid_call(format!(
            "rows of positional table {table} cannot be deleted"
        )))
    }

    fn upsert(
        &self,
        table: &str,
        entity: &EntityDef,
        data: &FieldMap,
        options: UpsertOptions,
    ) -> CoreResult<UpsertOutcome> {
        if options.history {
            return Err(CoreError::invalid_call(format!(
                "positional table {table} keeps no history"
            )));
        }
        if data
            .get(&entity.primary_key)
            .is_some_and(|pk| !pk.is_null())
        {
            return Err(CoreError::config(format!(
                "rows of positional table {table} are append-only and cannot carry a preset key"
            )));
        }
        let watch = layout::watch_keys(table, entity, true);
        let list_key = layout::list_key(table);
        for attempt in 1..=super::MAX_RETRIES {
            let token = self.store.watch(&watch)?;
            let position = self.store.list_len(&list_key)? as i64;
            let mut snapshot = data.clone();
            snapshot.insert(entity.primary_key.clone(), Value::Integer(position));
            let id = position.to_string();
            let mut ops = layout::index_ops_add(table, entity, &id, &snapshot);
            ops.push(KvOp::ListPush {
                key: list_key.clone(),
                value: self.codec.encode(&snapshot)?,
            });
            if self.store.commit(&token, ops)? {
                return Ok(UpsertOutcome {
                    written: true,
                    assigned_pk: Some(Value::Integer(position)),
                });
            }
            trace!(table, attempt, "append conflicted, retrying");
        }
        Err(CoreError::locking(
            super::MAX_RETRIES,
            format!("append to {table} kept conflicting"),
        ))
    }

    fn reindex(&self, table: &str, _entity: &EntityDef) -> CoreResult<()> {
        Err(CoreError::invalid_call(format!(
            "positional table {table} cannot be reindexed"
        )))
    }
}
