//! The keyed-table driver.

use super::layout;
use crate::backend::{Backend, UpsertOptions, UpsertOutcome};
use crate::error::{CoreError, CoreResult};
use crate::row::{HISTORY_SOURCE_FIELD, HISTORY_TIMESTAMP_FIELD};
use crate::schema::EntityDef;
use rowdb_codec::{FieldMap, JsonCodec, RowCodec, Value};
use rowdb_storage::{KvOp, KvStore};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{trace, warn};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Backend storing each table as a hash keyed by primary key.
pub struct KvBackend {
    store: Arc<dyn KvStore>,
    codec: Arc<dyn RowCodec>,
}

impl KvBackend {
    /// Creates a backend with an explicit row codec.
    pub fn new(store: Arc<dyn KvStore>, codec: Arc<dyn RowCodec>) -> Self {
        Self { store, codec }
    }

    /// Creates a backend with the JSON row codec.
    pub fn json(store: Arc<dyn KvStore>) -> Self {
        Self::new(store, Arc::new(JsonCodec))
    }

    fn decode(&self, bytes: Option<Vec<u8>>) -> CoreResult<Option<FieldMap>> {
        Ok(self.codec.decode(bytes.as_deref())?)
    }

    fn pk_of(entity: &EntityDef, data: &FieldMap) -> CoreResult<String> {
        match data.get(&entity.primary_key) {
            Some(value) if !value.is_null() => Ok(value.to_string()),
            _ => Err(CoreError::config(format!(
                "row of {} carries no primary key",
                entity.name
            ))),
        }
    }

    /// Appends one immutable history snapshot. Snapshots get their own
    /// minted key and never conflict, so a single commit suffices.
    fn upsert_history(
        &self,
        table: &str,
        entity: &EntityDef,
        data: &FieldMap,
    ) -> CoreResult<UpsertOutcome> {
        let source_id = Self::pk_of(entity, data)?;
        let hist_id = uuid::Uuid::new_v4().to_string();
        let mut snapshot = data.clone();
        snapshot.insert(
            entity.primary_key.clone(),
            Value::Text(hist_id.clone()),
        );
        snapshot.insert(
            HISTORY_SOURCE_FIELD.to_string(),
            Value::Text(source_id.clone()),
        );
        snapshot.insert(
            HISTORY_TIMESTAMP_FIELD.to_string(),
            Value::Integer(now_millis()),
        );
        let mut ops = layout::history_index_ops(table, entity, &hist_id, &source_id, data);
        ops.push(KvOp::HashSet {
            key: layout::table_key(table),
            field: hist_id,
            value: self.codec.encode(&snapshot)?,
        });
        let token = self.store.watch(&[])?;
        self.store.commit(&token, ops)?;
        Ok(UpsertOutcome::written())
    }
}

impl Backend for KvBackend {
    fn get(&self, table: &str, ids: &[String]) -> CoreResult<Vec<Option<FieldMap>>> {
        let fetched = self.store.hash_get_many(&layout::table_key(table), ids)?;
        fetched.into_iter().map(|slot| self.decode(slot)).collect()
    }

    fn all(&self, table: &str) -> CoreResult<Vec<FieldMap>> {
        let fetched = self.store.hash_all(&layout::table_key(table))?;
        let mut rows = Vec::with_capacity(fetched.len());
        for (_, bytes) in fetched {
            if let Some(row) = self.decode(Some(bytes))? {
                rows.push(row);
            }
        }
        Ok(rows)
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

    fn delete(&self, table: &str, entity: &EntityDef, pk: &str) -> CoreResult<bool> {
        let watch = layout::watch_keys(table, entity, false);
        let table_key = layout::table_key(table);
        for attempt in 1..=super::MAX_RETRIES {
            let token = self.store.watch(&watch)?;
            let Some(old) = self.decode(self.store.hash_get(&table_key, pk)?)? else {
                return Ok(false);
            };
            let mut ops = layout::index_ops_remove(table, entity, pk, &old);
            ops.push(KvOp::HashDel {
                key: table_key.clone(),
                field: pk.to_string(),
            });
            if self.store.commit(&token, ops)? {
                return Ok(true);
            }
            trace!(table, pk, attempt, "delete conflicted, retrying");
        }
        warn!(table, pk, "delete retry budget exhausted");
        Err(CoreError::locking(
            super::MAX_RETRIES,
            format!("delete of {pk} from {table} kept conflicting"),
        ))
    }

    fn upsert(
        &self,
        table: &str,
        entity: &EntityDef,
        data: &FieldMap,
        options: UpsertOptions,
    ) -> CoreResult<UpsertOutcome> {
        if options.history {
            return self.upsert_history(table, entity, data);
        }
        let pk = Self::pk_of(entity, data)?;
        let watch = layout::watch_keys(table, entity, false);
        let table_key = layout::table_key(table);
        let encoded = self.codec.encode(data)?;
        for attempt in 1..=super::MAX_RETRIES {
            let token = self.store.watch(&watch)?;
            let old = self.decode(self.store.hash_get(&table_key, &pk)?)?;
            if options.insert_only && old.is_some() {
                return Ok(UpsertOutcome::skipped());
            }
            if !options.dirty && !options.force && old.is_some() {
                return Ok(UpsertOutcome::skipped());
            }
            let mut ops = Vec::new();
            if let Some(old) = &old {
                ops.extend(layout::index_ops_remove(table, entity, &pk, old));
            }
            ops.extend(layout::index_ops_add(table, entity, &pk, data));
            ops.push(KvOp::HashSet {
                key: table_key.clone(),
                field: pk.clone(),
                value: encoded.clone(),
            });
            if self.store.commit(&token, ops)? {
                return Ok(UpsertOutcome::written());
            }
            trace!(table, pk = %pk, attempt, "upsert conflicted, retrying");
        }
        warn!(table, pk = %pk, "upsert retry budget exhausted");
        Err(CoreError::locking(
            super::MAX_RETRIES,
            format!("upsert of {pk} into {table} kept conflicting"),
        ))
    }

    fn reindex(&self, table: &str, entity: &EntityDef) -> CoreResult<()> {
        let watch = layout::watch_keys(table, entity, false);
        for attempt in 1..=super::MAX_RETRIES {
            let token = self.store.watch(&watch)?;
            let mut ops = Vec::new();
            let mut stale = self.store.keys(&format!("INDEX/{table}/*"))?;
            stale.extend(self.store.keys(&format!("UINDEX/{table}/*"))?);
            for key in stale {
                ops.push(KvOp::DeleteKey { key });
            }
            for (pk, bytes) in self.store.hash_all(&layout::table_key(table))? {
                if let Some(row) = self.decode(Some(bytes))? {
                    ops.extend(layout::index_ops_add(table, entity, &pk, &row));
                }
            }
            if self.store.commit(&token, ops)? {
                return Ok(());
            }
            trace!(table, attempt, "reindex conflicted, retrying");
        }
        Err(CoreError::locking(
            super::MAX_RETRIES,
            format!("reindex of {table} kept conflicting"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FkKind};
    use rowdb_storage::MemoryStore;

    fn entity() -> EntityDef {
        let schema = EntitySchema::new("Company")
            .primary_key("ID")
            .unique_column("companyName")
            .key_column("address")
            .column("value")
            .foreign_key("Owner", FkKind::Remote, "Owner");
        EntityDef::from_schema(&schema, "ID".to_string(), false)
    }

    fn row(id: &str, name: &str, address: &str) -> FieldMap {
        let mut data = FieldMap::new();
        data.insert("ID".into(), Value::from(id));
        data.insert("companyName".into(), Value::from(name));
        data.insert("address".into(), Value::from(address));
        data
    }

    fn backend() -> (Arc<MemoryStore>, KvBackend) {
        let store = Arc::new(MemoryStore::new());
        (Arc::clone(&store), KvBackend::json(store))
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let (_, backend) = backend();
        let entity = entity();
        let data = row("c1", "Acme", "Berlin");
        let outcome = backend
            .upsert(
                "Company",
                &entity,
                &data,
                UpsertOptions {
                    dirty: true,
                    ..UpsertOptions::default()
                },
            )
            .unwrap();
        assert!(outcome.written);
        let fetched = backend.get("Company", &["c1".to_string()]).unwrap();
        assert_eq!(fetched[0].as_ref(), Some(&data));
    }

    #[test]
    fn update_moves_index_entries() {
        let (_, backend) = backend();
        let entity = entity();
        let opts = UpsertOptions {
            dirty: true,
            ..UpsertOptions::default()
        };
        backend
            .upsert("Company", &entity, &row("c1", "Acme", "Berlin"), opts)
            .unwrap();
        backend
            .upsert("Company", &entity, &row("c1", "Acme", "Hamburg"), opts)
            .unwrap();
        let old = backend
            .find_index("Company", "address", &Value::from("Berlin"))
            .unwrap();
        assert!(old.is_empty());
        let new = backend
            .find_index("Company", "address", &Value::from("Hamburg"))
            .unwrap();
        assert_eq!(new, vec!["c1".to_string()]);
    }

    #[test]
    fn unique_index_points_at_row() {
        let (_, backend) = backend();
        let entity = entity();
        backend
            .upsert(
                "Company",
                &entity,
                &row("c1", "Acme", "Berlin"),
                UpsertOptions {
                    dirty: true,
                    ..UpsertOptions::default()
                },
            )
            .unwrap();
        let ids = backend
            .get_unique("Company", "companyName", &[Value::from("Acme")])
            .unwrap();
        assert_eq!(ids, vec![Some("c1".to_string())]);
        let missing = backend
            .get_unique("Company", "companyName", &[Value::from("Nope")])
            .unwrap();
        assert_eq!(missing, vec![None]);
    }

    #[test]
    fn insert_only_skips_existing() {
        let (_, backend) = backend();
        let entity = entity();
        let opts = UpsertOptions {
            dirty: true,
            insert_only: true,
            ..UpsertOptions::default()
        };
        assert!(backend
            .upsert("Company", &entity, &row("c1", "Acme", "Berlin"), opts)
            .unwrap()
            .written);
        assert!(!backend
            .upsert("Company", &entity, &row("c1", "Other", "Hamburg"), opts)
            .unwrap()
            .written);
    }

    #[test]
    fn delete_drops_row_and_indexes() {
        let (_, backend) = backend();
        let entity = entity();
        backend
            .upsert(
                "Company",
                &entity,
                &row("c1", "Acme", "Berlin"),
                UpsertOptions {
                    dirty: true,
                    ..UpsertOptions::default()
                },
            )
            .unwrap();
        assert!(backend.delete("Company", &entity, "c1").unwrap());
        assert!(!backend.delete("Company", &entity, "c1").unwrap());
        assert!(backend.get("Company", &["c1".to_string()]).unwrap()[0].is_none());
        assert!(backend
            .find_index("Company", "address", &Value::from("Berlin"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn history_snapshot_keeps_source_key() {
        let (_, backend) = backend();
        let entity = entity();
        backend
            .upsert(
                "Company",
                &entity,
                &row("c1", "Acme", "Berlin"),
                UpsertOptions {
                    history: true,
                    dirty: true,
                    force: true,
                    ..UpsertOptions::default()
                },
            )
            .unwrap();
        // Snapshots are looked up through the source row's key.
        let ids = backend
            .find_index("Company", "ID", &Value::from("c1"))
            .unwrap();
        assert_eq!(ids.len(), 1);
        let snapshot = backend.get("Company", &ids).unwrap()[0].clone().unwrap();
        assert_eq!(
            snapshot.get(HISTORY_SOURCE_FIELD),
            Some(&Value::from("c1"))
        );
        assert!(snapshot.contains_key(HISTORY_TIMESTAMP_FIELD));
        // Two snapshots of the same row coexist.
        backend
            .upsert(
                "Company",
                &entity,
                &row("c1", "Acme", "Hamburg"),
                UpsertOptions {
                    history: true,
                    dirty: true,
                    force: true,
                    ..UpsertOptions::default()
                },
            )
            .unwrap();
        let ids = backend
            .find_index("Company", "ID", &Value::from("c1"))
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn reindex_rebuilds_from_rows() {
        let (store, backend) = backend();
        let entity = entity();
        backend
            .upsert(
                "Company",
                &entity,
                &row("c1", "Acme", "Berlin"),
                UpsertOptions {
                    dirty: true,
                    ..UpsertOptions::default()
                },
            )
            .unwrap();
        // Corrupt the index out from under the backend.
        let token = store.watch(&[]).unwrap();
        store
            .commit(
                &token,
                vec![KvOp::DeleteKey {
                    key: "INDEX/Company/address".into(),
                }],
            )
            .unwrap();
        assert!(backend
            .find_index("Company", "address", &Value::from("Berlin"))
            .unwrap()
            .is_empty());
        backend.reindex("Company", &entity).unwrap();
        assert_eq!(
            backend
                .find_index("Company", "address", &Value::from("Berlin"))
                .unwrap(),
            vec!["c1".to_string()]
        );
    }
}
