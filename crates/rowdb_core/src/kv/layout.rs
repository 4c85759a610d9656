//! Physical key and field layout.
//!
//! Tables and their indexes map onto store keys as:
//!
//! ```text
//! TABLE/<table>            hash   pk          -> encoded row
//! LIST/<table>             list   position    -> encoded row
//! INDEX/<table>/<column>   hash   <pk>\0<value>              -> pk
//!                                 <hist>\x01<pk>\0<value>    -> hist   (history)
//! UINDEX/<table>/<column>  hash   <value>     -> pk
//! ```
//!
//! Secondary-index fields embed the row key before the separator so
//! one row can hold many entries per column; lookups glob on
//! `*\0<value>`.

use crate::schema::{ColumnKind, EntityDef};
use rowdb_codec::FieldMap;
use rowdb_storage::KvOp;

/// Separator between a row key and the indexed value in an index
/// field.
pub(super) const SEP: char = '\0';
/// Separator between a snapshot key and its source row key in a
/// history index field.
pub(super) const HISTORY_SEP: char = '\x01';

pub(super) fn table_key(table: &str) -> String {
    format!("TABLE/{table}")
}

pub(super) fn list_key(table: &str) -> String {
    format!("LIST/{table}")
}

pub(super) fn index_key(table: &str, column: &str) -> String {
    format!("INDEX/{table}/{column}")
}

pub(super) fn unique_key(table: &str, column: &str) -> String {
    format!("UINDEX/{table}/{column}")
}

/// One index a column feeds, with the values the row contributes.
pub(super) struct IndexTarget {
    pub column: String,
    pub unique: bool,
    pub values: Vec<String>,
}

/// The index entries a row's current data implies. Array columns
/// contribute one entry per element; nulls contribute none.
pub(super) fn index_targets(entity: &EntityDef, data: &FieldMap) -> Vec<IndexTarget> {
    let mut targets = Vec::new();
    for col in entity.columns() {
        let (column, unique) = if col.is_secondary() {
            (col.name.clone(), false)
        } else if col.is_unique() {
            (col.name.clone(), true)
        } else if col.stores_fk_ids() {
            (col.fk_id_field(), false)
        } else {
            continue;
        };
        let values = entity.value_of(col, data).index_values();
        targets.push(IndexTarget {
            column,
            unique,
            values,
        });
    }
    targets
}

/// Index entries to add for a row keyed `id`.
pub(super) fn index_ops_add(
    table: &str,
    entity: &EntityDef,
    id: &str,
    data: &FieldMap,
) -> Vec<KvOp> {
    let mut ops = Vec::new();
    for target in index_targets(entity, data) {
        for value in &target.values {
            if target.unique {
                ops.push(KvOp::HashSet {
                    key: unique_key(table, &target.column),
                    field: value.clone(),
                    value: id.as_bytes().to_vec(),
                });
            } else {
                ops.push(KvOp::HashSet {
                    key: index_key(table, &target.column),
                    field: format!("{id}{SEP}{value}"),
                    value: id.as_bytes().to_vec(),
                });
            }
        }
    }
    ops
}

/// Index entries to drop for a row keyed `id` whose stored data was
/// `data`.
pub(super) fn index_ops_remove(
    table: &str,
    entity: &EntityDef,
    id: &str,
    data: &FieldMap,
) -> Vec<KvOp> {
    let mut ops = Vec::new();
    for target in index_targets(entity, data) {
        for value in &target.values {
            if target.unique {
                ops.push(KvOp::HashDel {
                    key: unique_key(table, &target.column),
                    field: value.clone(),
                });
            } else {
                ops.push(KvOp::HashDel {
                    key: index_key(table, &target.column),
                    field: format!("{id}{SEP}{value}"),
                });
            }
        }
    }
    ops
}

/// History index entries: every indexed column plus the primary key,
/// all written as secondary entries keyed by the snapshot id.
pub(super) fn history_index_ops(
    table: &str,
    entity: &EntityDef,
    hist_id: &str,
    source_id: &str,
    data: &FieldMap,
) -> Vec<KvOp> {
    let mut ops = Vec::new();
    let mut emit = |column: &str, value: &str| {
        ops.push(KvOp::HashSet {
            key: index_key(table, column),
            field: format!("{hist_id}{HISTORY_SEP}{source_id}{SEP}{value}"),
            value: hist_id.as_bytes().to_vec(),
        });
    };
    for col in entity.columns() {
        if col.kind == ColumnKind::PrimaryKey {
            emit(&col.name, source_id);
        }
    }
    for target in index_targets(entity, data) {
        for value in &target.values {
            emit(&target.column, value);
        }
    }
    ops
}

/// Every store key a write to this table may touch, for watching.
pub(super) fn watch_keys(table: &str, entity: &EntityDef, positional: bool) -> Vec<String> {
    let mut keys = vec![if positional {
        list_key(table)
    } else {
        table_key(table)
    }];
    for col in entity.columns() {
        if col.is_secondary() {
            keys.push(index_key(table, &col.name));
        } else if col.is_unique() {
            keys.push(unique_key(table, &col.name));
        } else if col.stores_fk_ids() {
            keys.push(index_key(table, &col.fk_id_field()));
        }
    }
    keys
}
