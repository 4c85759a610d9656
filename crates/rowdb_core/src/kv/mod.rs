//! Backends over primitive key/value stores.
//!
//! Two drivers share one physical layout:
//!
//! * [`KvBackend`] keeps each table in a hash keyed by primary key,
//!   with secondary and unique index entries in sibling hashes.
//! * [`KvListBackend`] keeps each table as an append-only list whose
//!   positions double as primary keys.
//!
//! All writes go through the store's watch/commit protocol and retry
//! on conflict, so concurrent writers interleave safely without locks.

mod hash;
mod layout;
mod list;

pub use hash::KvBackend;
pub use list::KvListBackend;

use crate::error::CoreResult;
use rowdb_codec::Value;
use rowdb_storage::KvStore;

/// Upper bound on optimistic-concurrency retries per write.
pub const MAX_RETRIES: u32 = 100;

/// Secondary-index scan shared by both drivers: index fields end in
/// `\0<value>`, whatever prefix precedes the separator.
fn scan_index(
    store: &dyn KvStore,
    table: &str,
    column: &str,
    query: &Value,
) -> CoreResult<Vec<String>> {
    let pattern = format!("*{}{}", layout::SEP, query);
    let hits = store.hash_scan(&layout::index_key(table, column), &pattern)?;
    Ok(hits
        .into_iter()
        .map(|(_, id)| String::from_utf8_lossy(&id).into_owned())
        .collect())
}

/// Unique-index pattern scan shared by both drivers.
fn scan_unique(
    store: &dyn KvStore,
    table: &str,
    column: &str,
    query: &Value,
) -> CoreResult<Vec<String>> {
    let hits = store.hash_scan(&layout::unique_key(table, column), &query.to_string())?;
    Ok(hits
        .into_iter()
        .map(|(_, id)| String::from_utf8_lossy(&id).into_owned())
        .collect())
}

/// Direct unique-index lookups shared by both drivers.
fn lookup_unique(
    store: &dyn KvStore,
    table: &str,
    column: &str,
    values: &[Value],
) -> CoreResult<Vec<Option<String>>> {
    let fields: Vec<String> = values.iter().map(Value::to_string).collect();
    let hits = store.hash_get_many(&layout::unique_key(table, column), &fields)?;
    Ok(hits
        .into_iter()
        .map(|slot| slot.map(|id| String::from_utf8_lossy(&id).into_owned()))
        .collect())
}
