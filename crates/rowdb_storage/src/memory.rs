//! In-memory reference store.

use crate::error::{StorageError, StorageResult};
use crate::glob::glob_match;
use crate::store::{KvOp, KvStore, WatchToken};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// One keyspace: a hash or a list.
#[derive(Debug, Clone)]
enum Keyspace {
    Hash(BTreeMap<String, Vec<u8>>),
    List(Vec<Vec<u8>>),
}

#[derive(Debug, Default)]
struct Shared {
    data: HashMap<String, Keyspace>,
    /// Version counters, kept even after a key is deleted so a
    /// delete/recreate cycle still invalidates outstanding watches.
    versions: HashMap<String, u64>,
}

/// An in-memory [`KvStore`].
///
/// Thread-safe and shareable via `Arc`; contention between writers is
/// resolved through the watch/commit versioning, exactly like a store
/// shared between processes would behave. Suitable for tests and for
/// ephemeral single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    shared: Mutex<Shared>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every key. Intended for test setup.
    pub fn clear(&self) {
        let mut shared = self.shared.lock();
        let keys: Vec<String> = shared.data.keys().cloned().collect();
        for key in keys {
            shared.data.remove(&key);
            *shared.versions.entry(key).or_insert(0) += 1;
        }
    }
}

fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len_i = len as i64;
    let norm = |i: i64| -> i64 {
        if i < 0 {
            len_i + i
        } else {
            i
        }
    };
    let start = norm(start).max(0);
    let end = norm(end).min(len_i - 1);
    if len == 0 || start > end {
        return None;
    }
    Some((start as usize, end as usize))
}

impl Shared {
    fn hash(&self, key: &str) -> StorageResult<Option<&BTreeMap<String, Vec<u8>>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Keyspace::Hash(map)) => Ok(Some(map)),
            Some(Keyspace::List(_)) => Err(StorageError::wrong_kind(key, "hash")),
        }
    }

    fn list(&self, key: &str) -> StorageResult<Option<&Vec<Vec<u8>>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Keyspace::List(items)) => Ok(Some(items)),
            Some(Keyspace::Hash(_)) => Err(StorageError::wrong_kind(key, "list")),
        }
    }

    fn apply(&mut self, op: KvOp) -> StorageResult<()> {
        match op {
            KvOp::HashSet { key, field, value } => {
                let space = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| Keyspace::Hash(BTreeMap::new()));
                match space {
                    Keyspace::Hash(map) => {
                        map.insert(field, value);
                    }
                    Keyspace::List(_) => return Err(StorageError::wrong_kind(key, "hash")),
                }
                self.bump(&key);
            }
            KvOp::HashDel { key, field } => {
                if let Some(space) = self.data.get_mut(&key) {
                    match space {
                        Keyspace::Hash(map) => {
                            map.remove(&field);
                        }
                        Keyspace::List(_) => return Err(StorageError::wrong_kind(key, "hash")),
                    }
                }
                self.bump(&key);
            }
            KvOp::ListPush { key, value } => {
                let space = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| Keyspace::List(Vec::new()));
                match space {
                    Keyspace::List(items) => items.push(value),
                    Keyspace::Hash(_) => return Err(StorageError::wrong_kind(key, "list")),
                }
                self.bump(&key);
            }
            KvOp::DeleteKey { key } => {
                self.data.remove(&key);
                self.bump(&key);
            }
        }
        Ok(())
    }

    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }
}

impl KvStore for MemoryStore {
    fn hash_get(&self, key: &str, field: &str) -> StorageResult<Option<Vec<u8>>> {
        let shared = self.shared.lock();
        Ok(shared.hash(key)?.and_then(|map| map.get(field).cloned()))
    }

    fn hash_get_many(&self, key: &str, fields: &[String]) -> StorageResult<Vec<Option<Vec<u8>>>> {
        let shared = self.shared.lock();
        let map = shared.hash(key)?;
        Ok(fields
            .iter()
            .map(|f| map.and_then(|m| m.get(f).cloned()))
            .collect())
    }

    fn hash_all(&self, key: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let shared = self.shared.lock();
        Ok(shared
            .hash(key)?
            .map(|map| map.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn hash_scan(&self, key: &str, pattern: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let shared = self.shared.lock();
        Ok(shared
            .hash(key)?
            .map(|map| {
                map.iter()
                    .filter(|(f, _)| glob_match(pattern, f))
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_range(&self, key: &str, start: i64, end: i64) -> StorageResult<Vec<Vec<u8>>> {
        let shared = self.shared.lock();
        let Some(items) = shared.list(key)? else {
            return Ok(Vec::new());
        };
        Ok(resolve_range(items.len(), start, end)
            .map(|(s, e)| items[s..=e].to_vec())
            .unwrap_or_default())
    }

    fn list_len(&self, key: &str) -> StorageResult<u64> {
        let shared = self.shared.lock();
        Ok(shared.list(key)?.map_or(0, |items| items.len() as u64))
    }

    fn keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let shared = self.shared.lock();
        let mut keys: Vec<String> = shared
            .data
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn watch(&self, keys: &[String]) -> StorageResult<WatchToken> {
        let shared = self.shared.lock();
        Ok(WatchToken::new(
            keys.iter()
                .map(|k| (k.clone(), shared.versions.get(k).copied().unwrap_or(0)))
                .collect(),
        ))
    }

    fn commit(&self, token: &WatchToken, ops: Vec<KvOp>) -> StorageResult<bool> {
        let mut shared = self.shared.lock();
        for (key, seen) in token.entries() {
            let current = shared.versions.get(key).copied().unwrap_or(0);
            if current != *seen {
                return Ok(false);
            }
        }
        for op in ops {
            shared.apply(op)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(store: &MemoryStore, key: &str, field: &str, value: &[u8]) {
        let token = store.watch(&[]).unwrap();
        assert!(store
            .commit(
                &token,
                vec![KvOp::HashSet {
                    key: key.to_string(),
                    field: field.to_string(),
                    value: value.to_vec(),
                }],
            )
            .unwrap());
    }

    #[test]
    fn hash_set_get() {
        let store = MemoryStore::new();
        set(&store, "TABLE/t", "a", b"1");
        assert_eq!(store.hash_get("TABLE/t", "a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.hash_get("TABLE/t", "b").unwrap(), None);
    }

    #[test]
    fn hash_get_many_preserves_order() {
        let store = MemoryStore::new();
        set(&store, "k", "a", b"1");
        set(&store, "k", "c", b"3");
        let got = store
            .hash_get_many("k", &["c".into(), "b".into(), "a".into()])
            .unwrap();
        assert_eq!(
            got,
            vec![Some(b"3".to_vec()), None, Some(b"1".to_vec())]
        );
    }

    #[test]
    fn hash_scan_globs_fields() {
        let store = MemoryStore::new();
        set(&store, "idx", "row-1\u{0}Ann", b"row-1");
        set(&store, "idx", "row-2\u{0}Bob", b"row-2");
        let hits = store.hash_scan("idx", "*\u{0}Ann").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, b"row-1".to_vec());
    }

    #[test]
    fn list_push_and_range() {
        let store = MemoryStore::new();
        let token = store.watch(&[]).unwrap();
        store
            .commit(
                &token,
                vec![
                    KvOp::ListPush {
                        key: "LIST/a".into(),
                        value: b"x".to_vec(),
                    },
                    KvOp::ListPush {
                        key: "LIST/a".into(),
                        value: b"y".to_vec(),
                    },
                ],
            )
            .unwrap();
        assert_eq!(store.list_len("LIST/a").unwrap(), 2);
        assert_eq!(store.list_range("LIST/a", 0, -1).unwrap().len(), 2);
        assert_eq!(store.list_range("LIST/a", 1, 1).unwrap(), vec![b"y".to_vec()]);
        assert!(store.list_range("LIST/a", 5, 9).unwrap().is_empty());
    }

    #[test]
    fn commit_rejects_on_watched_change() {
        let store = MemoryStore::new();
        set(&store, "k", "a", b"1");
        let token = store.watch(&["k".to_string()]).unwrap();
        // Another writer slips in.
        set(&store, "k", "a", b"2");
        let applied = store
            .commit(
                &token,
                vec![KvOp::HashSet {
                    key: "k".into(),
                    field: "a".into(),
                    value: b"3".to_vec(),
                }],
            )
            .unwrap();
        assert!(!applied);
        assert_eq!(store.hash_get("k", "a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn watch_missing_key_sees_creation() {
        let store = MemoryStore::new();
        let token = store.watch(&["fresh".to_string()]).unwrap();
        set(&store, "fresh", "a", b"1");
        let applied = store
            .commit(
                &token,
                vec![KvOp::HashDel {
                    key: "fresh".into(),
                    field: "a".into(),
                }],
            )
            .unwrap();
        assert!(!applied);
    }

    #[test]
    fn delete_and_recreate_does_not_aba() {
        let store = MemoryStore::new();
        set(&store, "k", "a", b"1");
        let token = store.watch(&["k".to_string()]).unwrap();
        let t2 = store.watch(&[]).unwrap();
        store
            .commit(&t2, vec![KvOp::DeleteKey { key: "k".into() }])
            .unwrap();
        set(&store, "k", "a", b"1");
        // Same content again, but versions moved on.
        assert!(!store.commit(&token, vec![]).is_ok_and(|ok| ok));
    }

    #[test]
    fn wrong_kind_is_an_error() {
        let store = MemoryStore::new();
        set(&store, "h", "a", b"1");
        assert!(matches!(
            store.list_len("h"),
            Err(StorageError::WrongKind { .. })
        ));
    }

    #[test]
    fn keys_glob() {
        let store = MemoryStore::new();
        set(&store, "INDEX/Company/address", "f", b"v");
        set(&store, "UINDEX/Company/companyName", "f", b"v");
        set(&store, "TABLE/Company", "f", b"v");
        let hits = store.keys("INDEX/Company/*").unwrap();
        assert_eq!(hits, vec!["INDEX/Company/address".to_string()]);
    }
}
