//! The primitive store contract.

use crate::error::StorageResult;

/// One mutation inside a conditional commit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    /// Sets a field in a hash keyspace.
    HashSet {
        /// Target key.
        key: String,
        /// Field name within the hash.
        field: String,
        /// Field value.
        value: Vec<u8>,
    },
    /// Deletes a field from a hash keyspace. Deleting an absent field
    /// is a no-op.
    HashDel {
        /// Target key.
        key: String,
        /// Field name within the hash.
        field: String,
    },
    /// Appends a value to the tail of a list keyspace.
    ListPush {
        /// Target key.
        key: String,
        /// Value to append.
        value: Vec<u8>,
    },
    /// Removes an entire key with all its contents.
    DeleteKey {
        /// Target key.
        key: String,
    },
}

/// A version snapshot of a set of watched keys.
///
/// Obtained from [`KvStore::watch`] and consumed by [`KvStore::commit`].
/// A key that does not exist yet watches as version zero, so creating
/// it concurrently still invalidates the token.
#[derive(Debug, Clone)]
pub struct WatchToken {
    entries: Vec<(String, u64)>,
}

impl WatchToken {
    /// Creates a token from observed `(key, version)` pairs.
    #[must_use]
    pub fn new(entries: Vec<(String, u64)>) -> Self {
        Self { entries }
    }

    /// The observed `(key, version)` pairs.
    #[must_use]
    pub fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }
}

/// A primitive shared key/value store.
///
/// Keys name independent keyspaces of one of two kinds: hashes
/// (field → bytes) or lists (position → bytes). The store gives no
/// transactions of its own beyond the watch/commit pair: [`watch`]
/// snapshots key versions, [`commit`] applies a batch atomically iff
/// no watched key changed since the snapshot.
///
/// [`watch`]: KvStore::watch
/// [`commit`]: KvStore::commit
///
/// # Invariants
///
/// - A committed batch is applied in order, as a unit; readers never
///   observe a partially applied batch.
/// - Key versions are monotonic and survive key deletion (no ABA).
/// - Implementations must be `Send + Sync`; a `watch`/`commit` pair
///   belongs to one logical session and must not be interleaved with
///   unrelated writes through the same token.
pub trait KvStore: Send + Sync {
    /// Reads one field of a hash key.
    fn hash_get(&self, key: &str, field: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Reads several fields of a hash key, preserving order. Absent
    /// fields yield `None`.
    fn hash_get_many(&self, key: &str, fields: &[String]) -> StorageResult<Vec<Option<Vec<u8>>>>;

    /// Reads all fields of a hash key, ordered by field name.
    fn hash_all(&self, key: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Scans a hash key for fields matching a glob pattern
    /// (see [`crate::glob_match`]).
    fn hash_scan(&self, key: &str, pattern: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Reads an inclusive range of a list key. Negative indices count
    /// from the tail (`-1` is the last element). An empty or missing
    /// key yields an empty vec.
    fn list_range(&self, key: &str, start: i64, end: i64) -> StorageResult<Vec<Vec<u8>>>;

    /// Returns the length of a list key (zero if missing).
    fn list_len(&self, key: &str) -> StorageResult<u64>;

    /// Returns all existing key names matching a glob pattern.
    fn keys(&self, pattern: &str) -> StorageResult<Vec<String>>;

    /// Snapshots the versions of `keys` for a later conditional commit.
    fn watch(&self, keys: &[String]) -> StorageResult<WatchToken>;

    /// Atomically applies `ops` iff no key in `token` changed since it
    /// was taken. Returns `false` (applying nothing) on conflict.
    fn commit(&self, token: &WatchToken, ops: Vec<KvOp>) -> StorageResult<bool>;
}
