//! # RowDB Storage
//!
//! The primitive key/value store contract RowDB builds on, plus the
//! in-memory reference store.
//!
//! The store is deliberately dumb: it knows hash keyspaces (field →
//! bytes), list keyspaces (position → bytes), glob scans, and a single
//! optimistic-concurrency primitive: watch a set of keys, then commit
//! a batch of operations that applies only if none of the watched keys
//! changed in between. Everything table- or index-shaped lives above
//! this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod glob;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use glob::glob_match;
pub use memory::MemoryStore;
pub use store::{KvOp, KvStore, WatchToken};
