//! # RowDB
//!
//! A typed data-access engine mapping declared entity schemas onto
//! primitive key/value stores.
//!
//! Entities are declared as [`EntitySchema`] values naming their
//! columns, indexes, foreign keys and lifecycle configuration, then
//! frozen into a [`Database`] through a [`RegistryBuilder`]. Reads go
//! through [`Table`] accessors and return lazy [`Deferred`] results;
//! writes go through [`Row`] handles and are made atomic with an
//! optimistic watch/commit protocol against the backing store.
//!
//! ```no_run
//! use rowdb_core::{Database, EntitySchema, KvBackend, RegistryBuilder};
//! use rowdb_storage::MemoryStore;
//! use std::sync::Arc;
//!
//! # fn main() -> rowdb_core::CoreResult<()> {
//! let db: Database = RegistryBuilder::new()
//!     .declare(
//!         EntitySchema::new("Company")
//!             .primary_key("ID")
//!             .unique_column("companyName")
//!             .key_column("address"),
//!     )
//!     .attach_default(Arc::new(KvBackend::json(Arc::new(MemoryStore::new()))))
//!     .initialize()?;
//!
//! let companies = db.table("Company")?;
//! let row = companies.create()?;
//! row.set("companyName", "Acme")?;
//! row.set("address", "Berlin")?;
//! row.save()?;
//!
//! let found = companies.key("address")?.find("Berlin").resolve()?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod deferred;
mod error;
mod fk;
mod kv;
mod query;
mod registry;
mod row;
mod rowset;
mod schema;

pub use backend::{Backend, UpsertOptions, UpsertOutcome};
pub use deferred::Deferred;
pub use error::{CoreError, CoreResult};
pub use kv::{KvBackend, KvListBackend, MAX_RETRIES};
pub use query::{KeyAccessor, PkAccessor, Table, UniqueAccessor};
pub use registry::{BackendMode, Database, RegistryBuilder};
pub use row::{Row, HISTORY_SOURCE_FIELD, HISTORY_TIMESTAMP_FIELD};
pub use rowset::RowSet;
pub use schema::{
    ArchiveMode, ColumnDef, ColumnKind, ComputedFn, EntityDef, EntitySchema, FkKind, Hook,
    IdGenerator,
};

pub use rowdb_codec::{FieldMap, Value};
