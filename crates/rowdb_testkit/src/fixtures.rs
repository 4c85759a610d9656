//! Test fixtures and database helpers.
//!
//! Provides a sample schema covering every column and relation kind,
//! wired onto in-memory stores, for tests across the workspace.

use rowdb_core::{
    ArchiveMode, Database, EntitySchema, FkKind, KvBackend, KvListBackend, RegistryBuilder,
};
use rowdb_storage::{KvStore, MemoryStore};
use std::sync::Arc;

/// A test database over in-memory stores.
///
/// The sample schema models a small CRM:
///
/// - `Company`: unique `companyName`, keyed `address`, a `remote`
///   relation `Owner`
/// - `Owner`: keyed `name`, unique `email`, a `local` relation
///   `MyCompany` (the back side of `Company.Owner`) and a
///   `localSingle` relation `Profile`
/// - `Profile`: a `remote` relation `Owner`
/// - `Group`: a `remoteMulti` relation `Members` over owners
/// - `Document`: archived on delete (restorable), with history
/// - `AccessLog`: positional list table
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The store behind the data backends.
    pub data_store: Arc<MemoryStore>,
    /// The store behind the archive backend.
    pub archive_store: Arc<MemoryStore>,
    /// The store behind the history backend.
    pub history_store: Arc<MemoryStore>,
}

impl TestDatabase {
    /// Builds the sample database.
    pub fn sample() -> Self {
        let data_store = Arc::new(MemoryStore::new());
        let archive_store = Arc::new(MemoryStore::new());
        let history_store = Arc::new(MemoryStore::new());
        let data: Arc<dyn KvStore> = data_store.clone();
        let archive: Arc<dyn KvStore> = archive_store.clone();
        let history: Arc<dyn KvStore> = history_store.clone();

        let db = RegistryBuilder::new()
            .declare(
                EntitySchema::new("Company")
                    .primary_key("ID")
                    .unique_column("companyName")
                    .key_column("address")
                    .column("value")
                    .foreign_key("Owner", FkKind::Remote, "Owner"),
            )
            .declare(
                EntitySchema::new("Owner")
                    .primary_key("ID")
                    .key_column("name")
                    .unique_column("email")
                    .foreign_key_via("MyCompany", FkKind::Local, "Company", "Owner")
                    .foreign_key_via("Profile", FkKind::LocalSingle, "Profile", "Owner"),
            )
            .declare(
                EntitySchema::new("Profile")
                    .primary_key("ID")
                    .column("bio")
                    .foreign_key("Owner", FkKind::Remote, "Owner"),
            )
            .declare(
                EntitySchema::new("Group")
                    .primary_key("ID")
                    .unique_column("groupName")
                    .foreign_key("Members", FkKind::RemoteMulti, "Owner"),
            )
            .declare(
                EntitySchema::new("Document")
                    .primary_key("ID")
                    .key_column("title")
                    .column("body")
                    .archive_mode(ArchiveMode::Active)
                    .history_backend("history"),
            )
            .declare(
                EntitySchema::new("AccessLog")
                    .primary_key("ID")
                    .key_column("user")
                    .column("path")
                    .backend("list"),
            )
            .attach_default(Arc::new(KvBackend::json(data.clone())))
            .attach_backend(Arc::new(KvListBackend::json(data)), "list")
            .attach_backend(Arc::new(KvBackend::json(archive)), "archive")
            .attach_backend(Arc::new(KvBackend::json(history)), "history")
            .initialize()
            .expect("sample schema should initialize");

        Self {
            db,
            data_store,
            archive_store,
            history_store,
        }
    }

    /// Removes every stored row across all backends.
    pub fn clear(&self) {
        self.data_store.clear();
        self.archive_store.clear();
        self.history_store.clear();
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with the sample database.
pub fn with_sample_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::sample();
    f(&test_db.db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use rowdb_core::Row;

    /// Creates a company with an owner linked through the `Owner`
    /// relation. Returns `(company, owner)`.
    pub fn company_with_owner(db: &Database, company: &str, owner: &str) -> (Row, Row) {
        let owner_row = db
            .table("Owner")
            .expect("Owner is registered")
            .create()
            .expect("create owner");
        owner_row.set("name", owner).expect("set name");
        owner_row
            .set("email", format!("{owner}@example.com"))
            .expect("set email");
        owner_row.save().expect("save owner");

        let company_row = db
            .table("Company")
            .expect("Company is registered")
            .create()
            .expect("create company");
        company_row.set("companyName", company).expect("set name");
        company_row.set("address", "Berlin").expect("set address");
        company_row
            .set_relation("Owner", Some(&owner_row))
            .expect("link owner");
        company_row.save().expect("save company");

        (company_row, owner_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_database_initializes() {
        let test_db = TestDatabase::sample();
        assert!(test_db.table("Company").is_ok());
        assert!(test_db.table("AccessLog").is_ok());
    }

    #[test]
    fn scenario_links_company_and_owner() {
        let test_db = TestDatabase::sample();
        let (company, owner) = scenarios::company_with_owner(&test_db, "Acme", "ann");
        let linked = company
            .relation_one("Owner")
            .unwrap()
            .resolve()
            .unwrap()
            .unwrap();
        assert_eq!(
            linked.primary_key().unwrap(),
            owner.primary_key().unwrap()
        );
    }
}
